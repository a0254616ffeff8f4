//! C2: the LLM gateway contract.
//!
//! The core depends only on [`LlmGateway`]; [`http::HttpGateway`] is the one
//! concrete backend shipped so the binary is runnable end to end, and
//! [`FakeGateway`] is the scriptable stand-in the rest of the core's tests are
//! written against (escalation, compaction, parallel-map). Grounded on
//! `original_source/src/lcm/llm/client.py`'s three call shapes
//! (`summarize`/`classify`/`agent_loop`), generalized to a trait per SPEC_FULL.md
//! §4.2 ("the core's tests exercise the trait against an in-memory fake gateway").

pub mod http;
pub mod tools;

use crate::error::Result;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarizeMode {
    PreserveDetails,
    BulletPoints,
}

impl SummarizeMode {
    /// System prompt text per §4.2: `preserve_details` asks for prose retaining
    /// decisions/paths/identifiers/errors/actions; `bullet_points` asks for
    /// compressed bullets of what was done/decided/changed.
    pub fn system_prompt(&self) -> &'static str {
        match self {
            SummarizeMode::PreserveDetails => {
                "Summarize the following conversation excerpt in prose. Retain all \
                 decisions made, file paths and identifiers mentioned, errors \
                 encountered, and actions taken. Be concise but do not drop \
                 concrete details."
            }
            SummarizeMode::BulletPoints => {
                "Summarize the following conversation excerpt as compressed bullet \
                 points covering what was done, what was decided, and what changed. \
                 Omit narrative framing."
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One backend call: `Summarize`/`Classify`/`AgentTurn` (§4.2).
pub trait LlmGateway: Send + Sync {
    fn summarize(&self, text: &str, mode: SummarizeMode, target_tokens: i64) -> Result<String>;

    fn classify(&self, item: &str, prompt: &str, output_schema: Option<&str>) -> Result<Value>;

    fn agent_turn(
        &self,
        item: &str,
        prompt: &str,
        tools: Option<&[ToolSpec]>,
        read_only: bool,
        max_turns: u32,
    ) -> Result<Value>;
}

/// Strips common code-fence framing (```json ... ``` or ``` ... ```) before a JSON
/// parse, per §4.2 "Output parsing must strip common code-fence framing".
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else {
        trimmed
    }
}

/// A scriptable gateway for tests: either a fixed queue of canned responses, or an
/// always-failing mode (used by the S4 escalation-backstop scenario).
pub struct FakeGateway {
    summarize_queue: Mutex<VecDeque<Result<String>>>,
    classify_queue: Mutex<VecDeque<Result<Value>>>,
    agent_queue: Mutex<VecDeque<Result<Value>>>,
    always_fail: bool,
}

impl FakeGateway {
    pub fn always_fail() -> Self {
        FakeGateway {
            summarize_queue: Mutex::new(VecDeque::new()),
            classify_queue: Mutex::new(VecDeque::new()),
            agent_queue: Mutex::new(VecDeque::new()),
            always_fail: true,
        }
    }

    pub fn with_responses(
        summarize: Vec<Result<String>>,
        classify: Vec<Result<Value>>,
        agent: Vec<Result<Value>>,
    ) -> Self {
        FakeGateway {
            summarize_queue: Mutex::new(summarize.into()),
            classify_queue: Mutex::new(classify.into()),
            agent_queue: Mutex::new(agent.into()),
            always_fail: false,
        }
    }
}

impl LlmGateway for FakeGateway {
    fn summarize(&self, _text: &str, _mode: SummarizeMode, _target_tokens: i64) -> Result<String> {
        if self.always_fail {
            return Err(crate::error::LcmError::LLMError("fake gateway: forced failure".into()));
        }
        self.summarize_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(crate::error::LcmError::LLMError("fake gateway: queue exhausted".into())))
    }

    fn classify(&self, _item: &str, _prompt: &str, _output_schema: Option<&str>) -> Result<Value> {
        if self.always_fail {
            return Err(crate::error::LcmError::LLMError("fake gateway: forced failure".into()));
        }
        self.classify_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(crate::error::LcmError::LLMError("fake gateway: queue exhausted".into())))
    }

    fn agent_turn(
        &self,
        _item: &str,
        _prompt: &str,
        _tools: Option<&[ToolSpec]>,
        _read_only: bool,
        _max_turns: u32,
    ) -> Result<Value> {
        if self.always_fail {
            return Err(crate::error::LcmError::LLMError("fake gateway: forced failure".into()));
        }
        self.agent_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(crate::error::LcmError::LLMError("fake gateway: queue exhausted".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
    }
}
