//! The one concrete [`LlmGateway`] backend: a blocking HTTP client against a
//! chat-completions-style endpoint.
//!
//! Kept on `reqwest`'s blocking client rather than async, to stay inside this
//! crate's synchronous concurrency idiom (SPEC_FULL.md §10.1) instead of pulling in
//! an async runtime for one component. The exact request/response JSON shape is not
//! part of the tested contract (SPEC_FULL.md §4.2) — only `summarize`/`classify`/
//! `agent_turn`'s semantics are — so this follows the common "messages + tools"
//! shape used across the example pack's LLM-backed repos.

use reqwest::blocking::Client;
use serde_json::{Value, json};
use std::time::Duration;

use super::tools::{default_tools, execute_tool};
use super::{LlmGateway, SummarizeMode, ToolSpec, strip_code_fence};
use crate::error::{LcmError, Result};

pub struct HttpGateway {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpGateway {
    pub fn new(base_url: String, model: String, api_key_env: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("reqwest blocking client");
        let api_key = std::env::var(api_key_env).ok();
        HttpGateway { client, base_url, model, api_key }
    }

    fn post_chat(&self, messages: &[Value], tools: Option<&[ToolSpec]>, max_tokens: i64) -> Result<Value> {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": max_tokens,
        });
        if let Some(tools) = tools {
            let tool_specs: Vec<Value> = tools
                .iter()
                .map(|t| json!({ "name": t.name, "description": t.description, "parameters": t.parameters }))
                .collect();
            body["tools"] = Value::Array(tool_specs);
        }

        let mut req = self.client.post(format!("{}/chat/completions", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().map_err(|e| LcmError::LLMError(format!("request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(LcmError::LLMError(format!("backend returned status {}", response.status())));
        }
        response.json::<Value>().map_err(|e| LcmError::LLMError(format!("invalid response body: {e}")))
    }

    fn extract_text(response: &Value) -> Result<String> {
        response
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| LcmError::LLMError("response missing choices[0].message.content".to_string()))
    }

    fn extract_tool_calls(response: &Value) -> Vec<(String, String, Value)> {
        response
            .pointer("/choices/0/message/tool_calls")
            .and_then(Value::as_array)
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|c| {
                        let id = c.get("id")?.as_str()?.to_string();
                        let name = c.pointer("/function/name")?.as_str()?.to_string();
                        let args = c.pointer("/function/arguments").cloned().unwrap_or(json!({}));
                        Some((id, name, args))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl LlmGateway for HttpGateway {
    fn summarize(&self, text: &str, mode: SummarizeMode, target_tokens: i64) -> Result<String> {
        // "implementations must request at most 2x target_tokens from the backend" (§4.2)
        let max_tokens = target_tokens * 2;
        let messages = vec![
            json!({ "role": "system", "content": mode.system_prompt() }),
            json!({ "role": "user", "content": text }),
        ];
        let response = self.post_chat(&messages, None, max_tokens)?;
        Self::extract_text(&response)
    }

    fn classify(&self, item: &str, prompt: &str, output_schema: Option<&str>) -> Result<Value> {
        let mut system = "You classify input and respond with JSON only, no prose.".to_string();
        if let Some(schema) = output_schema {
            system.push_str(&format!(" The JSON must conform to this schema: {schema}"));
        }
        system.push_str(&format!(" Task: {prompt}"));

        let messages = vec![
            json!({ "role": "system", "content": system }),
            json!({ "role": "user", "content": item }),
        ];
        let response = self.post_chat(&messages, None, 2000)?;
        let text = Self::extract_text(&response)?;
        let cleaned = strip_code_fence(&text);
        serde_json::from_str(cleaned).map_err(|e| LcmError::ParseError(format!("classify output: {e}")))
    }

    fn agent_turn(
        &self,
        item: &str,
        prompt: &str,
        tools: Option<&[ToolSpec]>,
        read_only: bool,
        max_turns: u32,
    ) -> Result<Value> {
        let owned_default;
        let tool_list: &[ToolSpec] = match tools {
            Some(t) => t,
            None => {
                owned_default = default_tools(read_only);
                &owned_default
            }
        };

        let mut messages = vec![
            json!({ "role": "system", "content": prompt }),
            json!({ "role": "user", "content": item }),
        ];

        for _ in 0..max_turns {
            let response = self.post_chat(&messages, Some(tool_list), 4000)?;
            let calls = Self::extract_tool_calls(&response);

            if calls.is_empty() {
                let text = Self::extract_text(&response)?;
                let cleaned = strip_code_fence(&text);
                return serde_json::from_str(cleaned)
                    .or_else(|_| Ok(json!({ "result": text })));
            }

            messages.push(
                response
                    .pointer("/choices/0/message")
                    .cloned()
                    .unwrap_or(json!({ "role": "assistant" })),
            );

            for (id, name, args) in calls {
                let result = execute_tool(&name, &args).unwrap_or_else(|e| format!("error: {e}"));
                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": id,
                    "content": result,
                }));
            }
        }

        // "{result: 'Max turns reached', partial: true}" -- an acknowledged
        // degraded result, not an error (§4.2).
        Ok(json!({ "result": "Max turns reached", "partial": true }))
    }
}
