//! Default tool catalogue for `AgentTurn`: `read_file` (always available) and
//! `bash` (available iff `read_only = false`).
//!
//! Grounded on `original_source/src/lcm/llm/client.py::_execute_tool`: the same
//! byte caps (100 000 for `read_file`, 50 000 for `bash` output) and the same
//! 30-second `bash` wall-clock timeout.

use serde_json::{Value, json};
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use super::ToolSpec;
use crate::error::{LcmError, Result};

const READ_FILE_CAP: usize = 100_000;
const BASH_OUTPUT_CAP: usize = 50_000;
const BASH_TIMEOUT: Duration = Duration::from_secs(30);

pub fn read_file_spec() -> ToolSpec {
    ToolSpec {
        name: "read_file".to_string(),
        description: "Read a file from disk, truncated to 100,000 characters.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"],
        }),
    }
}

pub fn bash_spec() -> ToolSpec {
    ToolSpec {
        name: "bash".to_string(),
        description: "Run a shell command with a 30 second timeout, output truncated to 50,000 bytes.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": { "command": { "type": "string" } },
            "required": ["command"],
        }),
    }
}

/// Tools available when the caller supplies none: `read_file` always, `bash` iff
/// `!read_only`.
pub fn default_tools(read_only: bool) -> Vec<ToolSpec> {
    if read_only {
        vec![read_file_spec()]
    } else {
        vec![read_file_spec(), bash_spec()]
    }
}

pub fn execute_read_file(input: &Value) -> Result<String> {
    let path = input
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| LcmError::InvalidQuery("read_file requires a string `path`".to_string()))?;

    let mut file = std::fs::File::open(path)
        .map_err(|e| LcmError::LLMError(format!("read_file({path}): {e}")))?;
    let mut buf = String::new();
    let mut limited = file.by_ref().take(READ_FILE_CAP as u64);
    limited
        .read_to_string(&mut buf)
        .map_err(|e| LcmError::LLMError(format!("read_file({path}): {e}")))?;
    Ok(buf)
}

pub fn execute_bash(input: &Value) -> Result<String> {
    let command = input
        .get("command")
        .and_then(Value::as_str)
        .ok_or_else(|| LcmError::InvalidQuery("bash requires a string `command`".to_string()))?
        .to_string();

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();
        let _ = tx.send(output);
    });

    match rx.recv_timeout(BASH_TIMEOUT) {
        Ok(Ok(output)) => {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            let capped: String = combined.chars().take(BASH_OUTPUT_CAP).collect();
            Ok(capped)
        }
        Ok(Err(e)) => Err(LcmError::LLMError(format!("bash: {e}"))),
        Err(_) => Err(LcmError::LLMError("bash: timed out after 30s".to_string())),
    }
}

pub fn execute_tool(name: &str, input: &Value) -> Result<String> {
    match name {
        "read_file" => execute_read_file(input),
        "bash" => execute_bash(input),
        other => Err(LcmError::LLMError(format!("unknown tool: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_file_caps_at_100k_chars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, "x".repeat(READ_FILE_CAP + 500)).unwrap();

        let result = execute_read_file(&json!({ "path": path.to_str().unwrap() })).unwrap();
        assert_eq!(result.len(), READ_FILE_CAP);
    }

    #[test]
    fn bash_runs_and_captures_stdout() {
        let result = execute_bash(&json!({ "command": "echo hello" })).unwrap();
        assert!(result.contains("hello"));
    }

    #[test]
    fn default_tools_excludes_bash_when_read_only() {
        let tools = default_tools(true);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "read_file");
    }
}
