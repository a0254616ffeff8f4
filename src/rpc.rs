//! A thin stdio JSON-RPC 2.0 façade over the core (§6: "an ambient convenience,
//! not a tested contract"). One request per line on stdin, one response per line
//! on stdout, mirroring the framing `original_source/src/lcm/rpc/server.py` uses
//! over its own stdio transport.

use serde_json::{Value, json};
use std::io::{BufRead, Write};
use std::sync::atomic::AtomicBool;

use crate::config::Config;
use crate::error::LcmError;
use crate::ingest;
use crate::injection;
use crate::llm::LlmGateway;
use crate::parallel_map;
use crate::retrieval;
use crate::store::Store;

fn rpc_error(id: Value, code: i64, message: String) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

fn rpc_result(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_code(e: &LcmError) -> i64 {
    match e {
        LcmError::NotFound(_) => -32001,
        LcmError::InvalidId(_) | LcmError::InvalidQuery(_) | LcmError::ParseError(_) => -32602,
        LcmError::TranscriptMissing(_) | LcmError::InputMissing(_) => -32002,
        LcmError::LLMError(_) => -32003,
        LcmError::StoreError(_) => -32004,
        LcmError::Cancelled => -32005,
    }
}

pub fn status(store: &Store, session_id: &str) -> crate::error::Result<Value> {
    Ok(json!({
        "session_id": session_id,
        "message_count": store.count_messages(Some(session_id))?,
        "summary_count": store.count_summaries(Some(session_id))?,
        "dag_depth": store.get_dag_depth(session_id)?,
        "total_tokens": store.total_tokens(Some(session_id))?,
        "top_level_summary_count": store.get_top_level_summaries(session_id)?.len(),
    }))
}

/// Dispatches one already-parsed JSON-RPC request to the six core operations plus
/// the `capture`/`inject`/`init` hook-equivalents.
fn dispatch(store: &Store, gateway: &dyn LlmGateway, config: &Config, request: &Value) -> Value {
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = match request.get("method").and_then(Value::as_str) {
        Some(m) => m,
        None => return rpc_error(id, -32600, "missing method".to_string()),
    };
    let params = request.get("params").cloned().unwrap_or_else(|| json!({}));

    let session_id = params.get("session").and_then(Value::as_str).unwrap_or("default");

    let outcome: crate::error::Result<Value> = match method {
        "status" => status(store, session_id),
        "grep" => {
            let pattern = params.get("pattern").and_then(Value::as_str).unwrap_or("");
            let summary_id = params.get("summary_id").and_then(Value::as_i64);
            let page = params.get("page").and_then(Value::as_i64).unwrap_or(1);
            let use_regex = params.get("use_regex").and_then(Value::as_bool).unwrap_or(false);
            retrieval::grep(store, pattern, Some(session_id), summary_id, page, use_regex)
        }
        "describe" => {
            let lcm_id = params.get("lcm_id").and_then(Value::as_str).unwrap_or("");
            retrieval::describe(store, lcm_id)
        }
        "expand" => {
            let summary_id = params.get("summary_id").and_then(Value::as_i64).unwrap_or(0);
            let page = params.get("page").and_then(Value::as_i64).unwrap_or(1);
            retrieval::expand(store, summary_id, page)
        }
        "llm_map" => {
            let input_path = params.get("input_path").and_then(Value::as_str).unwrap_or("");
            let prompt = params.get("prompt").and_then(Value::as_str).unwrap_or("");
            let schema = params.get("output_schema").and_then(Value::as_str);
            let concurrency = params.get("concurrency").and_then(Value::as_u64).unwrap_or(16) as usize;
            let cancel = AtomicBool::new(false);
            parallel_map::classify_map(
                gateway,
                std::path::Path::new(input_path),
                prompt,
                schema,
                concurrency,
                3,
                &cancel,
            )
            .map(|o| serde_json::to_value(o).unwrap_or(Value::Null))
        }
        "agentic_map" => {
            let input_path = params.get("input_path").and_then(Value::as_str).unwrap_or("");
            let prompt = params.get("prompt").and_then(Value::as_str).unwrap_or("");
            let read_only = params.get("read_only").and_then(Value::as_bool).unwrap_or(true);
            let concurrency = params.get("concurrency").and_then(Value::as_u64).unwrap_or(16) as usize;
            let cancel = AtomicBool::new(false);
            parallel_map::agentic_map(
                gateway,
                std::path::Path::new(input_path),
                prompt,
                read_only,
                concurrency,
                3,
                16,
                &cancel,
            )
            .map(|o| serde_json::to_value(o).unwrap_or(Value::Null))
        }
        "capture" => {
            let transcript_path = params.get("transcript_path").and_then(Value::as_str).map(std::path::Path::new);
            ingest::capture_new(store, &config.state_dir, session_id, transcript_path)
                .map(|s| serde_json::to_value(s).unwrap_or(Value::Null))
        }
        "inject" => {
            let max_tokens = params.get("max_tokens").and_then(Value::as_i64).unwrap_or(injection::DEFAULT_MAX_TOKENS);
            injection::build_injection(store, session_id, max_tokens).map(|text| json!({ "injection": text }))
        }
        "init" => status(store, session_id),
        other => return rpc_error(id, -32601, format!("unknown method: {other}")),
    };

    match outcome {
        Ok(value) => rpc_result(id, value),
        Err(e) => rpc_error(id, error_code(&e), e.to_string()),
    }
}

/// Runs the listener to exhaustion (EOF on stdin), one JSON value per line in,
/// one JSON value per line out.
pub fn serve(
    store: &Store,
    gateway: &dyn LlmGateway,
    config: &Config,
    input: impl BufRead,
    mut output: impl Write,
) -> std::io::Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Value>(&line) {
            Ok(request) => dispatch(store, gateway, config, &request),
            Err(e) => rpc_error(Value::Null, -32700, format!("parse error: {e}")),
        };
        writeln!(output, "{}", serde_json::to_string(&response)?)?;
        output.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FakeGateway;

    fn test_config() -> Config {
        Config {
            db_path: std::path::PathBuf::from(":memory:"),
            state_dir: std::path::PathBuf::from("/tmp/lcm-rpc-test"),
            tau_soft: 50_000,
            tau_hard: 200_000,
            block_min: 5,
            block_max: 15,
            condensation_threshold: 5,
            llm_base_url: "http://localhost".to_string(),
            llm_model: "test".to_string(),
            llm_api_key_env: "LCM_LLM_API_KEY".to_string(),
        }
    }

    #[test]
    fn status_method_reports_counts() {
        let store = Store::open_in_memory().unwrap();
        store.insert_message("s1", "user", "hi", None).unwrap();
        let gateway = FakeGateway::always_fail();
        let config = test_config();

        let request = json!({"jsonrpc": "2.0", "id": 1, "method": "status", "params": {"session": "s1"}});
        let response = dispatch(&store, &gateway, &config, &request);
        assert_eq!(response["result"]["message_count"], 1);
    }

    #[test]
    fn unknown_method_reports_method_not_found() {
        let store = Store::open_in_memory().unwrap();
        let gateway = FakeGateway::always_fail();
        let config = test_config();

        let request = json!({"jsonrpc": "2.0", "id": 1, "method": "nonsense", "params": {}});
        let response = dispatch(&store, &gateway, &config, &request);
        assert_eq!(response["error"]["code"], -32601);
    }

    #[test]
    fn grep_not_found_summary_maps_to_not_found_code() {
        let store = Store::open_in_memory().unwrap();
        let gateway = FakeGateway::always_fail();
        let config = test_config();

        let request = json!({
            "jsonrpc": "2.0", "id": 1, "method": "expand",
            "params": {"session": "s1", "summary_id": 999}
        });
        let response = dispatch(&store, &gateway, &config, &request);
        assert_eq!(response["error"]["code"], -32001);
    }

    #[test]
    fn serve_processes_one_line_per_request() {
        let store = Store::open_in_memory().unwrap();
        store.insert_message("s1", "user", "hello", None).unwrap();
        let gateway = FakeGateway::always_fail();
        let config = test_config();

        let input = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"status\",\"params\":{\"session\":\"s1\"}}\n".as_slice();
        let mut output = Vec::new();
        serve(&store, &gateway, &config, input, &mut output).unwrap();

        let response: Value = serde_json::from_slice(
            output.split(|&b| b == b'\n').next().unwrap(),
        )
        .unwrap();
        assert_eq!(response["result"]["message_count"], 1);
    }
}
