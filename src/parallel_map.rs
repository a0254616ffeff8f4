//! C8: the bounded-concurrency parallel map executor.
//!
//! The fan-out shape — a bounded `crossbeam-channel` queue feeding a fixed pool of
//! worker threads spawned inside `std::thread::scope`, with shared atomic counters
//! — is the teacher's `parallel.rs` pipeline generalized from "SQLite thread rows"
//! to "JSONL input records calling an LLM gateway". The per-item retry loop and the
//! `.out.jsonl`/`.agent_out.jsonl` output-suffix convention are grounded on
//! `original_source/src/lcm/tools/operators.py`.

use crossbeam_channel::bounded;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{LcmError, Result};
use crate::llm::LlmGateway;

const MAX_REPORTED_ERRORS: usize = 10;

#[derive(Debug, Clone, serde::Serialize)]
pub struct MapOutcome {
    pub output_path: PathBuf,
    pub total_items: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<Value>,
}

fn read_jsonl(path: &Path) -> Result<Vec<Value>> {
    if !path.exists() {
        return Err(LcmError::InputMissing(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str::<Value>(l).ok())
        .collect())
}

fn write_jsonl(path: &Path, items: &[Value]) -> Result<()> {
    let mut out = String::new();
    for item in items {
        out.push_str(&serde_json::to_string(item)?);
        out.push('\n');
    }
    std::fs::write(path, out)?;
    Ok(())
}

fn sibling_output_path(input_path: &Path, suffix: &str) -> PathBuf {
    let stem = input_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let dir = input_path.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!("{stem}{suffix}"))
}

/// Runs `op` over every input record with at most `concurrency` in flight, up to
/// `max_retries` attempts per item, writing successful results (input order,
/// failures omitted) to `output_path`.
fn run_map<F>(
    input_path: &Path,
    output_path: PathBuf,
    concurrency: usize,
    max_retries: usize,
    cancel: &AtomicBool,
    op: F,
) -> Result<MapOutcome>
where
    F: Fn(&Value) -> Result<Value> + Send + Sync,
{
    let items = read_jsonl(input_path)?;
    let total_items = items.len();

    let slots: Mutex<Vec<Option<Value>>> = Mutex::new(vec![None; total_items]);
    let errors: Mutex<Vec<Value>> = Mutex::new(Vec::new());
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    let (tx, rx) = bounded::<(usize, Value)>(concurrency * 2);
    let concurrency = concurrency.max(1);

    std::thread::scope(|scope| {
        for _ in 0..concurrency {
            let rx = rx.clone();
            let (slots, errors, successful, failed) = (&slots, &errors, &successful, &failed);
            let op = &op;
            let cancel = &*cancel;

            scope.spawn(move || {
                for (index, item) in rx {
                    if cancel.load(Ordering::Relaxed) {
                        failed.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }

                    let mut last_err = String::new();
                    let mut result = None;
                    for _attempt in 0..max_retries.max(1) {
                        if cancel.load(Ordering::Relaxed) {
                            break;
                        }
                        match op(&item) {
                            Ok(v) => {
                                result = Some(v);
                                break;
                            }
                            Err(e) => last_err = e.to_string(),
                        }
                    }

                    match result {
                        Some(v) => {
                            slots.lock().unwrap()[index] = Some(v);
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        None => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            let mut errs = errors.lock().unwrap();
                            if errs.len() < MAX_REPORTED_ERRORS {
                                errs.push(serde_json::json!({
                                    "index": index,
                                    "error": last_err,
                                    "item": item,
                                }));
                            }
                        }
                    }
                }
            });
        }

        for (index, item) in items.iter().cloned().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                let pending = total_items - index;
                failed.fetch_add(pending, Ordering::Relaxed);
                break;
            }
            // Blocking send on a full channel is this executor's backpressure
            // point, mirroring the teacher's bounded-channel feed loop.
            if tx.send((index, item)).is_err() {
                break;
            }
        }
        drop(tx);
    });

    let successful_results: Vec<Value> = slots.into_inner().unwrap().into_iter().flatten().collect();
    write_jsonl(&output_path, &successful_results)?;

    Ok(MapOutcome {
        output_path,
        total_items,
        successful: successful.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
        errors: errors.into_inner().unwrap(),
    })
}

pub fn classify_map(
    gateway: &dyn LlmGateway,
    input_path: &Path,
    prompt: &str,
    output_schema: Option<&str>,
    concurrency: usize,
    max_retries: usize,
    cancel: &AtomicBool,
) -> Result<MapOutcome> {
    let output_path = sibling_output_path(input_path, ".out.jsonl");
    run_map(input_path, output_path, concurrency, max_retries, cancel, |item| {
        let item_str = serde_json::to_string(item)?;
        gateway.classify(&item_str, prompt, output_schema)
    })
}

pub fn agentic_map(
    gateway: &dyn LlmGateway,
    input_path: &Path,
    prompt: &str,
    read_only: bool,
    concurrency: usize,
    max_retries: usize,
    max_turns: u32,
    cancel: &AtomicBool,
) -> Result<MapOutcome> {
    let output_path = sibling_output_path(input_path, ".agent_out.jsonl");
    run_map(input_path, output_path, concurrency, max_retries, cancel, |item| {
        let item_str = serde_json::to_string(item)?;
        gateway.agent_turn(&item_str, prompt, None, read_only, max_turns)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FakeGateway;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;

    fn write_input(dir: &Path, lines: &[&str]) -> PathBuf {
        let path = dir.join("input.jsonl");
        std::fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    #[test]
    fn classify_map_preserves_order_and_skips_failures() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(
            &dir,
            &[r#"{"n":1}"#, r#"{"n":2}"#, r#"{"n":3}"#],
        );

        let gateway = FakeGateway::with_responses(
            vec![],
            vec![Ok(json!({"r":1})), Err(LcmError::LLMError("boom".into())), Ok(json!({"r":3}))],
            vec![],
        );
        let cancel = AtomicBool::new(false);

        let outcome =
            classify_map(&gateway, &input, "classify", None, 2, 1, &cancel).unwrap();

        assert_eq!(outcome.total_items, 3);
        assert_eq!(outcome.successful, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.errors.len(), 1);

        let output = std::fs::read_to_string(&outcome.output_path).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn blank_and_malformed_lines_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(&dir, &[r#"{"n":1}"#, "", "not json", r#"{"n":2}"#]);

        let gateway = FakeGateway::with_responses(
            vec![],
            vec![Ok(json!({"r":1})), Ok(json!({"r":2}))],
            vec![],
        );
        let cancel = AtomicBool::new(false);
        let outcome = classify_map(&gateway, &input, "classify", None, 4, 1, &cancel).unwrap();
        assert_eq!(outcome.total_items, 2);
    }

    #[test]
    fn missing_input_file_reported() {
        let gateway = FakeGateway::always_fail();
        let cancel = AtomicBool::new(false);
        let result = classify_map(
            &gateway,
            Path::new("/nonexistent/path/input.jsonl"),
            "classify",
            None,
            4,
            1,
            &cancel,
        );
        assert!(matches!(result, Err(LcmError::InputMissing(_))));
    }
}
