//! C5: the transcript ingestor.
//!
//! Grounded on `original_source/src/lcm/hooks/capture.py`: a per-session cursor
//! file holding the number of transcript lines already ingested, overwritten
//! atomically (write-to-temp-then-rename, the same "whole-file atomic overwrite"
//! the original keeps), and the `(role, content)` extraction rules of SPEC_FULL.md
//! §6.

use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::store::Store;

#[derive(Debug, Clone, serde::Serialize)]
pub struct CaptureStats {
    pub captured: usize,
    pub last_position: usize,
    pub error: Option<String>,
}

fn cursor_path(state_dir: &Path, session_id: &str) -> PathBuf {
    state_dir.join(format!("{session_id}.pos"))
}

fn read_cursor(state_dir: &Path, session_id: &str) -> usize {
    std::fs::read_to_string(cursor_path(state_dir, session_id))
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(0)
}

fn write_cursor(state_dir: &Path, session_id: &str, position: usize) -> Result<()> {
    std::fs::create_dir_all(state_dir)?;
    let path = cursor_path(state_dir, session_id);
    let tmp_path = path.with_extension("pos.tmp");
    {
        let mut f = std::fs::File::create(&tmp_path)?;
        write!(f, "{position}")?;
    }
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// Locates `{session_id}.jsonl` under `state_dir`'s sibling `transcripts` directory
/// layout when no explicit path is given. A real deployment's transcript source is
/// external (§1); this is a best-effort local convention so the CLI hook is usable
/// standalone.
fn find_transcript(state_dir: &Path, session_id: &str) -> Option<PathBuf> {
    let candidate = state_dir
        .parent()
        .unwrap_or(state_dir)
        .join("transcripts")
        .join(format!("{session_id}.jsonl"));
    if candidate.exists() { Some(candidate) } else { None }
}

/// One extracted `(role, content)` pair, or "skip" for an unrecognized shape
/// (SPEC_FULL.md §9 "Dynamic shape of transcript entries").
enum Extracted {
    Entry { role: String, content: String },
    Skip,
}

fn extract_content_parts(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.clone()),
                Value::Object(_) => {
                    let part_type = part.get("type").and_then(Value::as_str).unwrap_or("");
                    match part_type {
                        "text" => part.get("text").and_then(Value::as_str).map(str::to_string),
                        "tool_use" => {
                            let name = part.get("name").and_then(Value::as_str).unwrap_or("");
                            let input = part.get("input").cloned().unwrap_or(Value::Null);
                            let input_json = serde_json::to_string(&input).unwrap_or_default();
                            let truncated: String = input_json.chars().take(200).collect();
                            Some(format!("[Tool: {name}({truncated})]"))
                        }
                        "tool_result" => {
                            let body = part.get("content").and_then(Value::as_str).unwrap_or("");
                            let truncated: String = body.chars().take(500).collect();
                            Some(format!("[ToolResult: {truncated}]"))
                        }
                        _ => None,
                    }
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn extract(line_json: &Value) -> Extracted {
    let entry_type = line_json.get("type").and_then(Value::as_str).unwrap_or("");

    match entry_type {
        "message" => {
            let role = line_json.get("role").and_then(Value::as_str).unwrap_or("").to_string();
            let content = line_json
                .get("content")
                .map(extract_content_parts)
                .unwrap_or_default();
            if content.is_empty() {
                Extracted::Skip
            } else {
                Extracted::Entry { role, content }
            }
        }
        "human" => {
            let content = line_json
                .get("message")
                .or_else(|| line_json.get("content"))
                .map(extract_content_parts)
                .unwrap_or_default();
            if content.is_empty() {
                Extracted::Skip
            } else {
                Extracted::Entry { role: "user".to_string(), content }
            }
        }
        "assistant" => {
            let content = line_json
                .get("message")
                .or_else(|| line_json.get("content"))
                .map(extract_content_parts)
                .unwrap_or_default();
            if content.is_empty() {
                Extracted::Skip
            } else {
                Extracted::Entry { role: "assistant".to_string(), content }
            }
        }
        "tool_result" => {
            let content = line_json
                .get("content")
                .map(extract_content_parts)
                .unwrap_or_default();
            if content.is_empty() {
                Extracted::Skip
            } else {
                let truncated: String = content.chars().take(1000).collect();
                Extracted::Entry { role: "tool".to_string(), content: truncated }
            }
        }
        _ => Extracted::Skip,
    }
}

pub fn capture_new(
    store: &Store,
    state_dir: &Path,
    session_id: &str,
    transcript_path: Option<&Path>,
) -> Result<CaptureStats> {
    let path = match transcript_path {
        Some(p) => p.to_path_buf(),
        None => match find_transcript(state_dir, session_id) {
            Some(p) => p,
            None => {
                return Ok(CaptureStats {
                    captured: 0,
                    last_position: read_cursor(state_dir, session_id),
                    error: Some("Transcript not found".to_string()),
                });
            }
        },
    };

    if !path.exists() {
        return Ok(CaptureStats {
            captured: 0,
            last_position: read_cursor(state_dir, session_id),
            error: Some("Transcript not found".to_string()),
        });
    }

    let content = std::fs::read_to_string(&path)?;
    let last_position = read_cursor(state_dir, session_id);

    let mut captured = 0usize;
    let mut position = last_position;

    for (line_index, line) in content.lines().enumerate().skip(last_position) {
        position = line_index + 1;

        if line.trim().is_empty() {
            continue;
        }
        let parsed: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => continue,
        };

        if let Extracted::Entry { role, content } = extract(&parsed) {
            let mut metadata = HashMap::new();
            metadata.insert("source".to_string(), "transcript".to_string());
            metadata.insert("line".to_string(), line_index.to_string());
            store.insert_message(session_id, &role, &content, Some(&metadata))?;
            captured += 1;
        }
    }

    write_cursor(state_dir, session_id, position)?;

    Ok(CaptureStats { captured, last_position: position, error: None })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_transcript(dir: &Path, lines: &[&str]) -> PathBuf {
        let path = dir.join("transcript.jsonl");
        let mut f = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        path
    }

    #[test]
    fn explicit_missing_transcript_path_is_a_graceful_result_not_an_error() {
        let store = Store::open_in_memory().unwrap();
        let state_dir = tempfile::tempdir().unwrap();

        let result = capture_new(
            &store,
            state_dir.path(),
            "sess",
            Some(Path::new("/nonexistent/transcript.jsonl")),
        )
        .unwrap();

        assert_eq!(result.captured, 0);
        assert_eq!(result.error.as_deref(), Some("Transcript not found"));
    }

    #[test]
    fn captures_once_then_nothing_on_rerun() {
        let store = Store::open_in_memory().unwrap();
        let state_dir = tempfile::tempdir().unwrap();
        let transcript_dir = tempfile::tempdir().unwrap();
        let path = write_transcript(
            transcript_dir.path(),
            &[r#"{"type":"human","content":"hello there"}"#],
        );

        let first = capture_new(&store, state_dir.path(), "sess", Some(&path)).unwrap();
        assert_eq!(first.captured, 1);

        let second = capture_new(&store, state_dir.path(), "sess", Some(&path)).unwrap();
        assert_eq!(second.captured, 0);

        assert_eq!(store.count_messages(Some("sess")).unwrap(), 1);
    }

    #[test]
    fn captures_exactly_appended_lines() {
        let store = Store::open_in_memory().unwrap();
        let state_dir = tempfile::tempdir().unwrap();
        let transcript_dir = tempfile::tempdir().unwrap();
        let path = write_transcript(
            transcript_dir.path(),
            &[r#"{"type":"human","content":"line one"}"#],
        );

        capture_new(&store, state_dir.path(), "sess", Some(&path)).unwrap();

        {
            let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(f, r#"{{"type":"assistant","content":"line two"}}"#).unwrap();
        }

        let second = capture_new(&store, state_dir.path(), "sess", Some(&path)).unwrap();
        assert_eq!(second.captured, 1);
        assert_eq!(store.count_messages(Some("sess")).unwrap(), 2);
    }

    #[test]
    fn tool_use_part_renders_as_bracketed_marker() {
        let parsed: Value = serde_json::from_str(
            r#"{"type":"message","role":"assistant","content":[{"type":"tool_use","name":"bash","input":{"command":"ls"}}]}"#,
        )
        .unwrap();
        match extract(&parsed) {
            Extracted::Entry { content, .. } => assert!(content.starts_with("[Tool: bash(")),
            Extracted::Skip => panic!("expected entry"),
        }
    }

    #[test]
    fn unknown_type_is_skipped_not_defaulted() {
        let parsed: Value = serde_json::from_str(r#"{"type":"weird_thing","content":"x"}"#).unwrap();
        assert!(matches!(extract(&parsed), Extracted::Skip));
    }
}
