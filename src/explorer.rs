//! C9: the filetype-aware explorer.
//!
//! Grounded on `original_source/src/lcm/compaction/file_explorer.py`: the
//! deterministic/code/generic suffix sets, the exact read caps, the depth-3,
//! 10-item-per-level `_describe_shape` recursion, and the LLM-failure fallback
//! message format.

use serde_json::Value;
use std::path::Path;

use crate::llm::{LlmGateway, SummarizeMode};
use crate::store::token_estimate;

const DETERMINISTIC_TYPES: &[&str] = &["json", "csv", "tsv", "jsonl", "ndjson"];
const CODE_TYPES: &[&str] = &["py", "js", "ts", "tsx", "jsx", "go", "rs", "java", "rb"];

const DETERMINISTIC_READ_CAP: usize = 50_000;
const CODE_READ_CAP: usize = 30_000;
const GENERIC_READ_CAP: usize = 20_000;
const SHAPE_MAX_DEPTH: usize = 3;
const SHAPE_ITEM_CAP: usize = 10;

#[derive(Debug, Clone, serde::Serialize)]
pub struct FileAnalysis {
    pub file_type: Option<String>,
    pub size_bytes: Option<u64>,
    pub exploration_summary: String,
}

pub fn analyze_file(gateway: &dyn LlmGateway, path: &Path) -> FileAnalysis {
    if !path.exists() {
        return FileAnalysis {
            file_type: None,
            size_bytes: None,
            exploration_summary: format!("File not found: {}", path.display()),
        };
    }

    let size_bytes = std::fs::metadata(path).ok().map(|m| m.len());
    let suffix = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let summary = if DETERMINISTIC_TYPES.contains(&suffix.as_str()) {
        analyze_deterministic(path, &suffix)
    } else if CODE_TYPES.contains(&suffix.as_str()) {
        analyze_code(gateway, path, &suffix)
    } else {
        analyze_generic(gateway, path)
    };

    FileAnalysis { file_type: Some(suffix), size_bytes, exploration_summary: summary }
}

fn read_capped(path: &Path, cap: usize) -> std::io::Result<String> {
    let raw = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&raw).into_owned();
    Ok(text.chars().take(cap).collect())
}

fn analyze_deterministic(path: &Path, suffix: &str) -> String {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let content = match read_capped(path, DETERMINISTIC_READ_CAP) {
        Ok(c) => c,
        Err(e) => return format!("Error analyzing {name}: {e}"),
    };

    match suffix {
        "json" => analyze_json(&content),
        "csv" => analyze_csv(&content, ','),
        "tsv" => analyze_csv(&content, '\t'),
        "jsonl" | "ndjson" => analyze_jsonl(&content),
        _ => format!("Structured data file: {name}"),
    }
}

fn analyze_json(content: &str) -> String {
    match serde_json::from_str::<Value>(content) {
        Ok(v) => format!("JSON: {}", describe_shape(&v, 0)),
        Err(e) => format!("Invalid JSON: {e}"),
    }
}

fn analyze_csv(content: &str, delimiter: char) -> String {
    let rows: Vec<Vec<&str>> = content
        .lines()
        .map(|line| line.split(delimiter).collect())
        .collect();
    if rows.is_empty() {
        return "Empty CSV".to_string();
    }
    let headers = &rows[0];
    format!("CSV: {} rows, columns: {:?}", rows.len() - 1, headers)
}

fn analyze_jsonl(content: &str) -> String {
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return "Empty JSONL".to_string();
    }
    match serde_json::from_str::<Value>(lines[0]) {
        Ok(first) => format!("JSONL: {} lines, first entry schema: {}", lines.len(), describe_shape(&first, 0)),
        Err(_) => format!("JSONL: {} lines (parse error on first)", lines.len()),
    }
}

/// Recursively describes the shape of a JSON value, depth-limited to 3 with a
/// 10-item cap per level (matches `_describe_shape` exactly).
fn describe_shape(value: &Value, depth: usize) -> String {
    if depth >= SHAPE_MAX_DEPTH {
        return "...".to_string();
    }

    match value {
        Value::Object(map) => {
            if map.is_empty() {
                return "{}".to_string();
            }
            let items: Vec<String> = map
                .iter()
                .take(SHAPE_ITEM_CAP)
                .map(|(k, v)| format!("{k}: {}", describe_shape(v, depth + 1)))
                .collect();
            let suffix = if map.len() > SHAPE_ITEM_CAP { ", ..." } else { "" };
            format!("{{{}{}}}", items.join(", "), suffix)
        }
        Value::Array(arr) => {
            if arr.is_empty() {
                return "[]".to_string();
            }
            format!("[{}] ({} items)", describe_shape(&arr[0], depth + 1), arr.len())
        }
        Value::String(_) => "str".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "int".to_string()
            } else {
                "float".to_string()
            }
        }
        Value::Null => "null".to_string(),
    }
}

fn analyze_code(gateway: &dyn LlmGateway, path: &Path, suffix: &str) -> String {
    let content = match read_capped(path, CODE_READ_CAP) {
        Ok(c) => c,
        Err(_) => String::new(),
    };

    let prompt_text = format!(
        "Analyze this .{suffix} file and list:\n\
         1. Function/method signatures (name, params, return type)\n\
         2. Class names and their hierarchies\n\
         3. Key imports\n\
         4. Module-level constants\n\
         Be concise -- just signatures and names, no implementations."
    );
    let full_input = format!("{prompt_text}\n\n```{suffix}\n{content}\n```");

    match gateway.summarize(&full_input, SummarizeMode::PreserveDetails, 600) {
        Ok(result) => result,
        Err(e) => {
            let line_count = content.matches('\n').count() + 1;
            format!(".{suffix} file: {line_count} lines (LLM analysis failed: {e})")
        }
    }
}

fn analyze_generic(gateway: &dyn LlmGateway, path: &Path) -> String {
    let content = match read_capped(path, GENERIC_READ_CAP) {
        Ok(c) => c,
        Err(_) => return format!("Binary or unreadable file: {}", path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()),
    };

    let excerpt: String = content.chars().take(5000).collect();
    let prompt = format!("Briefly describe the contents and purpose of this file:\n\n{excerpt}");

    match gateway.summarize(&prompt, SummarizeMode::BulletPoints, 300) {
        Ok(result) => result,
        Err(e) => {
            let line_count = content.matches('\n').count() + 1;
            format!("Text file: {line_count} lines (LLM analysis failed: {e})")
        }
    }
}

/// Sum of estimated tokens for a finished analysis, used when persisting it as a
/// [`crate::store::FileRef`].
pub fn estimate_tokens(analysis: &FileAnalysis) -> i64 {
    token_estimate(&analysis.exploration_summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FakeGateway;
    use serde_json::json;

    #[test]
    fn missing_file_reports_not_found() {
        let gateway = FakeGateway::always_fail();
        let analysis = analyze_file(&gateway, Path::new("/does/not/exist.json"));
        assert!(analysis.file_type.is_none());
        assert!(analysis.exploration_summary.starts_with("File not found"));
    }

    #[test]
    fn json_file_gets_deterministic_shape_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"{"a": 1, "b": [1,2,3], "c": "x"}"#).unwrap();

        let gateway = FakeGateway::always_fail();
        let analysis = analyze_file(&gateway, &path);
        assert_eq!(analysis.file_type.as_deref(), Some("json"));
        assert!(analysis.exploration_summary.starts_with("JSON:"));
        assert!(analysis.exploration_summary.contains("int"));
    }

    #[test]
    fn csv_file_reports_row_count_and_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "name,age\nalice,30\nbob,40\n").unwrap();

        let gateway = FakeGateway::always_fail();
        let analysis = analyze_file(&gateway, &path);
        assert!(analysis.exploration_summary.contains("2 rows"));
    }

    #[test]
    fn code_file_falls_back_when_llm_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.rs");
        std::fs::write(&path, "fn main() {}\nfn helper() {}\n").unwrap();

        let gateway = FakeGateway::always_fail();
        let analysis = analyze_file(&gateway, &path);
        assert!(analysis.exploration_summary.contains("LLM analysis failed"));
    }

    #[test]
    fn describe_shape_caps_depth_and_item_count() {
        let deeply_nested = json!({"a": {"b": {"c": {"d": 1}}}});
        let shape = describe_shape(&deeply_nested, 0);
        assert!(shape.contains("..."));

        let mut big_map = serde_json::Map::new();
        for i in 0..20 {
            big_map.insert(format!("k{i}"), json!(i));
        }
        let shape = describe_shape(&Value::Object(big_map), 0);
        assert!(shape.ends_with(", ...}"));
    }
}
