//! C6: search, describe, and expand over the store.
//!
//! Grounded on `original_source/src/lcm/tools/memory.py`. Two deliberate
//! deviations from the original, recorded as Open Question decisions in
//! SPEC_FULL.md §9: `has_more` is backed by a real `COUNT(*)` query rather than
//! inferred from the page size, and the FTS-to-regex fallback is left unsanitized
//! (documented on [`grep`]) rather than silently rewritten.

use regex::RegexBuilder;
use serde_json::{Value, json};

use crate::error::{LcmError, Result};
use crate::store::{FileRef, Message, Store, Summary};

pub const PAGE_SIZE: i64 = 10;
const PREVIEW_CHARS: usize = 200;
const DISPLAY_TRUNCATE_CHARS: usize = 500;

pub enum LcmId {
    Summary(i64),
    FileRef(i64),
    Message(i64),
}

pub fn parse_lcm_id(raw: &str) -> Result<LcmId> {
    if let Some(digits) = raw.strip_prefix('S') {
        return digits
            .parse::<i64>()
            .map(LcmId::Summary)
            .map_err(|_| LcmError::InvalidId(raw.to_string()));
    }
    if let Some(digits) = raw.strip_prefix('F') {
        return digits
            .parse::<i64>()
            .map(LcmId::FileRef)
            .map_err(|_| LcmError::InvalidId(raw.to_string()));
    }
    raw.parse::<i64>()
        .map(LcmId::Message)
        .map_err(|_| LcmError::InvalidId(raw.to_string()))
}

fn truncate_for_display(content: &str) -> String {
    if content.chars().count() <= DISPLAY_TRUNCATE_CHARS {
        return content.to_string();
    }
    let head: String = content.chars().take(DISPLAY_TRUNCATE_CHARS).collect();
    format!("{head}...")
}

fn format_message(m: &Message) -> Value {
    json!({
        "id": m.id,
        "session_id": m.session_id,
        "role": m.role,
        "content": truncate_for_display(&m.content),
        "timestamp": m.timestamp,
    })
}

struct Group {
    covering: String,
    preview: Option<String>,
    messages: Vec<Value>,
}

/// Groups messages by covering summary (`"S<n>"` or `"unsummarized"`), preserving
/// first-seen order (§4.6).
fn group_by_covering_summary(store: &Store, messages: &[Message]) -> Result<Vec<Group>> {
    let mut groups: Vec<Group> = Vec::new();
    let mut index_of: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for m in messages {
        let covering_summary = store.get_covering_summary(m.id)?;
        let (key, preview) = match &covering_summary {
            Some(s) => (format!("S{}", s.id), Some(truncate_for_display_n(&s.content, PREVIEW_CHARS))),
            None => ("unsummarized".to_string(), None),
        };

        let idx = *index_of.entry(key.clone()).or_insert_with(|| {
            groups.push(Group { covering: key.clone(), preview, messages: Vec::new() });
            groups.len() - 1
        });
        groups[idx].messages.push(format_message(m));
    }

    Ok(groups)
}

fn truncate_for_display_n(content: &str, n: usize) -> String {
    if content.chars().count() <= n {
        return content.to_string();
    }
    let head: String = content.chars().take(n).collect();
    format!("{head}...")
}

/// `Grep(pattern, session?, summary_id?, page, use_regex)`.
///
/// When the FTS path rejects the query, the fallback re-runs it through
/// [`Store::search_regex`] with the *same raw pattern*: an FTS query containing
/// operators (`AND`, `"`, `*`) will be interpreted as regex metacharacters. This is
/// intentional (not sanitized) so a caller's literal pattern keeps the same meaning
/// across both paths; callers passing boolean FTS syntax should expect it to behave
/// differently as a regex.
pub fn grep(
    store: &Store,
    pattern: &str,
    session_id: Option<&str>,
    summary_id: Option<i64>,
    page: i64,
    use_regex: bool,
) -> Result<Value> {
    let page = page.max(1);
    let offset = (page - 1) * PAGE_SIZE;

    if let Some(summary_id) = summary_id {
        let summary = store
            .get_summary(summary_id)?
            .ok_or_else(|| LcmError::NotFound(format!("summary {summary_id}")))?;
        let (start, end) = match (summary.msg_start_id, summary.msg_end_id) {
            (Some(s), Some(e)) => (s, e),
            _ => (1, 0), // empty range: no messages to scan
        };
        let all = store.get_messages_by_range(start, end)?;

        let filtered: Vec<&Message> = if use_regex {
            let re = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| LcmError::InvalidQuery(e.to_string()))?;
            all.iter().filter(|m| re.is_match(&m.content)).collect()
        } else {
            let needle = pattern.to_lowercase();
            all.iter().filter(|m| m.content.to_lowercase().contains(&needle)).collect()
        };

        let total = filtered.len() as i64;
        let start_idx = offset.clamp(0, total) as usize;
        let end_idx = (offset + PAGE_SIZE).clamp(0, total) as usize;
        let page_messages: Vec<Message> = filtered[start_idx..end_idx].iter().map(|m| (*m).clone()).collect();
        let groups = group_by_covering_summary(store, &page_messages)?;

        return Ok(json!({
            "groups": groups.iter().map(group_to_json).collect::<Vec<_>>(),
            "has_more": offset + PAGE_SIZE < total,
        }));
    }

    let (messages, total) = if use_regex {
        (
            store.search_regex(pattern, session_id, PAGE_SIZE, offset)?,
            store.search_regex_count(pattern, session_id)?,
        )
    } else {
        match store.search_fts(pattern, session_id, PAGE_SIZE, offset) {
            Ok(messages) => {
                let total = store.search_fts_count(pattern, session_id)?;
                (messages, total)
            }
            Err(LcmError::InvalidQuery(_)) => (
                store.search_regex(pattern, session_id, PAGE_SIZE, offset)?,
                store.search_regex_count(pattern, session_id)?,
            ),
            Err(e) => return Err(e),
        }
    };

    let groups = group_by_covering_summary(store, &messages)?;
    Ok(json!({
        "groups": groups.iter().map(group_to_json).collect::<Vec<_>>(),
        "has_more": offset + PAGE_SIZE < total,
    }))
}

fn group_to_json(g: &Group) -> Value {
    json!({
        "covering_summary": g.covering,
        "preview": g.preview,
        "messages": g.messages,
    })
}

/// `Describe(lcm_id)`.
pub fn describe(store: &Store, lcm_id: &str) -> Result<Value> {
    match parse_lcm_id(lcm_id) {
        Err(e) => Ok(json!({ "error": e.to_string() })),
        Ok(LcmId::Summary(id)) => match store.get_summary(id)? {
            None => Ok(json!({ "error": format!("summary {id} not found") })),
            Some(summary) => {
                let children = store.get_children(id)?;
                Ok(json!({
                    "summary": summary_to_json(&summary),
                    "children": children.iter().map(summary_to_json).collect::<Vec<_>>(),
                }))
            }
        },
        Ok(LcmId::FileRef(id)) => match store.get_file_ref(id)? {
            None => Ok(json!({ "error": format!("file ref {id} not found") })),
            Some(file_ref) => Ok(json!({ "file_ref": file_ref_to_json(&file_ref) })),
        },
        Ok(LcmId::Message(id)) => match store.get_message(id)? {
            None => Ok(json!({ "error": format!("message {id} not found") })),
            Some(message) => {
                let covering = store.get_covering_summary(id)?;
                Ok(json!({
                    "message": {
                        "id": message.id,
                        "session_id": message.session_id,
                        "role": message.role,
                        "content": message.content,
                        "timestamp": message.timestamp,
                        "metadata": message.metadata,
                    },
                    "covering_summary": covering.as_ref().map(summary_to_json),
                }))
            }
        },
    }
}

/// `Expand(summary_id, page)`.
pub fn expand(store: &Store, summary_id: i64, page: i64) -> Result<Value> {
    let summary = store
        .get_summary(summary_id)?
        .ok_or_else(|| LcmError::NotFound(format!("summary {summary_id}")))?;

    let (start, end) = match (summary.msg_start_id, summary.msg_end_id) {
        (Some(s), Some(e)) => (s, e),
        _ => (1, 0),
    };
    let all = store.get_messages_by_range(start, end)?;
    let total = all.len() as i64;

    let page = page.max(1);
    let offset = (page - 1) * PAGE_SIZE;
    let start_idx = offset.clamp(0, total) as usize;
    let end_idx = (offset + PAGE_SIZE).clamp(0, total) as usize;
    let page_messages = &all[start_idx..end_idx];

    let children = store.get_children(summary_id)?;

    Ok(json!({
        "summary": summary_to_json(&summary),
        "messages": page_messages.iter().map(format_message).collect::<Vec<_>>(),
        "total_messages": total,
        "child_summaries": children.iter().map(summary_to_json).collect::<Vec<_>>(),
    }))
}

fn summary_to_json(s: &Summary) -> Value {
    json!({
        "id": s.id,
        "session_id": s.session_id,
        "level": s.level,
        "mode": s.mode.as_str(),
        "content": s.content,
        "token_estimate": s.token_estimate,
        "msg_start_id": s.msg_start_id,
        "msg_end_id": s.msg_end_id,
        "timestamp": s.timestamp,
    })
}

fn file_ref_to_json(f: &FileRef) -> Value {
    json!({
        "id": f.id,
        "session_id": f.session_id,
        "file_path": f.file_path,
        "file_type": f.file_type,
        "size_bytes": f.size_bytes,
        "exploration_summary": f.exploration_summary,
        "token_estimate": f.token_estimate,
        "timestamp": f.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_append_then_search() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_message("s1", "user", "Fix the authentication bug in login.py", None)
            .unwrap();
        store.insert_message("s1", "user", "Add unit tests for payments", None).unwrap();
        store.insert_message("s1", "user", "Deploy to staging", None).unwrap();

        let result = grep(&store, "authentication", Some("s1"), None, 1, false).unwrap();
        let groups = result["groups"].as_array().unwrap();
        assert_eq!(groups.len(), 1);
        let messages = groups[0]["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0]["content"].as_str().unwrap().contains("authentication"));
    }

    #[test]
    fn grep_beyond_last_page_has_no_more() {
        let store = Store::open_in_memory().unwrap();
        store.insert_message("s1", "user", "apple pie", None).unwrap();

        let result = grep(&store, "apple", Some("s1"), None, 99, false).unwrap();
        assert_eq!(result["has_more"], false);
        assert_eq!(result["groups"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn describe_rejects_malformed_id() {
        let store = Store::open_in_memory().unwrap();
        let result = describe(&store, "Xabc").unwrap();
        assert!(result["error"].is_string());
    }

    #[test]
    fn describe_message_includes_covering_summary() {
        let store = Store::open_in_memory().unwrap();
        let a = store.insert_message("s1", "user", "one", None).unwrap();
        let b = store.insert_message("s1", "user", "two", None).unwrap();
        store
            .create_leaf_summary("s1", "summary", a, b, crate::store::SummaryMode::Passthrough)
            .unwrap();

        let result = describe(&store, &a.to_string()).unwrap();
        assert!(result["covering_summary"]["id"].is_i64());
    }

    #[test]
    fn expand_returns_children_and_pagination() {
        let store = Store::open_in_memory().unwrap();
        let ids: Vec<i64> = (0..15)
            .map(|i| store.insert_message("s1", "user", &format!("m{i}"), None).unwrap())
            .collect();
        let summary_id = store
            .create_leaf_summary("s1", "leaf", ids[0], ids[14], crate::store::SummaryMode::Passthrough)
            .unwrap();

        let result = expand(&store, summary_id, 1).unwrap();
        assert_eq!(result["total_messages"], 15);
        assert_eq!(result["messages"].as_array().unwrap().len(), 10);

        let page2 = expand(&store, summary_id, 2).unwrap();
        assert_eq!(page2["messages"].as_array().unwrap().len(), 5);
    }
}
