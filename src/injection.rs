//! C7: the injection builder.
//!
//! Grounded on `original_source/src/lcm/hooks/inject.py`: the fixed header, the
//! per-summary `S<id> (L<level>, messages <start>-<end>)` block, and the
//! budget-exceeded footnote behavior.

use crate::store::{Store, Summary};

pub const DEFAULT_MAX_TOKENS: i64 = 4000;

const HEADER: &str = "# LCM Context Recovery\n\n\
The following summaries recover prior conversation context that has been \
condensed out of the live window. Use `expand(id)` to drill into the original \
messages or child summaries, and `grep(pattern)` to search across the full \
history.\n";

fn render_summary_block(s: &Summary) -> String {
    let start = s.msg_start_id.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string());
    let end = s.msg_end_id.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string());
    format!("## S{} (L{}, messages {}-{})\n\n{}\n", s.id, s.level, start, end, s.content)
}

/// `BuildInjection(session, max_tokens=4000)`.
pub fn build_injection(store: &Store, session_id: &str, max_tokens: i64) -> crate::error::Result<String> {
    let top_level = store.get_top_level_summaries(session_id)?;
    if top_level.is_empty() {
        return Ok(String::new());
    }

    let mut body = String::new();
    let mut running_tokens: i64 = 0;
    let mut truncated = false;

    for summary in &top_level {
        if running_tokens + summary.token_estimate > max_tokens {
            truncated = true;
            break;
        }
        running_tokens += summary.token_estimate;
        body.push_str(&render_summary_block(summary));
        body.push('\n');
    }

    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    out.push_str(&body);
    if truncated {
        out.push_str("\n_More summaries are available beyond this budget; use `expand`/`grep` to retrieve them._\n");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SummaryMode;

    #[test]
    fn empty_session_yields_empty_injection() {
        let store = Store::open_in_memory().unwrap();
        let result = build_injection(&store, "s1", DEFAULT_MAX_TOKENS).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn emits_header_and_summary_blocks_within_budget() {
        let store = Store::open_in_memory().unwrap();
        let a = store.insert_message("s1", "user", "one", None).unwrap();
        let b = store.insert_message("s1", "user", "two", None).unwrap();
        store.create_leaf_summary("s1", "did some work", a, b, SummaryMode::BulletPoints).unwrap();

        let result = build_injection(&store, "s1", DEFAULT_MAX_TOKENS).unwrap();
        assert!(result.contains("# LCM Context Recovery"));
        assert!(result.contains("did some work"));
        assert!(result.contains(&format!("messages {a}-{b}")));
    }

    #[test]
    fn stops_and_footnotes_when_budget_exceeded() {
        let store = Store::open_in_memory().unwrap();
        let mut prev_end = 0;
        for i in 0..3 {
            let a = store.insert_message("s1", "user", &"x".repeat(4000), None).unwrap();
            let b = store.insert_message("s1", "user", &"y".repeat(4000), None).unwrap();
            store
                .create_leaf_summary("s1", &format!("summary {i} {}", "z".repeat(4000)), a, b, SummaryMode::BulletPoints)
                .unwrap();
            prev_end = b;
        }
        let _ = prev_end;

        let result = build_injection(&store, "s1", 500).unwrap();
        assert!(result.contains("More summaries are available"));
    }
}
