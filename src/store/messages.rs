//! Message CRUD, full-text search, and regex search.
//!
//! Grounded on `original_source/src/lcm/store/messages.py`: the exact SQL shapes
//! (the correlated `NOT EXISTS` subquery for `GetUnsummarizedMessages`, the FTS5
//! `MATCH` query, the regex fallback) are carried over; only the host language
//! changes.

use chrono::Utc;
use regex::RegexBuilder;
use rusqlite::{OptionalExtension, Row, params};
use std::collections::HashMap;

use super::{Store, token_estimate};
use crate::error::{LcmError, Result};

#[derive(Debug, Clone, serde::Serialize)]
pub struct Message {
    pub id: i64,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub token_estimate: i64,
    pub timestamp: String,
    pub metadata: Option<HashMap<String, String>>,
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let metadata_json: Option<String> = row.get("metadata")?;
    let metadata = metadata_json
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok());
    Ok(Message {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        role: row.get("role")?,
        content: row.get("content")?,
        token_estimate: row.get("token_estimate")?,
        timestamp: row.get("timestamp")?,
        metadata,
    })
}

impl Store {
    pub fn insert_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        metadata: Option<&HashMap<String, String>>,
    ) -> Result<i64> {
        let conn = self.lock();
        let estimate = token_estimate(content);
        let now = Utc::now().to_rfc3339();
        let metadata_json = match metadata {
            Some(m) => Some(serde_json::to_string(m)?),
            None => None,
        };
        conn.execute(
            "INSERT INTO messages (session_id, role, content, token_estimate, timestamp, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![session_id, role, content, estimate, now, metadata_json],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_message(&self, id: i64) -> Result<Option<Message>> {
        let conn = self.lock();
        conn.query_row("SELECT * FROM messages WHERE id = ?1", [id], row_to_message)
            .optional()
            .map_err(LcmError::from)
    }

    pub fn get_messages_by_range(&self, lo: i64, hi: i64) -> Result<Vec<Message>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM messages WHERE id >= ?1 AND id <= ?2 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([lo, hi], row_to_message)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn get_messages_by_session(
        &self,
        session_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM messages WHERE session_id = ?1 ORDER BY id ASC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![session_id, limit, offset], row_to_message)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Returns `Err(InvalidQuery)` if the FTS5 query syntax is rejected, so callers
    /// (§4.6 `Grep`) can fall back to [`Store::search_regex`].
    pub fn search_fts(
        &self,
        query: &str,
        session_id: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>> {
        let conn = self.lock();
        let sql = match session_id {
            Some(_) => {
                "SELECT m.* FROM messages m
                 JOIN messages_fts f ON f.rowid = m.id
                 WHERE f.content MATCH ?1 AND m.session_id = ?2
                 ORDER BY bm25(messages_fts) LIMIT ?3 OFFSET ?4"
            }
            None => {
                "SELECT m.* FROM messages m
                 JOIN messages_fts f ON f.rowid = m.id
                 WHERE f.content MATCH ?1
                 ORDER BY bm25(messages_fts) LIMIT ?2 OFFSET ?3"
            }
        };
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| LcmError::InvalidQuery(e.to_string()))?;

        let mapped = match session_id {
            Some(s) => stmt.query_map(params![query, s, limit, offset], row_to_message),
            None => stmt.query_map(params![query, limit, offset], row_to_message),
        }
        .map_err(|e| LcmError::InvalidQuery(e.to_string()))?;

        mapped
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| LcmError::InvalidQuery(e.to_string()))
    }

    pub fn search_fts_count(&self, query: &str, session_id: Option<&str>) -> Result<i64> {
        let conn = self.lock();
        let sql = match session_id {
            Some(_) => {
                "SELECT COUNT(*) FROM messages m JOIN messages_fts f ON f.rowid = m.id
                 WHERE f.content MATCH ?1 AND m.session_id = ?2"
            }
            None => {
                "SELECT COUNT(*) FROM messages m JOIN messages_fts f ON f.rowid = m.id
                 WHERE f.content MATCH ?1"
            }
        };
        let result = match session_id {
            Some(s) => conn.query_row(sql, params![query, s], |r| r.get(0)),
            None => conn.query_row(sql, params![query], |r| r.get(0)),
        };
        result.map_err(|e| LcmError::InvalidQuery(e.to_string()))
    }

    /// Case-insensitive regex match over `content`, ordered by id ascending.
    /// Offset is applied *after* filtering, per §4.1.
    pub fn search_regex(
        &self,
        pattern: &str,
        session_id: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>> {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| LcmError::InvalidQuery(e.to_string()))?;

        let conn = self.lock();
        let all: Vec<Message> = match session_id {
            Some(s) => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM messages WHERE session_id = ?1 ORDER BY id ASC",
                )?;
                stmt.query_map([s], row_to_message)?
                    .collect::<rusqlite::Result<_>>()?
            }
            None => {
                let mut stmt = conn.prepare("SELECT * FROM messages ORDER BY id ASC")?;
                stmt.query_map([], row_to_message)?
                    .collect::<rusqlite::Result<_>>()?
            }
        };
        drop(conn);

        let filtered: Vec<Message> = all.into_iter().filter(|m| re.is_match(&m.content)).collect();
        let total = filtered.len();
        let start = (offset as usize).min(total);
        let end = ((offset + limit).max(0) as usize).min(total);
        Ok(filtered[start..end].to_vec())
    }

    pub fn search_regex_count(&self, pattern: &str, session_id: Option<&str>) -> Result<i64> {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| LcmError::InvalidQuery(e.to_string()))?;
        let conn = self.lock();
        let all: Vec<String> = match session_id {
            Some(s) => {
                let mut stmt = conn.prepare("SELECT content FROM messages WHERE session_id = ?1")?;
                stmt.query_map([s], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?
            }
            None => {
                let mut stmt = conn.prepare("SELECT content FROM messages")?;
                stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?
            }
        };
        Ok(all.iter().filter(|c| re.is_match(c)).count() as i64)
    }

    /// Messages with no covering summary, ordered by id ascending.
    pub fn get_unsummarized_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT m.* FROM messages m
             WHERE m.session_id = ?1
             AND NOT EXISTS (
                 SELECT 1 FROM summaries s
                 WHERE s.session_id = m.session_id
                 AND s.msg_start_id IS NOT NULL
                 AND s.msg_start_id <= m.id AND s.msg_end_id >= m.id
             )
             ORDER BY m.id ASC",
        )?;
        let rows = stmt.query_map([session_id], row_to_message)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn count_messages(&self, session_id: Option<&str>) -> Result<i64> {
        let conn = self.lock();
        let count = match session_id {
            Some(s) => conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
                [s],
                |r| r.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?,
        };
        Ok(count)
    }

    pub fn total_tokens(&self, session_id: Option<&str>) -> Result<i64> {
        let conn = self.lock();
        let total: Option<i64> = match session_id {
            Some(s) => conn.query_row(
                "SELECT SUM(token_estimate) FROM messages WHERE session_id = ?1",
                [s],
                |r| r.get(0),
            )?,
            None => conn.query_row("SELECT SUM(token_estimate) FROM messages", [], |r| r.get(0))?,
        };
        Ok(total.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let store = Store::open_in_memory().unwrap();
        let id = store.insert_message("s1", "user", "hello world", None).unwrap();
        let msg = store.get_message(id).unwrap().unwrap();
        assert_eq!(msg.content, "hello world");
        assert_eq!(msg.token_estimate, token_estimate("hello world"));
    }

    #[test]
    fn ids_strictly_increase_within_session() {
        let store = Store::open_in_memory().unwrap();
        let a = store.insert_message("s1", "user", "a", None).unwrap();
        let b = store.insert_message("s1", "user", "b", None).unwrap();
        assert!(b > a);
    }

    #[test]
    fn fts_search_finds_substring() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_message("s1", "user", "Fix the authentication bug in login.py", None)
            .unwrap();
        store.insert_message("s1", "user", "Add unit tests for payments", None).unwrap();
        store.insert_message("s1", "user", "Deploy to staging", None).unwrap();

        let hits = store.search_fts("authentication", Some("s1"), 10, 0).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("authentication"));
    }

    #[test]
    fn regex_search_is_case_insensitive_and_ordered() {
        let store = Store::open_in_memory().unwrap();
        store.insert_message("s1", "user", "Error: disk full", None).unwrap();
        store.insert_message("s1", "user", "all good", None).unwrap();
        store.insert_message("s1", "user", "ERROR: retry", None).unwrap();

        let hits = store.search_regex("error", Some("s1"), 10, 0).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].id < hits[1].id);
    }

    #[test]
    fn unsummarized_excludes_covered_messages() {
        let store = Store::open_in_memory().unwrap();
        let a = store.insert_message("s1", "user", "one", None).unwrap();
        let b = store.insert_message("s1", "user", "two", None).unwrap();
        let c = store.insert_message("s1", "user", "three", None).unwrap();

        store.create_leaf_summary("s1", "summary", a, b, crate::store::SummaryMode::Passthrough).unwrap();

        let unsummarized = store.get_unsummarized_messages("s1").unwrap();
        assert_eq!(unsummarized.len(), 1);
        assert_eq!(unsummarized[0].id, c);
    }
}
