//! Summary and DAG-edge CRUD.
//!
//! Grounded on `original_source/src/lcm/store/summaries.py`: the min/max-range and
//! max-level+1 computation for condensed summaries, and the leaf/top-level/covering
//! queries. Two deviations from the original are deliberate and recorded in
//! DESIGN.md: `create_leaf_summary` enforces range disjointness against existing
//! leaves (Open Question 1), and `create_condensed_summary` rejects an empty
//! `child_ids` (Open Question 4) instead of producing a rangeless level-1 summary.

use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};

use super::Store;
use crate::error::{LcmError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SummaryMode {
    PreserveDetails,
    BulletPoints,
    DeterministicTruncate,
    Passthrough,
}

impl SummaryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryMode::PreserveDetails => "preserve_details",
            SummaryMode::BulletPoints => "bullet_points",
            SummaryMode::DeterministicTruncate => "deterministic_truncate",
            SummaryMode::Passthrough => "passthrough",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "preserve_details" => Ok(SummaryMode::PreserveDetails),
            "bullet_points" => Ok(SummaryMode::BulletPoints),
            "deterministic_truncate" => Ok(SummaryMode::DeterministicTruncate),
            "passthrough" => Ok(SummaryMode::Passthrough),
            other => Err(LcmError::ParseError(format!("unknown summary mode: {other}"))),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Summary {
    pub id: i64,
    pub session_id: String,
    pub level: i64,
    pub content: String,
    pub token_estimate: i64,
    pub mode: SummaryMode,
    pub timestamp: String,
    pub msg_start_id: Option<i64>,
    pub msg_end_id: Option<i64>,
}

fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<Summary> {
    let mode_str: String = row.get("mode")?;
    Ok(Summary {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        level: row.get("level")?,
        content: row.get("content")?,
        token_estimate: row.get("token_estimate")?,
        mode: SummaryMode::parse(&mode_str)
            .unwrap_or(SummaryMode::Passthrough),
        timestamp: row.get("timestamp")?,
        msg_start_id: row.get("msg_start_id")?,
        msg_end_id: row.get("msg_end_id")?,
    })
}

impl Store {
    pub fn create_leaf_summary(
        &self,
        session_id: &str,
        content: &str,
        msg_start_id: i64,
        msg_end_id: i64,
        mode: SummaryMode,
    ) -> Result<i64> {
        if msg_start_id > msg_end_id {
            return Err(LcmError::InvalidQuery(format!(
                "msg_start_id {msg_start_id} > msg_end_id {msg_end_id}"
            )));
        }

        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let overlap: i64 = tx.query_row(
            "SELECT COUNT(*) FROM summaries
             WHERE session_id = ?1 AND msg_start_id IS NOT NULL
             AND msg_start_id <= ?3 AND msg_end_id >= ?2",
            params![session_id, msg_start_id, msg_end_id],
            |r| r.get(0),
        )?;
        if overlap > 0 {
            return Err(LcmError::InvalidQuery(format!(
                "range [{msg_start_id},{msg_end_id}] overlaps an existing summary in session {session_id}"
            )));
        }

        let estimate = super::token_estimate(content);
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO summaries (session_id, level, content, token_estimate, mode, timestamp, msg_start_id, msg_end_id)
             VALUES (?1, 0, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![session_id, content, estimate, mode.as_str(), now, msg_start_id, msg_end_id],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    /// Computes `msg_start/msg_end` and `level` from the children (invariants 4-5)
    /// and writes the summary row plus all edges atomically. Aborts (returns
    /// `InvalidQuery`) if any child already has a parent, preventing two
    /// overlapping condensations from double-covering the same leaf (§5).
    pub fn create_condensed_summary(
        &self,
        session_id: &str,
        content: &str,
        child_ids: &[i64],
        mode: SummaryMode,
    ) -> Result<i64> {
        if child_ids.is_empty() {
            return Err(LcmError::InvalidQuery(
                "create_condensed_summary requires at least one child".to_string(),
            ));
        }

        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let mut min_start: Option<i64> = None;
        let mut max_end: Option<i64> = None;
        let mut max_level: i64 = -1;

        for &child_id in child_ids {
            let already_parented: i64 = tx.query_row(
                "SELECT COUNT(*) FROM summary_links WHERE child_id = ?1",
                [child_id],
                |r| r.get(0),
            )?;
            if already_parented > 0 {
                return Err(LcmError::InvalidQuery(format!(
                    "child summary {child_id} already has a parent"
                )));
            }

            let (level, start, end): (i64, Option<i64>, Option<i64>) = tx
                .query_row(
                    "SELECT level, msg_start_id, msg_end_id FROM summaries WHERE id = ?1 AND session_id = ?2",
                    params![child_id, session_id],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )
                .map_err(|_| LcmError::NotFound(format!("summary {child_id}")))?;

            max_level = max_level.max(level);
            if let Some(s) = start {
                min_start = Some(min_start.map_or(s, |m: i64| m.min(s)));
            }
            if let Some(e) = end {
                max_end = Some(max_end.map_or(e, |m: i64| m.max(e)));
            }
        }

        let estimate = super::token_estimate(content);
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO summaries (session_id, level, content, token_estimate, mode, timestamp, msg_start_id, msg_end_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![session_id, max_level + 1, content, estimate, mode.as_str(), now, min_start, max_end],
        )?;
        let parent_id = tx.last_insert_rowid();

        for &child_id in child_ids {
            tx.execute(
                "INSERT INTO summary_links (parent_id, child_id) VALUES (?1, ?2)",
                params![parent_id, child_id],
            )?;
        }

        tx.commit()?;
        Ok(parent_id)
    }

    pub fn get_summary(&self, id: i64) -> Result<Option<Summary>> {
        let conn = self.lock();
        conn.query_row("SELECT * FROM summaries WHERE id = ?1", [id], row_to_summary)
            .optional()
            .map_err(LcmError::from)
    }

    pub fn get_children(&self, parent_id: i64) -> Result<Vec<Summary>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT s.* FROM summaries s
             JOIN summary_links l ON l.child_id = s.id
             WHERE l.parent_id = ?1 ORDER BY s.msg_start_id ASC",
        )?;
        let rows = stmt.query_map([parent_id], row_to_summary)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn get_parents(&self, child_id: i64) -> Result<Vec<Summary>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT s.* FROM summaries s
             JOIN summary_links l ON l.parent_id = s.id
             WHERE l.child_id = ?1",
        )?;
        let rows = stmt.query_map([child_id], row_to_summary)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn count_summaries(&self, session_id: Option<&str>) -> Result<i64> {
        let conn = self.lock();
        let count = match session_id {
            Some(s) => conn.query_row(
                "SELECT COUNT(*) FROM summaries WHERE session_id = ?1",
                [s],
                |r| r.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM summaries", [], |r| r.get(0))?,
        };
        Ok(count)
    }

    pub fn get_dag_depth(&self, session_id: &str) -> Result<i64> {
        let conn = self.lock();
        let depth: Option<i64> = conn.query_row(
            "SELECT MAX(level) FROM summaries WHERE session_id = ?1",
            [session_id],
            |r| r.get(0),
        )?;
        Ok(depth.unwrap_or(0))
    }

    /// The highest-level summary whose range contains the message.
    pub fn get_covering_summary(&self, message_id: i64) -> Result<Option<Summary>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT s.* FROM summaries s
             JOIN messages m ON m.session_id = s.session_id
             WHERE m.id = ?1 AND s.msg_start_id IS NOT NULL
             AND s.msg_start_id <= m.id AND s.msg_end_id >= m.id
             ORDER BY s.level DESC LIMIT 1",
            [message_id],
            row_to_summary,
        )
        .optional()
        .map_err(LcmError::from)
    }

    /// Summaries with no incoming edge, ordered by `msg_start_id`: the session's roof.
    pub fn get_top_level_summaries(&self, session_id: &str) -> Result<Vec<Summary>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT s.* FROM summaries s
             WHERE s.session_id = ?1
             AND NOT EXISTS (SELECT 1 FROM summary_links l WHERE l.child_id = s.id)
             ORDER BY s.msg_start_id ASC",
        )?;
        let rows = stmt.query_map([session_id], row_to_summary)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// `level = 0` summaries with no incoming edge: eligible for condensation.
    pub fn get_leaf_summaries(&self, session_id: &str) -> Result<Vec<Summary>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT s.* FROM summaries s
             WHERE s.session_id = ?1 AND s.level = 0
             AND NOT EXISTS (SELECT 1 FROM summary_links l WHERE l.child_id = s.id)
             ORDER BY s.msg_start_id ASC",
        )?;
        let rows = stmt.query_map([session_id], row_to_summary)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_messages(store: &Store, session: &str, n: i64) -> Vec<i64> {
        (0..n)
            .map(|i| store.insert_message(session, "user", &format!("msg {i}"), None).unwrap())
            .collect()
    }

    #[test]
    fn condensed_summary_gets_level_one_and_full_range() {
        let store = Store::open_in_memory().unwrap();
        let ids = seed_messages(&store, "s1", 100);
        let leaf1 = store
            .create_leaf_summary("s1", "first half", ids[0], ids[49], SummaryMode::BulletPoints)
            .unwrap();
        let leaf2 = store
            .create_leaf_summary("s1", "second half", ids[50], ids[99], SummaryMode::BulletPoints)
            .unwrap();

        let parent_id = store
            .create_condensed_summary("s1", "condensed", &[leaf1, leaf2], SummaryMode::BulletPoints)
            .unwrap();
        let parent = store.get_summary(parent_id).unwrap().unwrap();

        assert_eq!(parent.level, 1);
        assert_eq!(parent.msg_start_id, Some(ids[0]));
        assert_eq!(parent.msg_end_id, Some(ids[99]));
    }

    #[test]
    fn overlapping_leaf_ranges_rejected() {
        let store = Store::open_in_memory().unwrap();
        let ids = seed_messages(&store, "s1", 10);
        store
            .create_leaf_summary("s1", "a", ids[0], ids[5], SummaryMode::Passthrough)
            .unwrap();
        let result = store.create_leaf_summary("s1", "b", ids[3], ids[8], SummaryMode::Passthrough);
        assert!(result.is_err());
    }

    #[test]
    fn empty_child_ids_rejected() {
        let store = Store::open_in_memory().unwrap();
        let result = store.create_condensed_summary("s1", "x", &[], SummaryMode::Passthrough);
        assert!(matches!(result, Err(LcmError::InvalidQuery(_))));
    }

    #[test]
    fn double_condensation_of_same_child_rejected() {
        let store = Store::open_in_memory().unwrap();
        let ids = seed_messages(&store, "s1", 20);
        let leaf = store
            .create_leaf_summary("s1", "a", ids[0], ids[9], SummaryMode::Passthrough)
            .unwrap();
        store
            .create_condensed_summary("s1", "p1", &[leaf], SummaryMode::Passthrough)
            .unwrap();
        let result = store.create_condensed_summary("s1", "p2", &[leaf], SummaryMode::Passthrough);
        assert!(result.is_err());
    }
}
