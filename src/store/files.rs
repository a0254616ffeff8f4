//! FileRef CRUD and path search.
//!
//! Grounded on `original_source/src/lcm/store/files.py`, including
//! `search_files_by_path`, a convenience the distilled spec dropped but which this
//! repo carries forward (SPEC_FULL.md §10.3).

use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};

use super::Store;
use crate::error::{LcmError, Result};

#[derive(Debug, Clone, serde::Serialize)]
pub struct FileRef {
    pub id: i64,
    pub session_id: String,
    pub file_path: String,
    pub file_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub exploration_summary: String,
    pub token_estimate: i64,
    pub timestamp: String,
}

fn row_to_file_ref(row: &Row<'_>) -> rusqlite::Result<FileRef> {
    Ok(FileRef {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        file_path: row.get("file_path")?,
        file_type: row.get("file_type")?,
        size_bytes: row.get("size_bytes")?,
        exploration_summary: row.get("exploration_summary")?,
        token_estimate: row.get("token_estimate")?,
        timestamp: row.get("timestamp")?,
    })
}

impl Store {
    pub fn create_file_ref(
        &self,
        session_id: &str,
        file_path: &str,
        file_type: Option<&str>,
        size_bytes: Option<i64>,
        exploration_summary: &str,
    ) -> Result<i64> {
        let conn = self.lock();
        let estimate = super::token_estimate(exploration_summary);
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO large_files
             (session_id, file_path, file_type, size_bytes, exploration_summary, token_estimate, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![session_id, file_path, file_type, size_bytes, exploration_summary, estimate, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_file_ref(&self, id: i64) -> Result<Option<FileRef>> {
        let conn = self.lock();
        conn.query_row("SELECT * FROM large_files WHERE id = ?1", [id], row_to_file_ref)
            .optional()
            .map_err(LcmError::from)
    }

    pub fn list_file_refs(&self, session_id: &str, limit: i64, offset: i64) -> Result<Vec<FileRef>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM large_files WHERE session_id = ?1 ORDER BY timestamp DESC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![session_id, limit, offset], row_to_file_ref)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Case-insensitive substring match of `file_path`, most recent first.
    pub fn search_file_refs_by_path(
        &self,
        session_id: &str,
        path_fragment: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FileRef>> {
        let conn = self.lock();
        let pattern = format!("%{}%", path_fragment.replace('%', "\\%").replace('_', "\\_"));
        let mut stmt = conn.prepare(
            "SELECT * FROM large_files
             WHERE session_id = ?1 AND file_path LIKE ?2 ESCAPE '\\'
             ORDER BY timestamp DESC LIMIT ?3 OFFSET ?4",
        )?;
        let rows = stmt.query_map(params![session_id, pattern, limit, offset], row_to_file_ref)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}
