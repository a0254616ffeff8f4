//! C1: the append-only message/summary/file-ref store.
//!
//! Backed by `rusqlite`, opened read-write with WAL journaling and foreign keys on,
//! the way a durable embedded store should be configured (the teacher's `open_db`
//! only ever opens read-only, since its domain never writes; this component
//! generalizes the same connection-setup shape to a writable store).
//!
//! A single connection is shared behind a `Mutex` rather than pooled: SQLite permits
//! only one writer at a time regardless, and every write here is already a short,
//! single-transaction operation (§4.1 "Failure semantics").

mod files;
mod messages;
mod schema;
mod summaries;

pub use files::FileRef;
pub use messages::Message;
pub use summaries::{Summary, SummaryMode};

use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Mutex;

use crate::error::{LcmError, Result};

pub struct Store {
    conn: Mutex<Connection>,
}

/// `token_estimate = max(1, floor(len(content)/4))`, per the data-model invariant.
pub fn token_estimate(content: &str) -> i64 {
    std::cmp::max(1, (content.len() / 4) as i64)
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LcmError::StoreError(format!("creating db directory: {e}")))?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )?;
        schema::run_migrations(&conn)?;

        Ok(Store { conn: Mutex::new(conn) })
    }

    /// An in-memory store, used by unit and integration tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::run_migrations(&conn)?;
        Ok(Store { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_rule() {
        assert_eq!(token_estimate(""), 1);
        assert_eq!(token_estimate("abc"), 1);
        assert_eq!(token_estimate("abcdefgh"), 2);
        assert_eq!(token_estimate(&"x".repeat(4001)), 1000);
    }

    #[test]
    fn opens_and_migrates_in_memory() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.lock();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 3);
    }
}
