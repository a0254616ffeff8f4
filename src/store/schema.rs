//! Schema DDL and the migration runner.
//!
//! Grounded on `original_source/src/lcm/store/database.py`'s `MIGRATIONS` list and
//! `_run_migrations`: a `schema_version` table records the highest applied id; every
//! migration strictly greater than that is applied in order, each inside its own
//! transaction, bumping the recorded version as it commits.

use rusqlite::Connection;

use crate::error::Result;

/// `(version, ddl)` pairs applied in ascending order. Each entry must be a single
/// forward-only step; nothing here ever mutates a previously-applied migration.
const MIGRATIONS: &[(i64, &str)] = &[
    (
        1,
        "CREATE TABLE messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id      TEXT NOT NULL,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            token_estimate  INTEGER NOT NULL,
            timestamp       TEXT NOT NULL,
            metadata        TEXT
        );
        CREATE INDEX idx_messages_session ON messages(session_id, id);

        CREATE VIRTUAL TABLE messages_fts USING fts5(
            content,
            content='messages',
            content_rowid='id',
            tokenize='porter unicode61'
        );

        CREATE TRIGGER messages_ai AFTER INSERT ON messages BEGIN
            INSERT INTO messages_fts(rowid, content) VALUES (new.id, new.content);
        END;

        CREATE TRIGGER messages_ad AFTER DELETE ON messages BEGIN
            INSERT INTO messages_fts(messages_fts, rowid, content)
            VALUES ('delete', old.id, old.content);
        END;",
    ),
    (
        2,
        "CREATE TABLE summaries (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id      TEXT NOT NULL,
            level           INTEGER NOT NULL,
            content         TEXT NOT NULL,
            token_estimate  INTEGER NOT NULL,
            mode            TEXT NOT NULL,
            timestamp       TEXT NOT NULL,
            msg_start_id    INTEGER,
            msg_end_id      INTEGER
        );
        CREATE INDEX idx_summaries_session ON summaries(session_id, msg_start_id);
        CREATE INDEX idx_summaries_level ON summaries(session_id, level);

        CREATE TABLE summary_links (
            parent_id INTEGER NOT NULL REFERENCES summaries(id),
            child_id  INTEGER NOT NULL REFERENCES summaries(id),
            PRIMARY KEY (parent_id, child_id)
        );
        CREATE INDEX idx_summary_links_child ON summary_links(child_id);",
    ),
    (
        3,
        "CREATE TABLE large_files (
            id                   INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id           TEXT NOT NULL,
            file_path            TEXT NOT NULL,
            file_type            TEXT,
            size_bytes           INTEGER,
            exploration_summary  TEXT NOT NULL,
            token_estimate       INTEGER NOT NULL,
            timestamp            TEXT NOT NULL
        );
        CREATE INDEX idx_large_files_session ON large_files(session_id);",
    ),
];

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")?;

    let current: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    for (version, ddl) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        conn.execute_batch(ddl)?;
        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [*version])?;
    }

    Ok(())
}
