//! Store schema and migrations
//!
//! SQLite with embedded migrations managed via PRAGMA user_version. The
//! full-text index is an external-content-free FTS5 table kept in step with
//! `messages` inside the same transactions.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: initial schema
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id                 TEXT PRIMARY KEY,
        project            TEXT NOT NULL,
        machine            TEXT NOT NULL,
        agent              TEXT NOT NULL,
        parent_id          TEXT,
        relationship       TEXT NOT NULL DEFAULT 'none',
        first_message      TEXT NOT NULL DEFAULT '',
        started_at         TEXT,
        ended_at           TEXT,
        message_count      INTEGER NOT NULL DEFAULT 0,
        user_message_count INTEGER NOT NULL DEFAULT 0,
        source_file        TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project);
    CREATE INDEX IF NOT EXISTS idx_sessions_agent ON sessions(agent);
    CREATE INDEX IF NOT EXISTS idx_sessions_parent ON sessions(parent_id);
    CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at DESC);

    CREATE TABLE IF NOT EXISTS messages (
        session_id     TEXT NOT NULL,
        ordinal        INTEGER NOT NULL,
        role           TEXT NOT NULL,
        content        TEXT NOT NULL,
        ts             TEXT,
        has_thinking   INTEGER NOT NULL DEFAULT 0,
        has_tool_use   INTEGER NOT NULL DEFAULT 0,
        content_length INTEGER NOT NULL DEFAULT 0,

        PRIMARY KEY (session_id, ordinal)
    );

    CREATE INDEX IF NOT EXISTS idx_messages_ts ON messages(ts);

    CREATE TABLE IF NOT EXISTS tool_calls (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id          TEXT NOT NULL,
        ordinal             INTEGER NOT NULL,
        tool_use_id         TEXT,
        tool_name           TEXT NOT NULL,
        category            TEXT NOT NULL,
        input_json          TEXT NOT NULL,
        skill_name          TEXT,
        subagent_session_id TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_tool_calls_session ON tool_calls(session_id, ordinal);
    CREATE INDEX IF NOT EXISTS idx_tool_calls_category ON tool_calls(category);

    CREATE TABLE IF NOT EXISTS tool_results (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id     TEXT NOT NULL,
        ordinal        INTEGER NOT NULL,
        tool_use_id    TEXT NOT NULL,
        content_length INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_tool_results_session ON tool_results(session_id, ordinal);

    -- Fingerprints of indexed source files; the sync engine's idempotence
    -- gate. Paths for database-backed agents are synthetic (<db>#<id>).
    CREATE TABLE IF NOT EXISTS source_files (
        path         TEXT PRIMARY KEY,
        agent        TEXT NOT NULL,
        size_bytes   INTEGER NOT NULL DEFAULT 0,
        mtime_ns     INTEGER NOT NULL DEFAULT 0,
        content_hash TEXT
    );

    CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
        content,
        session_id UNINDEXED,
        ordinal UNINDEXED
    );
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running store migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables = [
            "sessions",
            "messages",
            "tool_calls",
            "tool_results",
            "source_files",
            "messages_fts",
        ];
        for table in tables {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE name = ?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert!(exists >= 1, "table {} should exist", table);
        }
    }

    #[test]
    fn test_fts_is_queryable() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO messages_fts (content, session_id, ordinal) VALUES (?, ?, ?)",
            rusqlite::params!["the quick brown fox", "s1", 0],
        )
        .unwrap();
        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM messages_fts WHERE messages_fts MATCH 'quick'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);
    }
}
