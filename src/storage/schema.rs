//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Coleta database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per pipeline execution (lote)
CREATE TABLE IF NOT EXISTS batches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- URLs that exhausted their attempts, resumed by the next run of the task
CREATE TABLE IF NOT EXISTS pending_failures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id TEXT NOT NULL,
    url TEXT NOT NULL,
    batch_id INTEGER NOT NULL REFERENCES batches(id),
    last_batch_id INTEGER NOT NULL REFERENCES batches(id),
    error_kind TEXT NOT NULL,
    attempts INTEGER NOT NULL,
    failure_count INTEGER NOT NULL DEFAULT 1,
    recorded_at TEXT NOT NULL,
    last_failed_at TEXT NOT NULL,
    UNIQUE(task_id, url)
);

CREATE INDEX IF NOT EXISTS idx_pending_failures_task ON pending_failures(task_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
