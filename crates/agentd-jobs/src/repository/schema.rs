//! Database schema management.

use rusqlite::Connection;
use tokio_rusqlite::Error;

/// Initialize the database schema.
pub fn init_schema(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS routine_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    cron_expression TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS routine_job_executions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    routine_job_id INTEGER NOT NULL,
    execution_id TEXT NOT NULL,
    outputs TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    FOREIGN KEY (routine_job_id) REFERENCES routine_jobs(id) ON DELETE RESTRICT
);

CREATE INDEX IF NOT EXISTS idx_executions_job ON routine_job_executions(routine_job_id);
"#;
