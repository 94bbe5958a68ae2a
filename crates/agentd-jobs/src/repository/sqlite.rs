//! SQLite routine job repository.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use tokio_rusqlite::Connection;

use super::schema::init_schema;
use super::{RoutineJobExecution, RoutineJobRepository, RoutineJobSpec};
use crate::cron::CronSchedule;
use crate::error::JobError;

const SELECT_JOBS: &str = "SELECT id, name, cron_expression, enabled FROM routine_jobs";

fn spec_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoutineJobSpec> {
    Ok(RoutineJobSpec {
        id: row.get(0)?,
        name: row.get(1)?,
        cron_expression: row.get(2)?,
        enabled: row.get::<_, i64>(3)? != 0,
    })
}

/// SQLite-backed routine job repository.
pub struct SqliteRoutineJobRepository {
    conn: Connection,
}

impl SqliteRoutineJobRepository {
    /// Open (creating if needed) a file-backed database.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, JobError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| JobError::Storage(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let conn = Connection::open(path).await?;
        conn.call(|conn| Ok(init_schema(conn)?)).await?;
        Ok(Self { conn })
    }

    /// Create a new in-memory database.
    pub async fn in_memory() -> Result<Self, JobError> {
        let conn = Connection::open_in_memory().await?;
        conn.call(|conn| Ok(init_schema(conn)?)).await?;
        Ok(Self { conn })
    }

    async fn update_by_name(
        &self,
        sql: &'static str,
        name: &str,
        value: rusqlite::types::Value,
    ) -> Result<(), JobError> {
        let name = name.to_string();
        let not_found = name.clone();
        let now = Utc::now().to_rfc3339();

        let changed = self
            .conn
            .call(move |conn| Ok(conn.execute(sql, params![value, now, name])?))
            .await?;

        if changed == 0 {
            return Err(JobError::NotFound(not_found));
        }
        Ok(())
    }
}

#[async_trait]
impl RoutineJobRepository for SqliteRoutineJobRepository {
    async fn load_enabled(&self) -> Result<Vec<RoutineJobSpec>, JobError> {
        let jobs = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!("{SELECT_JOBS} WHERE enabled = 1 ORDER BY id"))?;
                let rows = stmt.query_map([], spec_from_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;
        Ok(jobs)
    }

    async fn list_all(&self) -> Result<Vec<RoutineJobSpec>, JobError> {
        let jobs = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!("{SELECT_JOBS} ORDER BY id"))?;
                let rows = stmt.query_map([], spec_from_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;
        Ok(jobs)
    }

    async fn find_id_by_name(&self, name: &str) -> Result<Option<i64>, JobError> {
        let name = name.to_string();
        let id = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row("SELECT id FROM routine_jobs WHERE name = ?1", [&name], |row| {
                        row.get(0)
                    })
                    .optional()?)
            })
            .await?;
        Ok(id)
    }

    async fn upsert(
        &self,
        name: &str,
        cron_expression: &str,
        enabled: bool,
    ) -> Result<RoutineJobSpec, JobError> {
        CronSchedule::parse(cron_expression)?;

        let name = name.to_string();
        let cron_expression = cron_expression.to_string();
        let now = Utc::now().to_rfc3339();

        let spec = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO routine_jobs (name, cron_expression, enabled, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)
                     ON CONFLICT(name) DO UPDATE SET
                         cron_expression = excluded.cron_expression,
                         enabled = excluded.enabled,
                         updated_at = excluded.updated_at",
                    params![name, cron_expression, enabled as i64, now],
                )?;
                Ok(conn.query_row(
                    &format!("{SELECT_JOBS} WHERE name = ?1"),
                    [&name],
                    spec_from_row,
                )?)
            })
            .await?;
        Ok(spec)
    }

    async fn set_cron_expression(&self, name: &str, cron_expression: &str) -> Result<(), JobError> {
        CronSchedule::parse(cron_expression)?;
        self.update_by_name(
            "UPDATE routine_jobs SET cron_expression = ?1, updated_at = ?2 WHERE name = ?3",
            name,
            rusqlite::types::Value::Text(cron_expression.to_string()),
        )
        .await
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), JobError> {
        self.update_by_name(
            "UPDATE routine_jobs SET enabled = ?1, updated_at = ?2 WHERE name = ?3",
            name,
            rusqlite::types::Value::Integer(enabled as i64),
        )
        .await
    }

    async fn record_execution(&self, execution: RoutineJobExecution) -> Result<(), JobError> {
        let outputs = serde_json::to_string(&execution.outputs)?;
        let created_at = execution.created_at.to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO routine_job_executions (routine_job_id, execution_id, outputs, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![execution.routine_job_id, execution.execution_id, outputs, created_at],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn list_executions(&self, routine_job_id: i64) -> Result<Vec<RoutineJobExecution>, JobError> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT execution_id, outputs, created_at FROM routine_job_executions
                     WHERE routine_job_id = ?1 ORDER BY id DESC",
                )?;
                let rows = stmt
                    .query_map([routine_job_id], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(execution_id, outputs, created_at)| {
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| {
                        JobError::Storage(format!(
                            "Invalid created_at '{}' for execution '{}': {}",
                            created_at, execution_id, e
                        ))
                    })?
                    .with_timezone(&Utc);
                Ok(RoutineJobExecution {
                    routine_job_id,
                    outputs: serde_json::from_str(&outputs)?,
                    execution_id,
                    created_at,
                })
            })
            .collect()
    }
}
