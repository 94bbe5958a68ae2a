//! Routine job persistence.
//!
//! A job table holds the `(name, cron_expression, enabled)` triples the
//! runner schedules from; an execution table records every successful
//! workflow result.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JobError;

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryRoutineJobRepository;
pub use sqlite::SqliteRoutineJobRepository;

/// A persisted routine job definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineJobSpec {
    pub id: i64,
    pub name: String,
    pub cron_expression: String,
    pub enabled: bool,
}

/// Audit record of one successful workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineJobExecution {
    pub routine_job_id: i64,
    /// Engine-assigned id; empty when the engine never reported one.
    pub execution_id: String,
    pub outputs: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl RoutineJobExecution {
    pub fn new(
        routine_job_id: i64,
        execution_id: impl Into<String>,
        outputs: serde_json::Value,
    ) -> Self {
        Self {
            routine_job_id,
            execution_id: execution_id.into(),
            outputs,
            created_at: Utc::now(),
        }
    }
}

/// Storage for routine jobs and their executions.
#[async_trait]
pub trait RoutineJobRepository: Send + Sync {
    /// Enabled jobs, ordered by id.
    async fn load_enabled(&self) -> Result<Vec<RoutineJobSpec>, JobError>;

    /// Every job, enabled or not, ordered by id.
    async fn list_all(&self) -> Result<Vec<RoutineJobSpec>, JobError>;

    /// Id of the job with the given name.
    async fn find_id_by_name(&self, name: &str) -> Result<Option<i64>, JobError>;

    /// Create a job or replace the schedule and flag of an existing one.
    ///
    /// The cron expression is validated before anything is written.
    async fn upsert(
        &self,
        name: &str,
        cron_expression: &str,
        enabled: bool,
    ) -> Result<RoutineJobSpec, JobError>;

    /// Change a job's schedule. Fails with [`JobError::NotFound`].
    async fn set_cron_expression(&self, name: &str, cron_expression: &str) -> Result<(), JobError>;

    /// Enable or disable a job. Fails with [`JobError::NotFound`].
    async fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), JobError>;

    /// Append an execution record.
    async fn record_execution(&self, execution: RoutineJobExecution) -> Result<(), JobError>;

    /// Executions for a job, newest first.
    async fn list_executions(&self, routine_job_id: i64) -> Result<Vec<RoutineJobExecution>, JobError>;
}

#[cfg(test)]
#[path = "repository_tests.rs"]
mod tests;
