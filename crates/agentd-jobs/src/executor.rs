//! Routine job execution.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::error::JobError;
use crate::repository::{RoutineJobExecution, RoutineJobRepository};
use crate::workflow::WorkflowEngine;

/// Result of one successful routine job run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutineOutcome {
    pub execution_id: Option<String>,
    pub outputs: Option<serde_json::Value>,
}

/// Runs a routine job by name.
#[async_trait]
pub trait RoutineExecutor: Send + Sync {
    async fn execute(&self, job_name: &str) -> Result<RoutineOutcome, JobError>;
}

/// Executes a job as the workflow of the same name and records the outputs.
pub struct WorkflowJobExecutor {
    engine: Arc<dyn WorkflowEngine>,
    repository: Arc<dyn RoutineJobRepository>,
}

impl WorkflowJobExecutor {
    pub fn new(engine: Arc<dyn WorkflowEngine>, repository: Arc<dyn RoutineJobRepository>) -> Self {
        Self { engine, repository }
    }

    /// Store the outputs of a fulfilled run. Failures are logged only.
    async fn persist(&self, job_name: &str, execution_id: Option<&str>, outputs: &serde_json::Value) {
        let result = async {
            let job_id = self
                .repository
                .find_id_by_name(job_name)
                .await?
                .ok_or_else(|| JobError::NotFound(job_name.to_string()))?;
            let execution =
                RoutineJobExecution::new(job_id, execution_id.unwrap_or_default(), outputs.clone());
            self.repository.record_execution(execution).await
        }
        .await;

        if let Err(e) = result {
            warn!(
                job = job_name,
                execution_id = execution_id.unwrap_or("unknown"),
                "Failed to record routine job execution: {}",
                e
            );
        }
    }
}

#[async_trait]
impl RoutineExecutor for WorkflowJobExecutor {
    async fn execute(&self, job_name: &str) -> Result<RoutineOutcome, JobError> {
        let mut stream = self
            .engine
            .execute_stream(job_name, serde_json::json!({}))
            .await?;
        let mut execution_id: Option<String> = None;

        while let Some(event) = stream.next().await {
            let event = event?;

            if execution_id.is_none() {
                if let Some(id) = &event.execution_id {
                    debug!(job = job_name, execution_id = %id, "Workflow execution started");
                    execution_id = Some(id.clone());
                }
            }

            if let Some(message) = event.error_message() {
                return Err(JobError::WorkflowFailed { execution_id, message });
            }

            if event.is_rejected() {
                return Err(JobError::WorkflowFailed {
                    execution_id,
                    message: "workflow rejected".to_string(),
                });
            }

            if event.is_fulfilled() {
                let outputs = event.data.outputs;
                if let Some(outputs) = &outputs {
                    self.persist(job_name, execution_id.as_deref(), outputs).await;
                }
                info!(
                    job = job_name,
                    execution_id = execution_id.as_deref().unwrap_or("unknown"),
                    "Routine job completed"
                );
                return Ok(RoutineOutcome { execution_id, outputs });
            }
        }

        Err(JobError::IncompleteStream { execution_id })
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
