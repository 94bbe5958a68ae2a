//! Routine job error types.

use thiserror::Error;

/// Routine job error types.
#[derive(Debug, Error)]
pub enum JobError {
    /// Cron expression could not be parsed.
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    /// Job not found in the repository.
    #[error("Routine job not found: {0}")]
    NotFound(String),

    /// Workflow engine answered with a non-success status.
    #[error("Workflow engine returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Transport failure talking to the workflow engine.
    #[error("Network error: {0}")]
    Network(String),

    /// The event stream broke mid-way.
    #[error("Stream error: {0}")]
    Stream(String),

    /// The workflow reported an error.
    #[error("Workflow failed (execution {}): {message}", .execution_id.as_deref().unwrap_or("unknown"))]
    WorkflowFailed {
        execution_id: Option<String>,
        message: String,
    },

    /// The stream closed before a terminal workflow event.
    #[error("Workflow stream ended without a result (execution {})", .execution_id.as_deref().unwrap_or("unknown"))]
    IncompleteStream { execution_id: Option<String> },

    /// Persistence failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl JobError {
    /// Execution id attached to the error, if the engine assigned one.
    pub fn execution_id(&self) -> Option<&str> {
        match self {
            JobError::WorkflowFailed { execution_id, .. }
            | JobError::IncompleteStream { execution_id } => execution_id.as_deref(),
            _ => None,
        }
    }
}

impl From<tokio_rusqlite::Error> for JobError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        JobError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for JobError {
    fn from(e: reqwest::Error) -> Self {
        JobError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_failed_display() {
        let err = JobError::WorkflowFailed {
            execution_id: Some("exec-42".to_string()),
            message: "node crashed".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("exec-42"));
        assert!(display.contains("node crashed"));
        assert_eq!(err.execution_id(), Some("exec-42"));
    }

    #[test]
    fn test_incomplete_stream_unknown_execution() {
        let err = JobError::IncompleteStream { execution_id: None };
        assert!(err.to_string().contains("unknown"));
        assert!(err.execution_id().is_none());
    }

    #[test]
    fn test_invalid_cron_display() {
        let err = JobError::InvalidCron {
            expression: "* * *".to_string(),
            reason: "expected 5 fields".to_string(),
        };
        assert!(err.to_string().contains("* * *"));
        assert!(err.to_string().contains("expected 5 fields"));
    }
}
