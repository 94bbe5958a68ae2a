//! Runner error types.

use thiserror::Error;

use agentd_jobs::JobError;

/// Runner error types.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// `run` was called while the tick chain is active.
    #[error("Runner is already running")]
    AlreadyRunning,

    /// Loading jobs from the repository failed.
    #[error("Job error: {0}")]
    Jobs(#[from] JobError),
}
