//! Update and reboot error types.

use thiserror::Error;

use crate::reboot::RebootStep;

/// Update and reboot error types.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The release feed could not tell which version is latest.
    #[error("Latest version is unavailable")]
    VersionUnavailable,

    /// A reboot step failed; the sequence stopped there.
    #[error("Reboot step '{step}' failed: {reason}")]
    StepFailed { step: RebootStep, reason: String },

    /// Another reboot is already running.
    #[error("A reboot is already in progress")]
    InProgress,

    /// HTTP client setup failure.
    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for UpdateError {
    fn from(e: reqwest::Error) -> Self {
        UpdateError::Network(e.to_string())
    }
}
