//! Allow-listed remote command execution.
//!
//! Commands never go through a shell. The line is split on whitespace,
//! the first word must be an allow-listed program, and any shell
//! metacharacter rejects the request outright.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, warn};

use agentd_config::BashConfig;

use crate::error::ApiError;

/// Characters that would mean something to a shell.
pub const METACHARACTERS: &[char] = &[
    ';', '&', '|', '$', '`', '<', '>', '(', ')', '{', '}', '[', ']', '\\', '\'', '"', '\n', '\r',
];

/// Request body of `POST /api/bash`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BashRequest {
    pub command: String,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Response body of `POST /api/bash`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BashResponse {
    pub status: &'static str,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timestamp: String,
}

/// What the endpoint may run.
#[derive(Debug, Clone)]
pub struct BashPolicy {
    allowed_commands: Vec<String>,
    timeout: Duration,
    work_dir: Option<PathBuf>,
}

impl Default for BashPolicy {
    fn default() -> Self {
        Self::from_config(&BashConfig::default())
    }
}

impl BashPolicy {
    pub fn from_config(config: &BashConfig) -> Self {
        Self {
            allowed_commands: config.allowed_commands.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            work_dir: config.work_dir.clone(),
        }
    }

    pub fn allowed_commands(&self) -> &[String] {
        &self.allowed_commands
    }

    /// Split a command line into program and arguments, enforcing policy.
    pub fn parse(&self, command: &str) -> Result<Vec<String>, ApiError> {
        if command.trim().is_empty() {
            return Err(ApiError::BadRequest("Command is required".to_string()));
        }

        if let Some(c) = command.chars().find(|c| METACHARACTERS.contains(c)) {
            return Err(ApiError::BadRequest(format!(
                "Command contains forbidden character {:?}",
                c
            )));
        }

        let argv: Vec<String> = command.split_whitespace().map(String::from).collect();
        let program = &argv[0];
        if !self.allowed_commands.iter().any(|allowed| allowed == program) {
            return Err(ApiError::Forbidden(format!(
                "Command '{}' is not allowed",
                program
            )));
        }

        Ok(argv)
    }

    /// Run an allow-listed command and capture its output.
    pub async fn execute(&self, request: BashRequest) -> Result<BashResponse, ApiError> {
        let argv = self.parse(&request.command)?;

        let timeout = request
            .timeout_ms
            .map(Duration::from_millis)
            .map_or(self.timeout, |t| t.min(self.timeout));

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = request.cwd.map(PathBuf::from).or_else(|| self.work_dir.clone()) {
            cmd.current_dir(cwd);
        }

        info!("Executing allow-listed command: {}", argv.join(" "));

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| {
                warn!("Command timed out: {}", request.command);
                ApiError::Internal(format!("Command timed out after {} ms", timeout.as_millis()))
            })?
            .map_err(|e| ApiError::Internal(format!("Failed to run command: {}", e)))?;

        Ok(BashResponse {
            status: "ok",
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }
}
