//! External command execution.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::UpdateError;

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `-1` when terminated by a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// Runs shell command lines on behalf of the reboot manager.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` in `cwd` and wait for it to finish.
    async fn run(&self, command: &str, cwd: &Path) -> Result<CommandOutput, UpdateError>;

    /// Start `command` in `cwd` without waiting, appending its output to `log`.
    ///
    /// The child is detached from this process so it survives our exit.
    async fn spawn_detached(&self, command: &str, cwd: &Path, log: &Path) -> Result<(), UpdateError>;
}

/// `sh -c` command runner.
#[derive(Debug, Default, Clone)]
pub struct ShellCommandRunner;

impl ShellCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(&self, command: &str, cwd: &Path) -> Result<CommandOutput, UpdateError> {
        debug!("Running `{}` in {}", command, cwd.display());

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn spawn_detached(&self, command: &str, cwd: &Path, log: &Path) -> Result<(), UpdateError> {
        debug!("Launching `{}` in {}", command, cwd.display());

        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)?;
        let err_file = log_file.try_clone()?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(err_file));

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn()?;
        debug!("Launched detached process {:?}", child.id());
        Ok(())
    }
}
