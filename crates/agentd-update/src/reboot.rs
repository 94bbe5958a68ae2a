//! Reboot state machine.
//!
//! ```text
//! Idle -> ResolvingTargetVersion -> UpToDate
//!                                -> Downloading -> Extracting -> Relaunching
//!                                -> Failed (from any step)
//! ```
//!
//! A failed step stops the sequence where it is. Nothing is rolled back;
//! the install directory may be left half-migrated for an operator to fix.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::command::CommandRunner;
use crate::error::UpdateError;
use crate::feed::VersionSource;

/// One step of the reboot sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebootStep {
    RemoveOldReleases,
    RemoveCaches,
    Download,
    Extract,
    CopyEnv,
    InstallDependencies,
    Launch,
}

impl RebootStep {
    pub const ALL: [RebootStep; 7] = [
        RebootStep::RemoveOldReleases,
        RebootStep::RemoveCaches,
        RebootStep::Download,
        RebootStep::Extract,
        RebootStep::CopyEnv,
        RebootStep::InstallDependencies,
        RebootStep::Launch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RebootStep::RemoveOldReleases => "remove_old_releases",
            RebootStep::RemoveCaches => "remove_caches",
            RebootStep::Download => "download",
            RebootStep::Extract => "extract",
            RebootStep::CopyEnv => "copy_env",
            RebootStep::InstallDependencies => "install_dependencies",
            RebootStep::Launch => "launch",
        }
    }

    /// State the manager is in while this step runs.
    fn state(&self) -> RebootState {
        match self {
            RebootStep::RemoveOldReleases | RebootStep::RemoveCaches | RebootStep::Download => {
                RebootState::Downloading
            }
            RebootStep::Extract | RebootStep::CopyEnv | RebootStep::InstallDependencies => {
                RebootState::Extracting
            }
            RebootStep::Launch => RebootState::Relaunching,
        }
    }
}

impl fmt::Display for RebootStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable reboot state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebootState {
    #[default]
    Idle,
    ResolvingTargetVersion,
    UpToDate,
    Downloading,
    Extracting,
    Relaunching,
    Failed,
}

/// Successful reboot result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RebootOutcome {
    /// Target equals the running version; nothing was touched.
    UpToDate { version: String },
    /// The target release was launched; this process should exit.
    Relaunched { version: String },
}

/// Result of a periodic update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The feed could not tell; nothing was done.
    Unknown,
    UpToDate,
    Relaunched { version: String },
}

/// Called with an exit code once a new release has taken over.
pub type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

/// Filesystem layout and commands for the reboot sequence.
#[derive(Debug, Clone)]
pub struct RebootSettings {
    pub install_dir: PathBuf,
    pub release_prefix: String,
    pub cache_dirs: Vec<String>,
    pub env_file: String,
    /// `{version}` is replaced by the target version.
    pub tarball_url: String,
    pub install_command: String,
    pub launch_command: String,
    pub launch_log: String,
}

impl RebootSettings {
    fn release_name(&self, version: &str) -> String {
        format!("{}{}", self.release_prefix, version)
    }

    fn tarball_name(&self, version: &str) -> String {
        format!("{}.tar.gz", self.release_name(version))
    }

    /// Directory the target release unpacks into.
    pub fn release_dir(&self, version: &str) -> PathBuf {
        self.install_dir.join(self.release_name(version))
    }

    /// Command line and working directory for a step.
    fn command(&self, step: RebootStep, version: &str) -> Option<(String, PathBuf)> {
        let release_dir = self.release_dir(version);
        let install_dir = self.install_dir.clone();

        let command = match step {
            RebootStep::RemoveOldReleases => {
                format!("rm -rf {}*", shell_quote(&self.release_prefix))
            }
            RebootStep::RemoveCaches => {
                if self.cache_dirs.is_empty() {
                    return None;
                }
                let dirs: Vec<String> = self.cache_dirs.iter().map(|d| shell_quote(d)).collect();
                format!("rm -rf {}", dirs.join(" "))
            }
            RebootStep::Download => format!(
                "curl -fsSL -o {} {}",
                shell_quote(&self.tarball_name(version)),
                shell_quote(&self.tarball_url.replace("{version}", version))
            ),
            RebootStep::Extract => format!("tar -xzf {}", shell_quote(&self.tarball_name(version))),
            RebootStep::CopyEnv => {
                let source = install_dir.join(&self.env_file).display().to_string();
                let source = shell_quote(&source);
                return Some((
                    format!(
                        "if [ -f {source} ]; then cp {source} {}; fi",
                        shell_quote(&self.env_file)
                    ),
                    release_dir,
                ));
            }
            RebootStep::InstallDependencies => {
                return Some((self.install_command.clone(), release_dir));
            }
            RebootStep::Launch => return Some((self.launch_command.clone(), release_dir)),
        };

        Some((command, install_dir))
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Periodic "update if a newer release exists" entry point.
#[async_trait]
pub trait UpdateChecker: Send + Sync {
    async fn check_and_reboot(&self) -> Result<CheckOutcome, UpdateError>;
}

/// Replaces the running agent with another release.
pub struct RebootManager {
    settings: RebootSettings,
    versions: Arc<dyn VersionSource>,
    runner: Arc<dyn CommandRunner>,
    current_version: String,
    exit_hook: ExitHook,
    state: Mutex<RebootState>,
    in_progress: AtomicBool,
}

impl RebootManager {
    pub fn new(
        settings: RebootSettings,
        versions: Arc<dyn VersionSource>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            settings,
            versions,
            runner,
            current_version: crate::CURRENT_VERSION.to_string(),
            exit_hook: Arc::new(|code| std::process::exit(code)),
            state: Mutex::new(RebootState::Idle),
            in_progress: AtomicBool::new(false),
        }
    }

    /// Override the running version.
    pub fn with_current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = version.into();
        self
    }

    /// Replace the process exit performed after a relaunch.
    pub fn with_exit_hook(mut self, hook: ExitHook) -> Self {
        self.exit_hook = hook;
        self
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    pub fn state(&self) -> RebootState {
        *self.state.lock()
    }

    pub fn settings(&self) -> &RebootSettings {
        &self.settings
    }

    /// Latest released version, if the feed knows it.
    pub async fn latest_version(&self) -> Option<String> {
        self.versions.latest_version().await
    }

    /// Hand over to the relaunched release by exiting with code 0.
    pub fn exit_for_relaunch(&self) {
        info!("Exiting so the relaunched agent can take over");
        (self.exit_hook)(0);
    }

    fn set_state(&self, state: RebootState) {
        *self.state.lock() = state;
    }

    /// Reboot into `target`, or into the latest release when `None`.
    ///
    /// Returns once the new process has been launched; its readiness is
    /// not awaited.
    pub async fn reboot_agent(&self, target: Option<String>) -> Result<RebootOutcome, UpdateError> {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            warn!("Reboot requested while another is in progress");
            return Err(UpdateError::InProgress);
        }
        let mut guard = InProgressGuard {
            manager: self,
            settled: false,
        };

        let result = self.reboot_sequence(target).await;
        match &result {
            Ok(RebootOutcome::UpToDate { .. }) => self.set_state(RebootState::UpToDate),
            Ok(RebootOutcome::Relaunched { .. }) => {}
            Err(e) => {
                error!("Reboot failed: {}", e);
                self.set_state(RebootState::Failed);
            }
        }

        guard.settled = true;
        result
    }

    async fn reboot_sequence(&self, target: Option<String>) -> Result<RebootOutcome, UpdateError> {
        self.set_state(RebootState::ResolvingTargetVersion);

        let version = match target {
            Some(version) => version,
            None => self
                .versions
                .latest_version()
                .await
                .ok_or(UpdateError::VersionUnavailable)?,
        };

        if version == self.current_version {
            info!("Already running version {}, nothing to do", version);
            return Ok(RebootOutcome::UpToDate { version });
        }

        info!(
            "Rebooting agent from {} to {}",
            self.current_version, version
        );

        for step in RebootStep::ALL {
            let Some((command, cwd)) = self.settings.command(step, &version) else {
                continue;
            };
            self.set_state(step.state());
            info!(step = %step, "Reboot step: {}", command);

            if step == RebootStep::Launch {
                let log = cwd.join(&self.settings.launch_log);
                self.runner
                    .spawn_detached(&command, &cwd, &log)
                    .await
                    .map_err(|e| step_failed(step, e.to_string()))?;
            } else {
                self.run_step(step, &command, &cwd).await?;
            }
        }

        info!("Launched agent {}", version);
        Ok(RebootOutcome::Relaunched { version })
    }

    async fn run_step(&self, step: RebootStep, command: &str, cwd: &Path) -> Result<(), UpdateError> {
        let output = self
            .runner
            .run(command, cwd)
            .await
            .map_err(|e| step_failed(step, e.to_string()))?;

        if !output.is_success() {
            let detail = output.stderr.trim();
            let reason = if detail.is_empty() {
                format!("exit code {}", output.status)
            } else {
                format!("exit code {}: {}", output.status, detail)
            };
            return Err(step_failed(step, reason));
        }
        Ok(())
    }
}

/// Releases the single-flight flag, even when the reboot future is dropped
/// before the sequence finishes.
struct InProgressGuard<'a> {
    manager: &'a RebootManager,
    settled: bool,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Reboot abandoned before it finished");
            self.manager.set_state(RebootState::Failed);
        }
        self.manager.in_progress.store(false, Ordering::SeqCst);
    }
}

fn step_failed(step: RebootStep, reason: String) -> UpdateError {
    error!(step = %step, "Reboot step failed: {}", reason);
    UpdateError::StepFailed { step, reason }
}

#[async_trait]
impl UpdateChecker for RebootManager {
    async fn check_and_reboot(&self) -> Result<CheckOutcome, UpdateError> {
        let Some(latest) = self.versions.latest_version().await else {
            warn!("Latest version unknown, skipping update");
            return Ok(CheckOutcome::Unknown);
        };

        if latest == self.current_version {
            return Ok(CheckOutcome::UpToDate);
        }

        info!("New version available: {} (running {})", latest, self.current_version);
        match self.reboot_agent(Some(latest)).await? {
            RebootOutcome::UpToDate { .. } => Ok(CheckOutcome::UpToDate),
            RebootOutcome::Relaunched { version } => {
                self.exit_for_relaunch();
                Ok(CheckOutcome::Relaunched { version })
            }
        }
    }
}

#[cfg(test)]
#[path = "reboot_tests.rs"]
mod tests;
