//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub release: ReleaseConfig,

    #[serde(default)]
    pub reboot: RebootConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub bash: BashConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Agent Server bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Bearer token configuration for the `/api` routes.
///
/// The token itself never lives in the file: only the name of the
/// environment variable that carries it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
        }
    }
}

impl AuthConfig {
    /// Resolve the configured secret from the environment.
    ///
    /// An unset or empty variable yields `None`.
    pub fn resolve_token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|token| !token.trim().is_empty())
    }
}

fn default_token_env() -> String {
    "AGENT_API_TOKEN".to_string()
}

/// Scheduler loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Sleep between ticks, in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Stop after this many ticks (test harnesses only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_loops: Option<u64>,

    #[serde(default = "default_update_check_interval_secs")]
    pub update_check_interval_secs: u64,

    #[serde(default = "default_true")]
    pub auto_update: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_loops: None,
            update_check_interval_secs: default_update_check_interval_secs(),
            auto_update: true,
        }
    }
}

fn default_tick_interval_ms() -> u64 {
    10
}

fn default_update_check_interval_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

/// External workflow engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_workflow_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Connect timeout; streams themselves are not time-limited.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            base_url: default_workflow_base_url(),
            api_key: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_workflow_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// Release feed used by the update oracle and the reboot download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// URL of a JSON document carrying a `tag_name` field.
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    /// Tarball location; `{version}` is replaced by the target version.
    #[serde(default = "default_tarball_url")]
    pub tarball_url: String,

    #[serde(default = "default_feed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            feed_url: default_feed_url(),
            tarball_url: default_tarball_url(),
            timeout_secs: default_feed_timeout_secs(),
        }
    }
}

fn default_feed_url() -> String {
    "https://api.github.com/repos/agentd/agentd/releases/latest".to_string()
}

fn default_tarball_url() -> String {
    "https://github.com/agentd/agentd/releases/download/v{version}/agentd-{version}.tar.gz"
        .to_string()
}

fn default_feed_timeout_secs() -> u64 {
    15
}

/// Reboot sequence layout and commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebootConfig {
    /// Directory holding unpacked releases.
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,

    /// Unpacked release directories are named `<prefix><version>`.
    #[serde(default = "default_release_prefix")]
    pub release_prefix: String,

    /// Cached environments removed before reinstalling, relative to `install_dir`.
    #[serde(default = "default_cache_dirs")]
    pub cache_dirs: Vec<String>,

    /// Environment file copied forward into the new release.
    #[serde(default = "default_env_file")]
    pub env_file: String,

    #[serde(default = "default_install_command")]
    pub install_command: String,

    #[serde(default = "default_launch_command")]
    pub launch_command: String,

    /// Output of the relaunched process, relative to the new release directory.
    #[serde(default = "default_launch_log")]
    pub launch_log: String,
}

impl Default for RebootConfig {
    fn default() -> Self {
        Self {
            install_dir: default_install_dir(),
            release_prefix: default_release_prefix(),
            cache_dirs: default_cache_dirs(),
            env_file: default_env_file(),
            install_command: default_install_command(),
            launch_command: default_launch_command(),
            launch_log: default_launch_log(),
        }
    }
}

fn default_install_dir() -> PathBuf {
    agentd_home()
}

fn default_release_prefix() -> String {
    "agentd-".to_string()
}

fn default_cache_dirs() -> Vec<String> {
    vec![".venv".to_string()]
}

fn default_env_file() -> String {
    ".env".to_string()
}

fn default_install_command() -> String {
    "./install.sh".to_string()
}

fn default_launch_command() -> String {
    "./bin/agentd run".to_string()
}

fn default_launch_log() -> String {
    "agentd.out".to_string()
}

/// Routine job persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> PathBuf {
    agentd_home().join("agentd.db")
}

/// Restricted remote shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BashConfig {
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    #[serde(default = "default_bash_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
}

impl Default for BashConfig {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
            timeout_ms: default_bash_timeout_ms(),
            work_dir: None,
        }
    }
}

fn default_allowed_commands() -> Vec<String> {
    vec!["ls".to_string(), "grep".to_string()]
}

fn default_bash_timeout_ms() -> u64 {
    30_000
}

/// Headless browser proxied by the Agent Server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_debug_port")]
    pub debug_port: u16,

    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_dir: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            debug_port: default_debug_port(),
            headless: true,
            chrome_path: None,
            profile_dir: None,
        }
    }
}

fn default_debug_port() -> u16 {
    9222
}

/// Log output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    /// Filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log line format for the file layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_log_dir() -> PathBuf {
    agentd_home().join("logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// The `~/.agentd` directory.
pub fn agentd_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agentd")
}
