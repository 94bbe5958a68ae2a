//! # agentd Update
//!
//! Self-update for the agent process.
//!
//! - **feed**: latest released version from a JSON release feed
//! - **command**: external command execution
//! - **reboot**: download, install and relaunch state machine

pub mod command;
pub mod error;
pub mod feed;
pub mod reboot;

pub use command::{CommandOutput, CommandRunner, ShellCommandRunner};
pub use error::UpdateError;
pub use feed::{ReleaseFeed, VersionSource};
pub use reboot::{
    CheckOutcome, ExitHook, RebootManager, RebootOutcome, RebootSettings, RebootState, RebootStep,
    UpdateChecker,
};

/// Version of the running agent.
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");
