//! # agentd Runner
//!
//! The Agent Runner: a cooperative, timer-driven scheduler that fires at
//! most one due routine job per tick and periodically checks for a newer
//! agent release.

pub mod config;
pub mod error;
pub mod runner;

pub use config::RunnerSettings;
pub use error::RunnerError;
pub use runner::AgentRunner;
