//! CLI definitions for agentd.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// agentd CLI.
#[derive(Debug, Parser)]
#[command(name = "agentd")]
#[command(about = "Routine job runner and control server")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        env = "AGENTD_CONFIG",
        default_value = "config/agentd.toml",
        global = true
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Run the scheduler and the agent server in foreground (default)
    Run {
        /// Override the configured server host
        #[arg(long)]
        host: Option<String>,

        /// Override the configured server port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Routine job administration
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },

    /// Print the running version
    Version {
        /// Also ask the release feed for the latest version
        #[arg(long)]
        check: bool,
    },

    /// Replace this installation with another release
    Reboot {
        /// Target version (default: latest release)
        #[arg(long)]
        version: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub(crate) enum JobsAction {
    /// List every routine job
    List,

    /// Create a job, or replace the schedule of an existing one
    Add {
        /// Job name; also the workflow invoked
        name: String,

        /// Five-field cron expression, e.g. "0 8 * * *"
        cron: String,

        /// Create the job disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Change a job's schedule
    SetCron { name: String, cron: String },

    /// Enable a job
    Enable { name: String },

    /// Disable a job
    Disable { name: String },

    /// Show recorded executions, newest first
    History {
        name: String,

        /// Maximum number of executions shown
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_defaults_to_run() {
        let cli = Cli::try_parse_from(["agentd"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_run_overrides() {
        let cli = Cli::try_parse_from(["agentd", "run", "--port", "9000"]).unwrap();
        match cli.command {
            Some(Commands::Run { host, port }) => {
                assert!(host.is_none());
                assert_eq!(port, Some(9000));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_jobs_add() {
        let cli =
            Cli::try_parse_from(["agentd", "jobs", "add", "daily-report", "0 8 * * *"]).unwrap();
        match cli.command {
            Some(Commands::Jobs {
                action: JobsAction::Add { name, cron, disabled },
            }) => {
                assert_eq!(name, "daily-report");
                assert_eq!(cron, "0 8 * * *");
                assert!(!disabled);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_jobs_set_cron_kebab_case() {
        let cli =
            Cli::try_parse_from(["agentd", "jobs", "set-cron", "sync", "*/5 * * * *"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Jobs { action: JobsAction::SetCron { .. } })
        ));
    }

    #[test]
    fn test_global_config_flag() {
        let cli =
            Cli::try_parse_from(["agentd", "version", "--config", "/etc/agentd.toml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/agentd.toml"));
    }

    #[test]
    fn test_reboot_version() {
        let cli = Cli::try_parse_from(["agentd", "reboot", "--version", "1.2.0"]).unwrap();
        match cli.command {
            Some(Commands::Reboot { version }) => assert_eq!(version.as_deref(), Some("1.2.0")),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
