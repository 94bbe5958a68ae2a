//! agentd: routine job runner and control server.
//!
//! Main entry point for the agentd CLI.

mod cli;
mod commands;
mod server;

use anyhow::Context;
use clap::Parser;

use agentd_config::{ConfigLoader, ConfigValidator};

use crate::cli::{Cli, Commands};
use crate::commands::{handle_jobs_command, handle_reboot_command, handle_version_command};
use crate::server::{init_tracing, run_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ConfigLoader::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    init_tracing(&config.logging)?;

    let warnings = ConfigValidator::validate(&config)
        .into_result()
        .context("Invalid configuration")?;
    for warning in warnings {
        tracing::warn!("Config {}: {}", warning.path, warning.message);
    }

    match cli.command {
        None => run_server(config).await,
        Some(Commands::Run { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            run_server(config).await
        }
        Some(Commands::Jobs { action }) => handle_jobs_command(action, &config).await,
        Some(Commands::Version { check }) => handle_version_command(check, &config).await,
        Some(Commands::Reboot { version }) => handle_reboot_command(version, &config).await,
    }
}
