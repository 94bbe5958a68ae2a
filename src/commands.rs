//! One-shot CLI commands: job administration, version and reboot.

use anyhow::{Context, bail};

use agentd_config::Config;
use agentd_jobs::RoutineJobRepository;
use agentd_update::RebootOutcome;

use crate::cli::JobsAction;
use crate::server::{build_reboot_manager, open_repository};

pub(crate) async fn handle_jobs_command(action: JobsAction, config: &Config) -> anyhow::Result<()> {
    let repo = open_repository(config).await?;
    run_jobs_action(action, &repo).await
}

pub(crate) async fn run_jobs_action(
    action: JobsAction,
    repo: &dyn RoutineJobRepository,
) -> anyhow::Result<()> {
    match action {
        JobsAction::List => {
            let jobs = repo.list_all().await?;
            if jobs.is_empty() {
                println!("No routine jobs.");
                return Ok(());
            }
            println!("{:<6} {:<32} {:<20} ENABLED", "ID", "NAME", "CRON");
            for job in jobs {
                println!(
                    "{:<6} {:<32} {:<20} {}",
                    job.id,
                    job.name,
                    job.cron_expression,
                    if job.enabled { "yes" } else { "no" }
                );
            }
        }
        JobsAction::Add { name, cron, disabled } => {
            let spec = repo.upsert(&name, &cron, !disabled).await?;
            println!("Saved job {} ({}) as #{}", spec.name, spec.cron_expression, spec.id);
        }
        JobsAction::SetCron { name, cron } => {
            repo.set_cron_expression(&name, &cron).await?;
            println!("Job {} now runs at \"{}\"", name, cron);
        }
        JobsAction::Enable { name } => {
            repo.set_enabled(&name, true).await?;
            println!("Enabled job {}", name);
        }
        JobsAction::Disable { name } => {
            repo.set_enabled(&name, false).await?;
            println!("Disabled job {}", name);
        }
        JobsAction::History { name, limit } => {
            let Some(id) = repo.find_id_by_name(&name).await? else {
                bail!("Routine job not found: {}", name);
            };
            let executions = repo.list_executions(id).await?;
            if executions.is_empty() {
                println!("No recorded executions for {}.", name);
            }
            for execution in executions.into_iter().take(limit) {
                let outputs = serde_json::to_string(&execution.outputs)?;
                println!(
                    "{}  {}  {}",
                    execution.created_at.to_rfc3339(),
                    if execution.execution_id.is_empty() { "-" } else { execution.execution_id.as_str() },
                    outputs
                );
            }
        }
    }
    Ok(())
}

pub(crate) async fn handle_version_command(check: bool, config: &Config) -> anyhow::Result<()> {
    println!("agentd {}", agentd_update::CURRENT_VERSION);
    if !check {
        return Ok(());
    }

    let manager = build_reboot_manager(config)?;
    match manager.latest_version().await {
        Some(latest) if latest == manager.current_version() => println!("Up to date."),
        Some(latest) => println!("Latest release: {}", latest),
        None => println!("Latest release unknown."),
    }
    Ok(())
}

pub(crate) async fn handle_reboot_command(
    version: Option<String>,
    config: &Config,
) -> anyhow::Result<()> {
    let manager = build_reboot_manager(config)?;
    let version = version.map(|v| v.trim_start_matches('v').to_string());

    match manager.reboot_agent(version).await.context("Reboot failed")? {
        RebootOutcome::UpToDate { version } => {
            println!("Already running {}; nothing to do.", version);
        }
        RebootOutcome::Relaunched { version } => {
            println!("Launched {}; exiting.", version);
            manager.exit_for_relaunch();
        }
    }
    Ok(())
}
