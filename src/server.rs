//! Process wiring: tracing, collaborators, and the foreground server.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use agentd_api::{
    ApiServer, ApiState, BashPolicy, BrowserProxy, HealthChecker, LivenessCheck, RebootCheck,
    SchedulerCheck,
};
use agentd_config::{Config, ConfigLoader, LogFormat, LoggingConfig, RebootConfig, RunnerConfig};
use agentd_jobs::{HttpWorkflowEngine, RoutineJobRepository, SqliteRoutineJobRepository, WorkflowJobExecutor};
use agentd_runner::{AgentRunner, RunnerSettings};
use agentd_update::{RebootManager, RebootSettings, ReleaseFeed, ShellCommandRunner};

fn expand(path: &std::path::Path) -> PathBuf {
    PathBuf::from(ConfigLoader::expand_path(&path.to_string_lossy()))
}

/// Initialize tracing with console and file output.
///
/// Log files rotate daily under the configured directory; 30 are kept.
pub(crate) fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let log_dir = expand(&logging.dir);
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("agentd")
        .filename_suffix("log")
        .max_log_files(30)
        .build(&log_dir)
        .context("Failed to create log file appender")?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The writer stops flushing once the guard drops
    static GUARD: OnceLock<WorkerGuard> = OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json = logging.format == LogFormat::Json;
    let file_json = json.then(|| fmt::layer().json().with_writer(non_blocking.clone()));
    let file_text = (!json).then(|| fmt::layer().with_writer(non_blocking).with_ansi(false));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(file_json)
        .with(file_text)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

pub(crate) fn runner_settings(config: &RunnerConfig) -> RunnerSettings {
    let mut settings = RunnerSettings::default()
        .with_tick_interval(Duration::from_millis(config.tick_interval_ms))
        .with_update_check_interval(Duration::from_secs(config.update_check_interval_secs));
    if let Some(max) = config.max_loops {
        settings = settings.with_max_loops(max);
    }
    settings
}

pub(crate) fn reboot_settings(config: &Config) -> RebootSettings {
    let reboot: &RebootConfig = &config.reboot;
    RebootSettings {
        install_dir: expand(&reboot.install_dir),
        release_prefix: reboot.release_prefix.clone(),
        cache_dirs: reboot.cache_dirs.clone(),
        env_file: reboot.env_file.clone(),
        tarball_url: config.release.tarball_url.clone(),
        install_command: reboot.install_command.clone(),
        launch_command: reboot.launch_command.clone(),
        launch_log: reboot.launch_log.clone(),
    }
}

pub(crate) async fn open_repository(config: &Config) -> anyhow::Result<SqliteRoutineJobRepository> {
    let path = expand(&config.database.path);
    SqliteRoutineJobRepository::open(&path)
        .await
        .with_context(|| format!("Failed to open job database {}", path.display()))
}

pub(crate) fn build_reboot_manager(config: &Config) -> anyhow::Result<RebootManager> {
    let feed = ReleaseFeed::new(
        config.release.feed_url.clone(),
        Duration::from_secs(config.release.timeout_secs),
    )
    .context("Failed to build release feed client")?;

    Ok(RebootManager::new(
        reboot_settings(config),
        Arc::new(feed),
        Arc::new(ShellCommandRunner::new()),
    ))
}

fn build_engine(config: &Config) -> anyhow::Result<HttpWorkflowEngine> {
    let mut engine = HttpWorkflowEngine::new(
        config.workflow.base_url.clone(),
        Duration::from_secs(config.workflow.connect_timeout_secs),
    )
    .context("Failed to build workflow engine client")?;
    if let Some(key) = &config.workflow.api_key {
        engine = engine.with_api_key(key.clone());
    }
    Ok(engine)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl+C");
    }
}

/// Run the scheduler and the agent server until a signal arrives or the
/// runner reaches its loop bound.
pub(crate) async fn run_server(config: Config) -> anyhow::Result<()> {
    info!("Starting agentd v{}", agentd_update::CURRENT_VERSION);

    let repository: Arc<dyn RoutineJobRepository> = Arc::new(open_repository(&config).await?);
    let engine = Arc::new(build_engine(&config)?);
    let executor = Arc::new(WorkflowJobExecutor::new(engine, repository.clone()));
    let reboot_manager = Arc::new(build_reboot_manager(&config)?);

    let mut runner = AgentRunner::new(runner_settings(&config.runner), repository, executor);
    if config.runner.auto_update {
        runner = runner.with_update_checker(reboot_manager.clone());
    } else {
        info!("Automatic updates disabled");
    }
    let runner = Arc::new(runner);

    let loaded = runner
        .reload_routine_jobs()
        .await
        .context("Failed to load routine jobs")?;
    info!("{} routine jobs scheduled", loaded);

    let health = Arc::new(HealthChecker::new());
    health.register(Arc::new(LivenessCheck)).await;
    health.register(Arc::new(SchedulerCheck::new(runner.clone()))).await;
    health.register(Arc::new(RebootCheck::new(reboot_manager.clone()))).await;

    let token = config.auth.resolve_token();
    if token.is_none() {
        warn!(
            "{} is not set; every /api request will be rejected",
            config.auth.token_env
        );
    }

    let state = ApiState::new(token)
        .with_runner(runner.clone())
        .with_reboot_manager(reboot_manager)
        .with_health(health)
        .with_bash_policy(BashPolicy::from_config(&config.bash))
        .with_browser(Arc::new(BrowserProxy::new(config.browser.clone())));

    let server = ApiServer::new(config.server.clone(), Arc::new(state));
    let listener = server.bind().await?;

    runner.run()?;

    let watched = runner.clone();
    let shutdown = async move {
        tokio::select! {
            _ = shutdown_signal() => {}
            _ = watched.cancelled() => info!("Runner reached its loop bound"),
        }
    };

    info!("agentd ready on http://{}", server.addr());
    server.serve(listener, shutdown).await?;

    info!("Shutting down...");
    runner.stop().await;
    Ok(())
}
