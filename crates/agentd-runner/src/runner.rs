//! The Agent Runner.
//!
//! Each tick:
//! 1. stops if cancellation was requested
//! 2. bumps the loop counter
//! 3. dispatches the first due job, if any, without awaiting it
//! 4. runs the update check when its interval has elapsed
//! 5. requests cancellation once the loop bound is reached
//!
//! The next tick is armed only after the current one returns, so ticks
//! never overlap. Dispatched jobs may finish several ticks later.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use agentd_jobs::{
    Clock, RoutineExecutor, RoutineJob, RoutineJobRepository, RoutineJobSnapshot, SystemClock,
};
use agentd_update::UpdateChecker;

use crate::config::RunnerSettings;
use crate::error::RunnerError;

/// Cooperative routine job scheduler.
pub struct AgentRunner {
    settings: RunnerSettings,
    repository: Arc<dyn RoutineJobRepository>,
    executor: Arc<dyn RoutineExecutor>,
    update_checker: Option<Arc<dyn UpdateChecker>>,
    clock: Arc<dyn Clock>,

    /// Replaced wholesale on reload.
    jobs: Mutex<Vec<RoutineJob>>,
    last_update_check: Mutex<Instant>,
    loop_count: AtomicU64,

    cancel: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AgentRunner {
    pub fn new(
        settings: RunnerSettings,
        repository: Arc<dyn RoutineJobRepository>,
        executor: Arc<dyn RoutineExecutor>,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            settings,
            repository,
            executor,
            update_checker: None,
            clock: Arc::new(SystemClock),
            jobs: Mutex::new(Vec::new()),
            last_update_check: Mutex::new(Instant::now()),
            loop_count: AtomicU64::new(0),
            cancel,
            handle: Mutex::new(None),
        }
    }

    /// Check for a newer release every `update_check_interval`.
    pub fn with_update_checker(mut self, checker: Arc<dyn UpdateChecker>) -> Self {
        self.update_checker = Some(checker);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Start the tick chain and return immediately.
    pub fn run(self: &Arc<Self>) -> Result<(), RunnerError> {
        let mut handle = self.handle.lock();
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(RunnerError::AlreadyRunning);
        }

        self.cancel.send_replace(false);
        let runner = Arc::clone(self);
        *handle = Some(tokio::spawn(async move { runner.tick_loop().await }));

        info!(
            "Agent runner started (tick {:?}, {} jobs)",
            self.settings.tick_interval,
            self.jobs.lock().len()
        );
        Ok(())
    }

    /// Request cancellation and wait for the tick chain to end.
    ///
    /// Jobs already dispatched keep running.
    pub async fn stop(&self) {
        self.cancel.send_replace(true);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Runner task ended abnormally: {}", e);
            }
        }
        info!("Agent runner stopped after {} ticks", self.loop_count());
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Whether the tick chain is active.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn loop_count(&self) -> u64 {
        self.loop_count.load(Ordering::Relaxed)
    }

    /// Reload enabled jobs from the repository and swap them in.
    ///
    /// A job whose cron expression does not parse is skipped with a
    /// warning. Returns the number of jobs loaded.
    pub async fn reload_routine_jobs(&self) -> Result<usize, RunnerError> {
        let specs = self.repository.load_enabled().await?;

        let mut jobs = Vec::with_capacity(specs.len());
        for spec in &specs {
            match RoutineJob::from_spec(spec) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(job = %spec.name, "Skipping routine job: {}", e),
            }
        }

        let count = jobs.len();
        *self.jobs.lock() = jobs;
        info!("Loaded {} routine jobs", count);
        Ok(count)
    }

    /// Name, schedule and last run of every loaded job.
    pub fn jobs_snapshot(&self) -> Vec<RoutineJobSnapshot> {
        self.jobs.lock().iter().map(RoutineJob::snapshot).collect()
    }

    async fn tick_loop(self: Arc<Self>) {
        let mut cancel_rx = self.cancel.subscribe();

        loop {
            if *cancel_rx.borrow_and_update() {
                break;
            }

            self.tick().await;

            if *cancel_rx.borrow_and_update() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.tick_interval) => {}
                _ = cancel_rx.changed() => {}
            }
        }

        debug!("Tick loop exited");
    }

    pub(crate) async fn tick(&self) {
        let count = self.loop_count.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(name) = self.next_due_job() {
            self.dispatch(name);
        }

        self.maybe_check_for_update().await;

        if let Some(max) = self.settings.max_loops {
            if count >= max {
                info!("Reached loop bound {}, stopping", max);
                self.cancel.send_replace(true);
            }
        }
    }

    /// Mark and return the first due job in list order.
    fn next_due_job(&self) -> Option<String> {
        let now = self.clock.now();
        let mut jobs = self.jobs.lock();
        for job in jobs.iter_mut() {
            if job.is_due(now) {
                return Some(job.name().to_string());
            }
        }
        None
    }

    fn dispatch(&self, name: String) {
        info!(job = %name, "Dispatching routine job");
        let executor = Arc::clone(&self.executor);

        tokio::spawn(async move {
            match executor.execute(&name).await {
                Ok(outcome) => debug!(
                    job = %name,
                    execution_id = outcome.execution_id.as_deref().unwrap_or("unknown"),
                    "Routine job finished"
                ),
                Err(e) => error!(
                    job = %name,
                    execution_id = e.execution_id().unwrap_or("unknown"),
                    "Routine job failed: {}",
                    e
                ),
            }
        });
    }

    async fn maybe_check_for_update(&self) {
        let Some(checker) = &self.update_checker else {
            return;
        };

        {
            let mut last = self.last_update_check.lock();
            if last.elapsed() < self.settings.update_check_interval {
                return;
            }
            *last = Instant::now();
        }

        debug!("Checking for a newer release");
        if let Err(e) = checker.check_and_reboot().await {
            error!("Update check failed: {}", e);
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
