//! Runner settings.

use std::time::Duration;

/// Scheduler timing.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Sleep between ticks.
    pub tick_interval: Duration,

    /// Stop after this many ticks. Used to bound test runs.
    pub max_loops: Option<u64>,

    /// Minimum wall time between two update checks.
    pub update_check_interval: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(10),
            max_loops: None,
            update_check_interval: Duration::from_secs(60),
        }
    }
}

impl RunnerSettings {
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_max_loops(mut self, max_loops: u64) -> Self {
        self.max_loops = Some(max_loops);
        self
    }

    pub fn with_update_check_interval(mut self, interval: Duration) -> Self {
        self.update_check_interval = interval;
        self
    }
}
