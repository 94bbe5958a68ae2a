//! Application state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use agentd_runner::AgentRunner;
use agentd_update::RebootManager;

use crate::bash::BashPolicy;
use crate::browser::BrowserProxy;
use crate::health::HealthChecker;

/// State shared across handlers.
///
/// Collaborators are optional so the server can come up before the
/// scheduler does. Routes that need a missing one answer 503.
pub struct ApiState {
    api_token: Option<String>,
    pub runner: Option<Arc<AgentRunner>>,
    pub reboot_manager: Option<Arc<RebootManager>>,
    pub health: Arc<HealthChecker>,
    pub bash: BashPolicy,
    pub browser: Option<Arc<BrowserProxy>>,
    start_time: Instant,
    request_count: AtomicU64,
}

impl ApiState {
    /// `api_token` is the shared secret for `/api/*`. Without one every
    /// authenticated route answers 401.
    pub fn new(api_token: Option<String>) -> Self {
        Self {
            api_token,
            runner: None,
            reboot_manager: None,
            health: Arc::new(HealthChecker::new()),
            bash: BashPolicy::default(),
            browser: None,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
        }
    }

    pub fn with_runner(mut self, runner: Arc<AgentRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_reboot_manager(mut self, manager: Arc<RebootManager>) -> Self {
        self.reboot_manager = Some(manager);
        self
    }

    pub fn with_health(mut self, health: Arc<HealthChecker>) -> Self {
        self.health = health;
        self
    }

    pub fn with_bash_policy(mut self, policy: BashPolicy) -> Self {
        self.bash = policy;
        self
    }

    pub fn with_browser(mut self, browser: Arc<BrowserProxy>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref()
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn increment_requests(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_bare() {
        let state = ApiState::new(None);
        assert!(state.api_token().is_none());
        assert!(state.runner.is_none());
        assert!(state.reboot_manager.is_none());
        assert!(state.browser.is_none());
        assert_eq!(state.bash.allowed_commands(), ["ls", "grep"]);
    }

    #[test]
    fn test_request_count() {
        let state = ApiState::new(Some("t".to_string()));
        assert_eq!(state.api_token(), Some("t"));
        state.increment_requests();
        state.increment_requests();
        assert_eq!(state.request_count(), 2);
    }
}
