//! Health checking for the agent process.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use agentd_runner::AgentRunner;
use agentd_update::{RebootManager, RebootState};

/// Health status of a component or of the whole process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Individual component health check.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ComponentCheck {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Health check result with details.
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub checks: Vec<ComponentCheck>,
}

impl HealthCheckResult {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            timestamp: chrono::Utc::now(),
            checks: Vec::new(),
        }
    }

    /// Add a component check. The overall status is the worst component.
    pub fn with_check(mut self, check: ComponentCheck) -> Self {
        if check.status == HealthStatus::Unhealthy {
            self.status = HealthStatus::Unhealthy;
        } else if check.status == HealthStatus::Degraded
            && self.status != HealthStatus::Unhealthy
        {
            self.status = HealthStatus::Degraded;
        }
        self.checks.push(check);
        self
    }
}

/// Trait for components that can be health-checked.
/// Uses boxed futures for dyn compatibility.
pub trait HealthCheckable: Send + Sync {
    fn name(&self) -> &str;

    fn check_health(&self) -> Pin<Box<dyn Future<Output = ComponentCheck> + Send + '_>>;
}

/// Collects component checks into one result.
#[derive(Default)]
pub struct HealthChecker {
    components: RwLock<Vec<Arc<dyn HealthCheckable>>>,
    check_count: AtomicU64,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, component: Arc<dyn HealthCheckable>) {
        info!("Registered health check component: {}", component.name());
        self.components.write().await.push(component);
    }

    /// Check every registered component.
    pub async fn check(&self) -> HealthCheckResult {
        self.check_count.fetch_add(1, Ordering::Relaxed);

        let components = self.components.read().await;
        let mut result = HealthCheckResult::healthy();
        for component in components.iter() {
            let check = component.check_health().await;
            debug!("Health check for {}: {}", check.name, check.status);
            result = result.with_check(check);
        }

        if result.status != HealthStatus::Healthy {
            warn!("Health check reported {}", result.status);
        }
        result
    }

    pub fn check_count(&self) -> u64 {
        self.check_count.load(Ordering::Relaxed)
    }
}

/// Simple liveness check that always returns healthy.
pub struct LivenessCheck;

impl HealthCheckable for LivenessCheck {
    fn name(&self) -> &str {
        "liveness"
    }

    fn check_health(&self) -> Pin<Box<dyn Future<Output = ComponentCheck> + Send + '_>> {
        Box::pin(async {
            ComponentCheck::new("liveness", HealthStatus::Healthy).with_details("Process is alive")
        })
    }
}

/// Reports whether the tick chain is active.
pub struct SchedulerCheck {
    runner: Arc<AgentRunner>,
}

impl SchedulerCheck {
    pub fn new(runner: Arc<AgentRunner>) -> Self {
        Self { runner }
    }
}

impl HealthCheckable for SchedulerCheck {
    fn name(&self) -> &str {
        "scheduler"
    }

    fn check_health(&self) -> Pin<Box<dyn Future<Output = ComponentCheck> + Send + '_>> {
        Box::pin(async move {
            let jobs = self.runner.jobs_snapshot().len();
            let ticks = self.runner.loop_count();
            let status = if self.runner.is_running() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            };
            ComponentCheck::new("scheduler", status)
                .with_details(format!("{} jobs loaded, {} ticks", jobs, ticks))
        })
    }
}

/// Degraded after a failed reboot until the next attempt.
pub struct RebootCheck {
    manager: Arc<RebootManager>,
}

impl RebootCheck {
    pub fn new(manager: Arc<RebootManager>) -> Self {
        Self { manager }
    }
}

impl HealthCheckable for RebootCheck {
    fn name(&self) -> &str {
        "reboot"
    }

    fn check_health(&self) -> Pin<Box<dyn Future<Output = ComponentCheck> + Send + '_>> {
        Box::pin(async move {
            let state = self.manager.state();
            let status = if state == RebootState::Failed {
                HealthStatus::Degraded
            } else {
                HealthStatus::Healthy
            };
            ComponentCheck::new("reboot", status).with_details(format!(
                "version {}, state {:?}",
                self.manager.current_version(),
                state
            ))
        })
    }
}
