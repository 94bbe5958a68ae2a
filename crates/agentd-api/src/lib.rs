//! # agentd API
//!
//! The Agent Server: a small authenticated HTTP surface next to the
//! scheduler.
//!
//! ```text
//! GET    /health                  public health document
//! GET    /livez                   public liveness probe
//! POST   /api/reboot              update to the latest release
//! POST   /api/reload-jobs         reload routine jobs
//! GET    /api/jobs                loaded routine jobs
//! POST   /api/bash                allow-listed command execution
//! POST   /api/browser/session     start or attach to the browser
//! DELETE /api/browser/session     close opened pages and the browser
//! GET    /api/browser/pages       list pages
//! POST   /api/browser/pages       open a page
//! DELETE /api/browser/pages/{id}  close a page
//! ```

pub mod auth;
pub mod bash;
pub mod browser;
pub mod error;
pub mod health;
pub mod routes;
pub mod server;
pub mod state;

pub use bash::{BashPolicy, BashRequest, BashResponse};
pub use browser::{BrowserError, BrowserProxy, BrowserVersion, PageInfo};
pub use error::ApiError;
pub use health::{
    ComponentCheck, HealthCheckResult, HealthCheckable, HealthChecker, HealthStatus,
    LivenessCheck, RebootCheck, SchedulerCheck,
};
pub use routes::create_router;
pub use server::ApiServer;
pub use state::ApiState;
