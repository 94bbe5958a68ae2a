//! # agentd Jobs
//!
//! Routine jobs: named, cron-scheduled invocations of an external workflow.
//!
//! - **cron**: five-field schedule parsing and matching
//! - **routine**: runtime job with the one-minute debounce
//! - **workflow**: streaming client for the external workflow engine
//! - **executor**: runs one job against the engine and records the result
//! - **repository**: persisted job table and execution audit trail

pub mod clock;
pub mod cron;
pub mod error;
pub mod executor;
pub mod repository;
pub mod routine;
pub mod workflow;

pub use clock::{Clock, FixedClock, SystemClock};
pub use cron::{CronField, CronSchedule};
pub use error::JobError;
pub use executor::{RoutineExecutor, RoutineOutcome, WorkflowJobExecutor};
pub use repository::{
    MemoryRoutineJobRepository, RoutineJobExecution, RoutineJobRepository, RoutineJobSpec,
    SqliteRoutineJobRepository,
};
pub use routine::{RoutineJob, RoutineJobSnapshot};
pub use workflow::{HttpWorkflowEngine, WorkflowEngine, WorkflowEvent, WorkflowEventData, WorkflowEventStream};
