//! Runtime routine job.

use chrono::{DateTime, FixedOffset, TimeDelta};
use serde::Serialize;

use crate::cron::CronSchedule;
use crate::error::JobError;
use crate::repository::RoutineJobSpec;

/// Minimum gap between two due answers for the same job.
pub const DEBOUNCE_MS: i64 = 60_000;

/// In-memory job derived from a persisted spec.
///
/// Lives only as long as the loaded job list; a reload rebuilds it with
/// no run history.
#[derive(Debug, Clone)]
pub struct RoutineJob {
    id: i64,
    name: String,
    schedule: CronSchedule,
    last_run: Option<DateTime<FixedOffset>>,
}

impl RoutineJob {
    /// Build a job, failing if the cron expression is malformed.
    pub fn new(id: i64, name: impl Into<String>, cron_expression: &str) -> Result<Self, JobError> {
        Ok(Self {
            id,
            name: name.into(),
            schedule: CronSchedule::parse(cron_expression)?,
            last_run: None,
        })
    }

    pub fn from_spec(spec: &RoutineJobSpec) -> Result<Self, JobError> {
        Self::new(spec.id, spec.name.clone(), &spec.cron_expression)
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    pub fn last_run(&self) -> Option<DateTime<FixedOffset>> {
        self.last_run
    }

    /// Decide whether the job should fire at `now`.
    ///
    /// A positive answer records `now` as the last run before anything is
    /// executed, so a failed run is not retried within the same match.
    pub fn is_due(&mut self, now: DateTime<FixedOffset>) -> bool {
        if !self.schedule.matches(&now) {
            return false;
        }

        if let Some(last) = self.last_run {
            if now.signed_duration_since(last) <= TimeDelta::milliseconds(DEBOUNCE_MS) {
                return false;
            }
        }

        self.last_run = Some(now);
        true
    }

    /// Serializable view for status endpoints.
    pub fn snapshot(&self) -> RoutineJobSnapshot {
        RoutineJobSnapshot {
            id: self.id,
            name: self.name.clone(),
            cron_expression: self.schedule.expression().to_string(),
            last_run: self.last_run,
        }
    }
}

/// Point-in-time view of a loaded job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineJobSnapshot {
    pub id: i64,
    pub name: String,
    pub cron_expression: String,
    pub last_run: Option<DateTime<FixedOffset>>,
}
