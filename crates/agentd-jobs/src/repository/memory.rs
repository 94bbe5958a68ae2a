//! In-memory repository for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RoutineJobExecution, RoutineJobRepository, RoutineJobSpec};
use crate::cron::CronSchedule;
use crate::error::JobError;

#[derive(Default)]
struct State {
    next_id: i64,
    jobs: Vec<RoutineJobSpec>,
    executions: Vec<RoutineJobExecution>,
}

/// In-memory routine job repository (for testing).
#[derive(Default)]
pub struct MemoryRoutineJobRepository {
    state: RwLock<State>,
}

impl MemoryRoutineJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a repository with jobs, assigning ids in order from 1.
    pub async fn with_jobs<'a>(
        jobs: impl IntoIterator<Item = (&'a str, &'a str, bool)>,
    ) -> Result<Self, JobError> {
        let repo = Self::new();
        for (name, cron, enabled) in jobs {
            repo.upsert(name, cron, enabled).await?;
        }
        Ok(repo)
    }

    /// Insert a spec as-is, bypassing cron validation.
    pub async fn insert_raw(&self, name: &str, cron_expression: &str, enabled: bool) -> i64 {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let id = state.next_id;
        state.jobs.push(RoutineJobSpec {
            id,
            name: name.to_string(),
            cron_expression: cron_expression.to_string(),
            enabled,
        });
        id
    }

    /// Number of recorded executions.
    pub async fn execution_count(&self) -> usize {
        self.state.read().await.executions.len()
    }
}

#[async_trait]
impl RoutineJobRepository for MemoryRoutineJobRepository {
    async fn load_enabled(&self) -> Result<Vec<RoutineJobSpec>, JobError> {
        let state = self.state.read().await;
        Ok(state.jobs.iter().filter(|j| j.enabled).cloned().collect())
    }

    async fn list_all(&self) -> Result<Vec<RoutineJobSpec>, JobError> {
        Ok(self.state.read().await.jobs.clone())
    }

    async fn find_id_by_name(&self, name: &str) -> Result<Option<i64>, JobError> {
        let state = self.state.read().await;
        Ok(state.jobs.iter().find(|j| j.name == name).map(|j| j.id))
    }

    async fn upsert(
        &self,
        name: &str,
        cron_expression: &str,
        enabled: bool,
    ) -> Result<RoutineJobSpec, JobError> {
        CronSchedule::parse(cron_expression)?;

        let mut state = self.state.write().await;
        if let Some(job) = state.jobs.iter_mut().find(|j| j.name == name) {
            job.cron_expression = cron_expression.to_string();
            job.enabled = enabled;
            return Ok(job.clone());
        }

        state.next_id += 1;
        let spec = RoutineJobSpec {
            id: state.next_id,
            name: name.to_string(),
            cron_expression: cron_expression.to_string(),
            enabled,
        };
        state.jobs.push(spec.clone());
        Ok(spec)
    }

    async fn set_cron_expression(&self, name: &str, cron_expression: &str) -> Result<(), JobError> {
        CronSchedule::parse(cron_expression)?;

        let mut state = self.state.write().await;
        let job = state
            .jobs
            .iter_mut()
            .find(|j| j.name == name)
            .ok_or_else(|| JobError::NotFound(name.to_string()))?;
        job.cron_expression = cron_expression.to_string();
        Ok(())
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), JobError> {
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .iter_mut()
            .find(|j| j.name == name)
            .ok_or_else(|| JobError::NotFound(name.to_string()))?;
        job.enabled = enabled;
        Ok(())
    }

    async fn record_execution(&self, execution: RoutineJobExecution) -> Result<(), JobError> {
        let mut state = self.state.write().await;
        if !state.jobs.iter().any(|j| j.id == execution.routine_job_id) {
            return Err(JobError::NotFound(execution.routine_job_id.to_string()));
        }
        state.executions.push(execution);
        Ok(())
    }

    async fn list_executions(&self, routine_job_id: i64) -> Result<Vec<RoutineJobExecution>, JobError> {
        let state = self.state.read().await;
        Ok(state
            .executions
            .iter()
            .rev()
            .filter(|e| e.routine_job_id == routine_job_id)
            .cloned()
            .collect())
    }
}
