//! Runs many jobs under a global cap on concurrent jobs.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::control::JobControl;

use super::run::run_job;
use super::{JobContext, JobOutcome, JobSpec, JobState};

/// Jobs wait for a permit before starting. Each one is registered with
/// `JobControl` from submission, so a queued job can be cancelled before it runs.
pub struct JobRunner {
    ctx: JobContext,
    permits: Arc<Semaphore>,
    control: Arc<JobControl>,
}

impl JobRunner {
    pub fn new(ctx: JobContext) -> Self {
        let max = ctx.config.jobs.max_concurrent_jobs.max(1);
        Self {
            ctx,
            permits: Arc::new(Semaphore::new(max)),
            control: Arc::new(JobControl::new()),
        }
    }

    pub fn control(&self) -> Arc<JobControl> {
        Arc::clone(&self.control)
    }

    /// Cancel one job. Returns false if it is not queued or running.
    pub fn cancel(&self, job_id: u64) -> bool {
        self.control.request_cancel(job_id)
    }

    pub fn cancel_all(&self) {
        self.control.cancel_all();
    }

    /// Run one job to completion, waiting for a permit first.
    pub async fn run(&self, spec: JobSpec) -> JobOutcome {
        let id = spec.id;
        let cancel = self.control.register(id);
        let outcome = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(_permit) => run_job(spec, self.ctx.clone(), cancel).await,
            Err(_) => JobOutcome {
                id,
                state: JobState::Failed("job runner closed".to_string()),
                ack: None,
                history: vec![JobState::Pending, JobState::Failed("job runner closed".to_string())],
            },
        };
        self.control.unregister(id);
        outcome
    }

    /// Run all `specs` concurrently (at most `max_concurrent_jobs` at a time).
    /// Outcomes are returned in job id order.
    pub async fn run_all(self: &Arc<Self>, specs: Vec<JobSpec>) -> Vec<JobOutcome> {
        let mut join_set = JoinSet::new();
        for spec in specs {
            let runner = Arc::clone(self);
            join_set.spawn(async move { runner.run(spec).await });
        }
        let mut outcomes = Vec::with_capacity(join_set.len());
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!(error = %e, "job task panicked"),
            }
        }
        outcomes.sort_by_key(|o| o.id);
        outcomes
    }
}
