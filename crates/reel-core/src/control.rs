//! Cooperative cancellation: shared cancel tokens and a registry of running jobs.
//!
//! Each job gets a `CancelToken`. Chunk workers, the compositor frame loop,
//! and the orchestrator check it at their checkpoints; nothing is preempted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Granularity of cancellation-aware sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Error returned when work stops because its job was cancelled.
#[derive(Debug)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Shared cancellation flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Blocking sleep that wakes early on cancellation. Returns `false` if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }

    /// Returns `Err(Cancelled)` if the token is set; used at checkpoints with `?`.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Registry of job id -> cancel token for jobs currently running.
#[derive(Default)]
pub struct JobControl {
    jobs: RwLock<HashMap<u64, CancelToken>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running job and return the token to pass into its stages.
    pub fn register(&self, job_id: u64) -> CancelToken {
        let token = CancelToken::new();
        self.write_jobs().insert(job_id, token.clone());
        token
    }

    /// Unregister a job (call when the job reaches a terminal state).
    pub fn unregister(&self, job_id: u64) {
        self.write_jobs().remove(&job_id);
    }

    /// Request cancellation of one job. Returns `false` if the job is not running.
    pub fn request_cancel(&self, job_id: u64) -> bool {
        match self.read_jobs().get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Request cancellation of every running job.
    pub fn cancel_all(&self) {
        for token in self.read_jobs().values() {
            token.cancel();
        }
    }

    pub fn running(&self) -> usize {
        self.read_jobs().len()
    }

    fn read_jobs(&self) -> std::sync::RwLockReadGuard<'_, HashMap<u64, CancelToken>> {
        self.jobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_jobs(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<u64, CancelToken>> {
        self.jobs.write().unwrap_or_else(|e| e.into_inner())
    }
}
