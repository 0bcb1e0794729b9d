//! Job orchestration: one source through download, composite, remux, and
//! delivery, with a per-job scratch directory and a global job cap.
//!
//! `run_job` never returns an error. Every outcome, including failure and
//! cancellation, is a terminal `JobState` in the returned `JobOutcome`.

mod run;
mod runner;
mod state;

pub use run::run_job;
pub use runner::JobRunner;
pub use state::{InvalidTransition, JobState};

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ReelConfig;
use crate::delivery::{Ack, Delivery};
use crate::overlay::CompositeError;
use crate::progress::{LogReporter, ProgressReporter};
use crate::remux::RemuxError;
use crate::tools::ToolPaths;
use crate::transfer::TransferError;

/// Per-job rendering choices, built by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    pub title: String,
    pub watermark: Option<PathBuf>,
    pub timeline_enabled: bool,
    pub max_height: Option<u32>,
}

impl JobSettings {
    /// Settings with the configured overlay defaults.
    pub fn new(title: impl Into<String>, cfg: &ReelConfig) -> Self {
        Self {
            title: title.into(),
            watermark: cfg.overlay.watermark.clone(),
            timeline_enabled: cfg.overlay.timeline,
            max_height: cfg.overlay.max_height,
        }
    }
}

/// Everything one job needs from its caller.
#[derive(Clone)]
pub struct JobSpec {
    pub id: u64,
    pub locator: String,
    pub size_hint: Option<u64>,
    pub settings: JobSettings,
    pub delivery: Arc<dyn Delivery>,
    pub reporter: Arc<dyn ProgressReporter>,
}

impl JobSpec {
    pub fn new(
        id: u64,
        locator: impl Into<String>,
        settings: JobSettings,
        delivery: Arc<dyn Delivery>,
    ) -> Self {
        Self {
            id,
            locator: locator.into(),
            size_hint: None,
            settings,
            delivery,
            reporter: Arc::new(LogReporter),
        }
    }

    pub fn with_size_hint(mut self, size: Option<u64>) -> Self {
        self.size_hint = size;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }
}

/// Shared, read-only environment for all jobs.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub config: Arc<ReelConfig>,
    pub tools: ToolPaths,
}

impl JobContext {
    pub fn new(config: ReelConfig) -> Self {
        let tools = ToolPaths::from_config(&config.tools);
        Self {
            config: Arc::new(config),
            tools,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub id: u64,
    /// Always terminal.
    pub state: JobState,
    /// Present only for `Completed`.
    pub ack: Option<Ack>,
    /// States entered, in order, starting with `Pending`.
    pub history: Vec<JobState>,
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("download: {0}")]
    Download(#[from] TransferError),
    #[error("composite: {0}")]
    Composite(#[from] CompositeError),
    #[error("remux: {0}")]
    Remux(#[from] RemuxError),
    #[error("delivery: {0:#}")]
    Delivery(anyhow::Error),
    #[error("scratch directory: {0:#}")]
    Scratch(anyhow::Error),
    #[error("{stage} produced no artifact at {}", path.display())]
    MissingArtifact { stage: &'static str, path: PathBuf },
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("stage task failed: {0}")]
    Task(String),
    #[error("job cancelled")]
    Cancelled,
}

impl JobError {
    /// True when the error is the job's own cancellation surfacing from a stage.
    pub fn is_cancelled(&self) -> bool {
        match self {
            JobError::Cancelled => true,
            JobError::Download(TransferError::Cancelled) => true,
            JobError::Composite(CompositeError::Cancelled) => true,
            JobError::Delivery(e) => e.chain().any(|c| {
                c.is::<crate::control::Cancelled>()
                    || matches!(c.downcast_ref::<TransferError>(), Some(TransferError::Cancelled))
            }),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_recognized_through_stage_errors() {
        assert!(JobError::Cancelled.is_cancelled());
        assert!(JobError::Download(TransferError::Cancelled).is_cancelled());
        assert!(JobError::Composite(CompositeError::Cancelled).is_cancelled());
        let wrapped = anyhow::Error::new(TransferError::Cancelled).context("upload to x");
        assert!(JobError::Delivery(wrapped).is_cancelled());
        assert!(JobError::Delivery(anyhow::Error::new(crate::control::Cancelled)).is_cancelled());
        assert!(!JobError::Task("panic".into()).is_cancelled());
        assert!(!JobError::Download(TransferError::TooLarge { size: 2, limit: 1 }).is_cancelled());
    }

    #[test]
    fn settings_take_overlay_defaults() {
        let mut cfg = ReelConfig::default();
        cfg.overlay.max_height = Some(480);
        cfg.overlay.timeline = false;
        let s = JobSettings::new("Title", &cfg);
        assert_eq!(s.title, "Title");
        assert_eq!(s.max_height, Some(480));
        assert!(!s.timeline_enabled);
        assert!(s.watermark.is_none());
    }
}
