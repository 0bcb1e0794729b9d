//! The per-job pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::control::CancelToken;
use crate::delivery::Ack;
use crate::naming;
use crate::overlay::{composite, OverlayJob};
use crate::remux::remux;
use crate::storage::ScratchDir;
use crate::transfer::{download, TransferJob};

use super::{JobContext, JobError, JobOutcome, JobSpec, JobState};

/// Tracks the current state and every state entered.
struct Lifecycle {
    id: u64,
    state: JobState,
    history: Vec<JobState>,
}

impl Lifecycle {
    fn new(id: u64) -> Self {
        Self {
            id,
            state: JobState::Pending,
            history: vec![JobState::Pending],
        }
    }

    fn advance(&mut self, next: JobState) -> Result<(), JobError> {
        let from = self.state.name();
        self.state = self.state.clone().transition(next)?;
        self.history.push(self.state.clone());
        tracing::info!(job_id = self.id, from, to = self.state.name(), "job state");
        Ok(())
    }

    fn into_outcome(self, ack: Option<Ack>) -> JobOutcome {
        JobOutcome {
            id: self.id,
            state: self.state,
            ack,
            history: self.history,
        }
    }
}

/// Run a blocking stage on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, JobError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, JobError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| JobError::Task(e.to_string()))?
}

fn require_artifact(stage: &'static str, path: &Path) -> Result<(), JobError> {
    let ready = std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
    if ready {
        Ok(())
    } else {
        Err(JobError::MissingArtifact {
            stage,
            path: path.to_path_buf(),
        })
    }
}

/// Run one job to a terminal state.
///
/// The scratch directory and every intermediate artifact in it are removed
/// before this returns, whatever the outcome. A failure is logged once here
/// with its full cause chain.
pub async fn run_job(spec: JobSpec, ctx: JobContext, cancel: CancelToken) -> JobOutcome {
    let mut life = Lifecycle::new(spec.id);
    let mut scratch = match ScratchDir::create(ctx.config.jobs.scratch_dir.as_deref(), spec.id) {
        Ok(s) => s,
        Err(e) => return finish(life, Err(JobError::Scratch(e)), &cancel),
    };
    let result = run_stages(&spec, &ctx, &cancel, &mut scratch, &mut life).await;
    if let Err(e) = scratch.close() {
        tracing::warn!(job_id = spec.id, error = %format!("{:#}", e), "scratch cleanup failed");
    }
    finish(life, result, &cancel)
}

fn finish(mut life: Lifecycle, result: Result<Ack, JobError>, cancel: &CancelToken) -> JobOutcome {
    let (next, ack) = match result {
        Ok(ack) => (JobState::Completed, Some(ack)),
        Err(e) if e.is_cancelled() || cancel.is_cancelled() => {
            tracing::info!(job_id = life.id, stage = life.state.name(), "job cancelled");
            (JobState::Cancelled, None)
        }
        Err(e) => {
            let reason = format!("{:#}", e);
            tracing::error!(job_id = life.id, stage = life.state.name(), error = %reason, "job failed");
            (JobState::Failed(reason), None)
        }
    };
    if let Err(e) = life.advance(next) {
        tracing::error!(job_id = life.id, error = %e, "unexpected terminal transition");
    }
    life.into_outcome(ack)
}

async fn run_stages(
    spec: &JobSpec,
    ctx: &JobContext,
    cancel: &CancelToken,
    scratch: &mut ScratchDir,
    life: &mut Lifecycle,
) -> Result<Ack, JobError> {
    let checkpoint = || cancel.checkpoint().map_err(|_| JobError::Cancelled);

    checkpoint()?;
    life.advance(JobState::Downloading)?;
    let source = scratch.artifact(&format!(
        "source.{}",
        naming::source_extension(&spec.locator, None)
    ));
    let mut transfer = TransferJob::new(spec.locator.clone(), source.clone(), &ctx.config.transfer);
    transfer.total_size = spec.size_hint;
    {
        let reporter = Arc::clone(&spec.reporter);
        let cancel = cancel.clone();
        blocking(move || Ok(download(&transfer, reporter, &cancel)?)).await?;
    }
    require_artifact("download", &source)?;

    checkpoint()?;
    life.advance(JobState::Compositing)?;
    let video = scratch.artifact("video.mp4");
    let overlay = OverlayJob {
        input_path: source.clone(),
        output_path: video.clone(),
        title_text: spec.settings.title.clone(),
        watermark: spec.settings.watermark.clone(),
        timeline_enabled: spec.settings.timeline_enabled,
        max_height: spec.settings.max_height,
        font_path: ctx.config.overlay.font_path.clone(),
    };
    {
        let tools = ctx.tools.clone();
        let reporter = Arc::clone(&spec.reporter);
        let cancel = cancel.clone();
        blocking(move || Ok(composite(&overlay, &tools, reporter, &cancel)?)).await?;
    }
    require_artifact("composite", &video)?;

    checkpoint()?;
    life.advance(JobState::Remuxing)?;
    let final_path: PathBuf =
        scratch.artifact(&naming::output_filename(&spec.settings.title, &spec.locator));
    {
        let tools = ctx.tools.clone();
        let (video, source, out) = (video.clone(), source.clone(), final_path.clone());
        blocking(move || Ok(remux(&video, &source, &out, &tools)?)).await?;
    }
    require_artifact("remux", &final_path)?;
    scratch.release(&video);
    scratch.release(&source);

    checkpoint()?;
    life.advance(JobState::Uploading)?;
    let ack = {
        let delivery = Arc::clone(&spec.delivery);
        let reporter = Arc::clone(&spec.reporter);
        let cancel = cancel.clone();
        let path = final_path.clone();
        blocking(move || delivery.deliver(&path, reporter, &cancel).map_err(JobError::Delivery)).await?
    };
    tracing::info!(
        job_id = spec.id,
        location = %ack.location,
        bytes = ack.bytes,
        sha256 = %ack.sha256,
        "job delivered"
    );
    Ok(ack)
}
