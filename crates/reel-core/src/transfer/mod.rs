//! Transfer engine: probe, plan, and fetch a source into a local artifact;
//! upload finished artifacts in ranged chunks.
//!
//! Downloads run in parallel ranged chunks when the source reports a size
//! and honors byte ranges, and fall back to a single streamed GET otherwise.
//! Either way the data lands in `<destination>.part`, which is renamed into
//! place only after every byte has arrived. Any failure removes it.
//!
//! Everything here is blocking; async callers use `spawn_blocking`.

mod chunk;
mod error;
mod pool;
mod stream;
mod throttle;
mod upload;

pub use error::TransferError;
pub use throttle::Throttle;
pub use upload::{upload, UploadReport, UploadRequest};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TransferConfig;
use crate::control::CancelToken;
use crate::planner::{plan, ChunkTable};
use crate::probe::{probe, ProbeResult};
use crate::progress::{Phase, ProgressReporter, ProgressTracker};
use crate::retry::RetryPolicy;
use crate::storage::{self, StorageWriterBuilder};

/// One download from a source locator into a local file.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub locator: String,
    pub destination_path: PathBuf,
    /// Size hint used for progress when the server does not report one.
    pub total_size: Option<u64>,
    pub chunk_size: u64,
    pub concurrency_limit: usize,
    /// Aggregate bytes/sec ceiling; None = unthrottled.
    pub bandwidth_cap: Option<u64>,
    pub retry: RetryPolicy,
    /// Sources larger than this are refused before any body is fetched.
    pub max_source_bytes: Option<u64>,
}

impl TransferJob {
    pub fn new(locator: impl Into<String>, destination_path: impl Into<PathBuf>, cfg: &TransferConfig) -> Self {
        Self {
            locator: locator.into(),
            destination_path: destination_path.into(),
            total_size: None,
            chunk_size: cfg.chunk_size,
            concurrency_limit: cfg.concurrency_limit,
            bandwidth_cap: cfg.download_bytes_per_sec,
            retry: RetryPolicy {
                retry_budget: cfg.retry_budget,
                backoff: Duration::from_millis(cfg.backoff_ms),
            },
            max_source_bytes: cfg.max_source_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    /// Parallel ranged GETs.
    Chunked { chunks: usize },
    /// One streamed GET.
    Stream,
}

#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub bytes: u64,
    pub mode: DownloadMode,
    /// Requests made, retries included.
    pub attempts: u32,
    pub probe: ProbeResult,
}

/// Download `job.locator` to `job.destination_path`. Blocking.
pub fn download(
    job: &TransferJob,
    reporter: Arc<dyn ProgressReporter>,
    cancel: &CancelToken,
) -> Result<DownloadReport, TransferError> {
    cancel.checkpoint().map_err(|_| TransferError::Cancelled)?;
    let probed = probe(&job.locator)?;
    tracing::debug!(
        locator = %job.locator,
        size = ?probed.total_size,
        ranges = probed.supports_ranges,
        "probed source"
    );
    if let (Some(size), Some(limit)) = (probed.total_size, job.max_source_bytes) {
        if size > limit {
            return Err(TransferError::TooLarge { size, limit });
        }
    }

    let temp = storage::temp_path(&job.destination_path);
    let total = probed.total_size.or(job.total_size);
    let mut tracker = ProgressTracker::new(Phase::Downloading, total, reporter);
    let mut builder = StorageWriterBuilder::create(&temp).map_err(TransferError::Prepare)?;

    let (mode, bytes, attempts) = if probed.allows_parallel() {
        let size = probed.total_size.unwrap_or_default();
        if let Err(e) = builder.preallocate(size) {
            builder.build().discard();
            return Err(TransferError::Prepare(e));
        }
        let writer = builder.build();
        let ranges = match plan(size, job.chunk_size) {
            Ok(r) => r,
            Err(e) => {
                writer.discard();
                return Err(e.into());
            }
        };
        let mut table = ChunkTable::new(&ranges);
        let workers = job.concurrency_limit.max(1).min(ranges.len());
        let ctx = pool::PoolContext {
            locator: job.locator.clone(),
            storage: writer.clone(),
            policy: job.retry,
            throttle: Arc::new(Throttle::new(job.bandwidth_cap, workers)),
            workers,
        };
        tracing::info!(
            size,
            chunks = ranges.len(),
            workers,
            throttled = ctx.throttle.is_limited(),
            "downloading in ranged chunks"
        );
        let throttle = Arc::clone(&ctx.throttle);
        if let Err(e) = pool::run_chunks(ctx, &mut table, &mut tracker, cancel) {
            writer.discard();
            return Err(e);
        }
        if let Some(rate) = throttle.measured_rate() {
            tracing::debug!(bytes_per_sec = rate as u64, "chunk throughput");
        }
        let attempts = (0..table.len())
            .filter_map(|i| table.get(i))
            .map(|c| c.attempts)
            .sum();
        finalize(writer, job)?;
        (DownloadMode::Chunked { chunks: ranges.len() }, size, attempts)
    } else {
        let writer = builder.build();
        let throttle = Throttle::new(job.bandwidth_cap, 1);
        let ctx = stream::StreamContext {
            locator: &job.locator,
            storage: &writer,
            policy: &job.retry,
            throttle: &throttle,
            pace_every: job.chunk_size.max(1),
            max_bytes: job.max_source_bytes,
        };
        tracing::info!(size = ?total, "source does not support ranges, streaming");
        let (bytes, attempts) = match stream::fetch_stream(&ctx, &mut tracker, cancel) {
            Ok(r) => r,
            Err(e) => {
                writer.discard();
                return Err(e);
            }
        };
        finalize(writer, job)?;
        (DownloadMode::Stream, bytes, attempts)
    };

    tracker.finish(bytes);
    tracing::info!(bytes, attempts, path = %job.destination_path.display(), "download complete");
    Ok(DownloadReport {
        path: job.destination_path.clone(),
        bytes,
        mode,
        attempts,
        probe: probed,
    })
}

fn finalize(writer: storage::StorageWriter, job: &TransferJob) -> Result<(), TransferError> {
    if let Err(e) = writer.sync() {
        writer.discard();
        return Err(TransferError::storage("sync", e));
    }
    let temp = writer.temp_path().to_path_buf();
    writer.finalize(&job.destination_path).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        TransferError::storage(format!("rename to {}", job.destination_path.display()), e)
    })
}
