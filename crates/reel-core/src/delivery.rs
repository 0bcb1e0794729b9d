//! Delivery of the finished artifact and the acknowledgment it produces.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::checksum::digest_file;
use crate::config::TransferConfig;
use crate::control::CancelToken;
use crate::progress::{Phase, ProgressReporter, ProgressTracker};
use crate::retry::RetryPolicy;
use crate::transfer::{upload, UploadRequest};

/// What a delivery hands back: where the artifact went and what it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub location: String,
    pub bytes: u64,
    pub sha256: String,
}

/// Takes a finished artifact out of the job's scratch directory.
///
/// Blocking; the orchestrator calls it from `spawn_blocking`. An error fails the job.
pub trait Delivery: Send + Sync {
    fn deliver(
        &self,
        final_path: &Path,
        reporter: Arc<dyn ProgressReporter>,
        cancel: &CancelToken,
    ) -> Result<Ack>;
}

/// Chunked `PUT` upload through the transfer engine.
#[derive(Debug, Clone)]
pub struct HttpPutDelivery {
    destination: String,
    chunk_size: u64,
    retry: RetryPolicy,
    bandwidth_cap: Option<u64>,
}

impl HttpPutDelivery {
    pub fn new(destination: impl Into<String>, cfg: &TransferConfig) -> Self {
        Self {
            destination: destination.into(),
            chunk_size: cfg.chunk_size,
            retry: RetryPolicy {
                retry_budget: cfg.retry_budget,
                backoff: Duration::from_millis(cfg.backoff_ms),
            },
            bandwidth_cap: cfg.upload_bytes_per_sec,
        }
    }
}

impl Delivery for HttpPutDelivery {
    fn deliver(
        &self,
        final_path: &Path,
        reporter: Arc<dyn ProgressReporter>,
        cancel: &CancelToken,
    ) -> Result<Ack> {
        let digest = digest_file(final_path)?;
        let req = UploadRequest {
            source_path: final_path.to_path_buf(),
            destination: self.destination.clone(),
            chunk_size: self.chunk_size,
            retry: self.retry,
            bandwidth_cap: self.bandwidth_cap,
            content_type: Some("video/mp4".to_string()),
        };
        let report = upload(&req, reporter, cancel)
            .with_context(|| format!("upload to {}", self.destination))?;
        Ok(Ack {
            location: self.destination.clone(),
            bytes: report.bytes,
            sha256: digest.sha256,
        })
    }
}

/// Moves the artifact into a local directory.
#[derive(Debug, Clone)]
pub struct DirectoryDelivery {
    dir: PathBuf,
}

impl DirectoryDelivery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

/// `dir/name`, or `dir/stem-N.ext` for the first N that is free.
fn unique_target(dir: &Path, name: &str) -> PathBuf {
    let first = dir.join(name);
    if !first.exists() {
        return first;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((s, e)) if !s.is_empty() => (s, Some(e)),
        _ => (name, None),
    };
    (1u32..)
        .map(|n| match ext {
            Some(e) => dir.join(format!("{stem}-{n}.{e}")),
            None => dir.join(format!("{stem}-{n}")),
        })
        .find(|p| !p.exists())
        .unwrap_or(first)
}

impl Delivery for DirectoryDelivery {
    fn deliver(
        &self,
        final_path: &Path,
        reporter: Arc<dyn ProgressReporter>,
        cancel: &CancelToken,
    ) -> Result<Ack> {
        cancel.checkpoint()?;
        let name = final_path
            .file_name()
            .and_then(|n| n.to_str())
            .context("artifact has no file name")?;
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create {}", self.dir.display()))?;
        let digest = digest_file(final_path)?;
        let mut tracker = ProgressTracker::new(Phase::Uploading, Some(digest.bytes), reporter);
        tracker.update(0);
        let target = unique_target(&self.dir, name);
        if std::fs::rename(final_path, &target).is_err() {
            // Different filesystem: copy, then drop the scratch copy.
            std::fs::copy(final_path, &target)
                .with_context(|| format!("copy to {}", target.display()))?;
            let _ = std::fs::remove_file(final_path);
        }
        tracker.finish(digest.bytes);
        tracing::info!(path = %target.display(), bytes = digest.bytes, "artifact delivered");
        Ok(Ack {
            location: target.display().to_string(),
            bytes: digest.bytes,
            sha256: digest.sha256,
        })
    }
}
