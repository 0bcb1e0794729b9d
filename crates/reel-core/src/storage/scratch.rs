//! Per-job scratch directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Isolated working directory for one job. Every intermediate artifact lives
/// here; the directory and its contents are removed when this value drops,
/// whether the job completed, failed, or was cancelled.
#[derive(Debug)]
pub struct ScratchDir {
    dir: tempfile::TempDir,
    artifacts: Vec<PathBuf>,
}

impl ScratchDir {
    /// Create a fresh scratch directory under `root` (or the system temp dir).
    pub fn create(root: Option<&Path>, job_id: u64) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        let prefix = format!("reel-job-{}-", job_id);
        builder.prefix(&prefix);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)
                    .with_context(|| format!("create scratch root {}", root.display()))?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .context("create job scratch directory")?;
        tracing::debug!(job_id, path = %dir.path().display(), "created scratch directory");
        Ok(Self {
            dir,
            artifacts: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Reserve a path for a new artifact inside the scratch directory.
    pub fn artifact(&mut self, name: &str) -> PathBuf {
        let p = self.dir.path().join(name);
        self.artifacts.push(p.clone());
        p
    }

    /// Artifacts reserved so far, in creation order.
    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Remove one artifact early (e.g. once the next stage no longer needs it).
    pub fn release(&mut self, path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove artifact");
            }
        }
        self.artifacts.retain(|p| p != path);
    }

    /// Delete the directory now and report errors instead of ignoring them on drop.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .with_context(|| format!("remove scratch directory {}", path.display()))
    }
}
