use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const MIB: u64 = 1024 * 1024;

/// Transfer engine parameters (`[transfer]` in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Bytes per ranged request / upload chunk.
    pub chunk_size: u64,
    /// Maximum concurrent chunk requests per download.
    pub concurrency_limit: usize,
    /// Failures tolerated per chunk before the transfer fails.
    pub retry_budget: u32,
    /// Fixed sleep between attempts, in milliseconds.
    pub backoff_ms: u64,
    pub download_bytes_per_sec: Option<u64>,
    pub upload_bytes_per_sec: Option<u64>,
    /// Sources larger than this are refused.
    pub max_source_bytes: Option<u64>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10 * MIB,
            concurrency_limit: 4,
            retry_budget: 5,
            backoff_ms: 1000,
            download_bytes_per_sec: None,
            upload_bytes_per_sec: None,
            max_source_bytes: Some(2048 * MIB),
        }
    }
}

/// Compositor defaults (`[overlay]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Output frames taller than this are scaled down. None keeps the source height.
    pub max_height: Option<u32>,
    pub timeline: bool,
    /// Default watermark image for jobs that do not set one.
    pub watermark: Option<PathBuf>,
    /// TrueType/OpenType font for the title and timecode. None searches common system paths.
    pub font_path: Option<PathBuf>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            max_height: Some(720),
            timeline: true,
            watermark: None,
            font_path: None,
        }
    }
}

/// Orchestrator limits (`[jobs]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub max_concurrent_jobs: usize,
    /// Parent of per-job scratch directories. None uses the system temp dir.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            scratch_dir: None,
        }
    }
}

/// External programs (`[tools]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

/// Global configuration loaded from `~/.config/reel/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReelConfig {
    pub transfer: TransferConfig,
    pub overlay: OverlayConfig,
    pub jobs: JobsConfig,
    pub tools: ToolsConfig,
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("reel")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ReelConfig> {
    load_or_init_at(&config_path()?)
}

/// Same as `load_or_init` for an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<ReelConfig> {
    if !path.exists() {
        let default_cfg = ReelConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml).with_context(|| format!("write {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ReelConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
