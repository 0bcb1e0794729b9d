//! CLI for the reel media pipeline.

mod commands;
mod progress;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use reel_core::config::{self, ReelConfig};
use reel_core::job::JobSettings;
use std::path::PathBuf;

use commands::{render_manpage, run_batch, run_checksum, run_probe, run_process, write_completions};

/// Top-level CLI for reel.
#[derive(Debug, Parser)]
#[command(name = "reel")]
#[command(about = "reel: fetch a video, burn in a title and timecode, deliver it", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Where the finished video goes.
#[derive(Debug, Clone, Args)]
#[group(required = true, multiple = false)]
pub struct DeliveryTarget {
    /// Move the result into this directory.
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,
    /// Upload the result with chunked PUT requests to this URL.
    #[arg(long, value_name = "URL")]
    pub upload_to: Option<String>,
}

/// Overlay options shared by `process` and `batch`.
#[derive(Debug, Clone, Default, Args)]
pub struct OverlayArgs {
    /// Watermark image blended into the top-right corner.
    #[arg(long, value_name = "PATH")]
    pub watermark: Option<PathBuf>,
    /// Do not draw the running timecode.
    #[arg(long)]
    pub no_timeline: bool,
    /// Scale frames taller than this down to this height.
    #[arg(long, value_name = "PX")]
    pub max_height: Option<u32>,
}

impl OverlayArgs {
    /// Config defaults with command-line overrides applied.
    pub fn settings(&self, title: &str, cfg: &ReelConfig) -> JobSettings {
        let mut s = JobSettings::new(title, cfg);
        if let Some(w) = &self.watermark {
            s.watermark = Some(w.clone());
        }
        if self.no_timeline {
            s.timeline_enabled = false;
        }
        if let Some(h) = self.max_height {
            s.max_height = Some(h);
        }
        s
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download, composite, remux, and deliver one video.
    Process {
        /// Direct HTTP/HTTPS URL of the source video.
        url: String,
        /// Title burned into the top-left corner.
        #[arg(long)]
        title: String,
        #[command(flatten)]
        overlay: OverlayArgs,
        /// Expected size in bytes, for progress when the server reports none.
        #[arg(long, value_name = "BYTES")]
        size_hint: Option<u64>,
        #[command(flatten)]
        target: DeliveryTarget,
    },

    /// Process every `URL<TAB>TITLE` line of a file, several jobs at a time.
    Batch {
        /// Batch file; blank lines and lines starting with '#' are skipped.
        file: PathBuf,
        #[command(flatten)]
        overlay: OverlayArgs,
        /// Directory receiving the finished videos.
        #[arg(long, value_name = "DIR")]
        out_dir: PathBuf,
    },

    /// Show what the server reports for a URL (size, range support, type).
    Probe {
        /// Direct HTTP/HTTPS URL.
        url: String,
    },

    /// Compute SHA-256 of a file.
    Checksum {
        /// Path to the file.
        path: PathBuf,
    },

    /// Print a shell completion script to stdout.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },

    /// Print the man page (roff) to stdout.
    Manpage,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        match cli.command {
            CliCommand::Completions { shell } => {
                write_completions(shell, &mut std::io::stdout());
                return Ok(());
            }
            CliCommand::Manpage => return render_manpage(&mut std::io::stdout()),
            _ => {}
        }
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Process {
                url,
                title,
                overlay,
                size_hint,
                target,
            } => {
                let settings = overlay.settings(&title, &cfg);
                run_process(cfg, &url, settings, size_hint, &target).await?
            }
            CliCommand::Batch {
                file,
                overlay,
                out_dir,
            } => run_batch(cfg, &file, &overlay, &out_dir).await?,
            CliCommand::Probe { url } => run_probe(&url).await?,
            CliCommand::Checksum { path } => run_checksum(&path).await?,
            CliCommand::Completions { .. } | CliCommand::Manpage => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
