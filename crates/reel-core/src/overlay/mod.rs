//! Overlay compositor: burns a title, a running timecode, and an optional
//! watermark into every frame of a video.
//!
//! Frames flow strictly in order through three stages: an ffmpeg decoder
//! writing raw RGB to a pipe, the `Painter`, and an ffmpeg encoder reading
//! raw RGB from a pipe. The output carries video only; audio is restored by
//! the remux stage.

mod draw;
mod info;
mod layout;
mod pipe;

pub use draw::{blend, resolve_font, Painter};
pub use info::{parse_probe_json, probe_video, FrameRate, VideoInfo};
pub use layout::{format_timecode, output_dimensions, Layout};

use std::path::PathBuf;
use std::sync::Arc;

use image::RgbImage;

use crate::control::CancelToken;
use crate::progress::{Phase, ProgressReporter, ProgressTracker};
use crate::tools::ToolPaths;

use pipe::{FrameDecoder, FrameEncoder};

#[derive(Debug, thiserror::Error)]
pub enum CompositeError {
    #[error("unreadable source: {0}")]
    UnreadableSource(String),
    #[error("encoder failed ({status}): {stderr}")]
    EncodeFailure { status: String, stderr: String },
    #[error("unsupported frame size {width}x{height}")]
    UnsupportedDimensions { width: u32, height: u32 },
    #[error("invalid asset {}: {reason}", path.display())]
    InvalidAsset { path: PathBuf, reason: String },
    #[error("compositing cancelled")]
    Cancelled,
}

/// One compositing run.
#[derive(Debug, Clone)]
pub struct OverlayJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub title_text: String,
    pub watermark: Option<PathBuf>,
    pub timeline_enabled: bool,
    pub max_height: Option<u32>,
    /// Font for title and timecode; None searches system font paths.
    pub font_path: Option<PathBuf>,
}

/// Summary of a finished composite.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeReport {
    pub output_path: PathBuf,
    pub frames: u64,
    pub width: u32,
    pub height: u32,
    pub source: VideoInfo,
}

/// Composite `job.input_path` into `job.output_path`. Blocking.
///
/// On any error the partial output file is removed.
pub fn composite(
    job: &OverlayJob,
    tools: &ToolPaths,
    reporter: Arc<dyn ProgressReporter>,
    cancel: &CancelToken,
) -> Result<CompositeReport, CompositeError> {
    let result = run_composite(job, tools, reporter, cancel);
    if result.is_err() {
        let _ = std::fs::remove_file(&job.output_path);
    }
    result
}

fn run_composite(
    job: &OverlayJob,
    tools: &ToolPaths,
    reporter: Arc<dyn ProgressReporter>,
    cancel: &CancelToken,
) -> Result<CompositeReport, CompositeError> {
    cancel.checkpoint().map_err(|_| CompositeError::Cancelled)?;
    let source = probe_video(tools, &job.input_path)?;
    let (width, height) = output_dimensions(source.width, source.height, job.max_height)?;
    let scale_to = ((width, height) != (source.width, source.height)).then_some((width, height));
    tracing::info!(
        src_width = source.width,
        src_height = source.height,
        width,
        height,
        fps = %source.frame_rate.to_arg(),
        frames = ?source.frame_count,
        "compositing"
    );

    let painter = build_painter(job, Layout::new(width, height), source.frame_rate.as_f64())?;
    let mut decoder = FrameDecoder::spawn(tools, &job.input_path, scale_to).map_err(|e| {
        CompositeError::UnreadableSource(format!("failed to start {}: {e}", tools.ffmpeg.display()))
    })?;
    let mut encoder = match FrameEncoder::spawn(tools, &job.output_path, (width, height), source.frame_rate) {
        Ok(enc) => enc,
        Err(e) => {
            decoder.kill();
            return Err(CompositeError::EncodeFailure {
                status: "failed to start".to_string(),
                stderr: e.to_string(),
            });
        }
    };

    let mut tracker = ProgressTracker::new(Phase::Compositing, source.frame_count, reporter);
    let mut buf = vec![0u8; width as usize * height as usize * 3];
    let mut index: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            decoder.kill();
            encoder.kill();
            return Err(CompositeError::Cancelled);
        }
        match decoder.read_frame(&mut buf) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                decoder.kill();
                encoder.kill();
                return Err(CompositeError::UnreadableSource(format!("frame {index}: {e}")));
            }
        }
        let Some(mut frame) = RgbImage::from_raw(width, height, std::mem::take(&mut buf)) else {
            decoder.kill();
            encoder.kill();
            return Err(CompositeError::UnsupportedDimensions { width, height });
        };
        painter.paint(&mut frame, index);
        if let Err(e) = encoder.write_frame(frame.as_raw()) {
            decoder.kill();
            return Err(encode_failure(encoder, e));
        }
        buf = frame.into_raw();
        index += 1;
        tracker.update(index);
    }

    let decoded = decoder
        .finish()
        .map_err(|e| CompositeError::UnreadableSource(e.to_string()))?;
    if !decoded.success {
        encoder.kill();
        return Err(CompositeError::UnreadableSource(format!(
            "decoder {}: {}",
            decoded.status, decoded.stderr
        )));
    }
    if index == 0 {
        encoder.kill();
        return Err(CompositeError::UnreadableSource("no frames decoded".to_string()));
    }
    let encoded = encoder.finish().map_err(|e| CompositeError::EncodeFailure {
        status: "wait failed".to_string(),
        stderr: e.to_string(),
    })?;
    if !encoded.success {
        return Err(CompositeError::EncodeFailure {
            status: encoded.status,
            stderr: encoded.stderr,
        });
    }
    tracker.finish(index);
    tracing::info!(frames = index, output = %job.output_path.display(), "composite complete");
    Ok(CompositeReport {
        output_path: job.output_path.clone(),
        frames: index,
        width,
        height,
        source,
    })
}

fn build_painter(job: &OverlayJob, layout: Layout, fps: f64) -> Result<Painter, CompositeError> {
    let font_path = resolve_font(job.font_path.as_deref())?;
    let font = draw::load_font(&font_path)?;
    let watermark = job
        .watermark
        .as_deref()
        .map(|p| draw::load_watermark(p, &layout))
        .transpose()?;
    Ok(Painter::new(
        layout,
        font,
        &job.title_text,
        job.timeline_enabled,
        watermark,
        fps,
    ))
}

/// The encoder refused a frame; its exit status and stderr explain why.
fn encode_failure(encoder: FrameEncoder, write_err: std::io::Error) -> CompositeError {
    match encoder.finish() {
        Ok(done) if !done.success => CompositeError::EncodeFailure {
            status: done.status,
            stderr: done.stderr,
        },
        _ => CompositeError::EncodeFailure {
            status: "input closed".to_string(),
            stderr: write_err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopReporter;
    use std::path::Path;

    fn job(dir: &Path) -> OverlayJob {
        OverlayJob {
            input_path: dir.join("source.mp4"),
            output_path: dir.join("video.mp4"),
            title_text: "t".to_string(),
            watermark: None,
            timeline_enabled: true,
            max_height: Some(720),
            font_path: None,
        }
    }

    #[test]
    fn missing_ffprobe_is_unreadable_source() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ToolPaths {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ffprobe: PathBuf::from("/nonexistent/ffprobe"),
        };
        let err = composite(&job(dir.path()), &tools, Arc::new(NoopReporter), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, CompositeError::UnreadableSource(_)), "{err}");
        assert!(!dir.path().join("video.mp4").exists());
    }

    #[test]
    fn cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = composite(&job(dir.path()), &ToolPaths::default(), Arc::new(NoopReporter), &cancel)
            .unwrap_err();
        assert!(matches!(err, CompositeError::Cancelled));
    }

    #[test]
    fn error_messages_carry_details() {
        let e = CompositeError::InvalidAsset {
            path: PathBuf::from("/w/logo.png"),
            reason: "bad header".to_string(),
        };
        assert_eq!(e.to_string(), "invalid asset /w/logo.png: bad header");
        let e = CompositeError::EncodeFailure {
            status: "exit status 1".to_string(),
            stderr: "Unknown encoder 'libx264'".to_string(),
        };
        assert!(e.to_string().contains("Unknown encoder"));
    }
}
