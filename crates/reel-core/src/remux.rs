//! Reunite the composited picture with the source's original audio.
//!
//! Both streams are copied without re-encoding. A source with no audio
//! yields a video-only output. Never retried: a failed remux fails the job.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use crate::tools::{self, ToolPaths};

#[derive(Debug, thiserror::Error)]
pub enum RemuxError {
    #[error("{tool} {status}: {stderr}")]
    ExternalToolFailure {
        tool: String,
        status: String,
        stderr: String,
    },
}

fn remux_args(video_only: &Path, audio_source: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-i"].iter().map(OsString::from).collect();
    args.push(video_only.into());
    args.push("-i".into());
    args.push(audio_source.into());
    for a in [
        "-map", "0:v:0", "-map", "1:a:0?", "-c", "copy", "-shortest", "-movflags", "+faststart",
    ] {
        args.push(a.into());
    }
    args.push(output.into());
    args
}

/// Copy the video stream of `video_only` and the first audio stream of
/// `audio_source` (if any) into `output`. Blocking.
pub fn remux(
    video_only: &Path,
    audio_source: &Path,
    output: &Path,
    tools: &ToolPaths,
) -> Result<(), RemuxError> {
    let tool = tools.ffmpeg.display().to_string();
    let mut cmd = tools.ffmpeg_command();
    cmd.args(remux_args(video_only, audio_source, output))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    tracing::debug!(video = %video_only.display(), audio = %audio_source.display(), "remuxing");

    let mut child = cmd.spawn().map_err(|e| RemuxError::ExternalToolFailure {
        tool: tool.clone(),
        status: "failed to start".to_string(),
        stderr: e.to_string(),
    })?;
    let stderr = child.stderr.take().map(tools::drain_stderr);
    let status = child.wait().map_err(|e| RemuxError::ExternalToolFailure {
        tool: tool.clone(),
        status: "wait failed".to_string(),
        stderr: e.to_string(),
    })?;
    let diagnostics = tools::join_stderr(stderr);
    if !status.success() {
        let _ = std::fs::remove_file(output);
        return Err(RemuxError::ExternalToolFailure {
            tool,
            status: tools::describe_status(status),
            stderr: diagnostics,
        });
    }
    Ok(())
}
