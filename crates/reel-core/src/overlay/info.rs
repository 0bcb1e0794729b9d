//! Source video metadata from `ffprobe -print_format json`.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;

use crate::tools::{self, ToolPaths};

use super::CompositeError;

/// Frame rate as a rational (e.g. 30000/1001).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// "30000/1001", as ffmpeg's `-r` accepts it.
    pub fn to_arg(&self) -> String {
        format!("{}/{}", self.num, self.den)
    }

    /// Parse "num/den" or a plain number. Zero rates are rejected.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (num, den) = match s.split_once('/') {
            Some((n, d)) => (n.trim().parse().ok()?, d.trim().parse().ok()?),
            None => (s.parse().ok()?, 1),
        };
        if num == 0 || den == 0 {
            return None;
        }
        Some(Self { num, den })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    /// Frames in the first video stream, from the container or estimated from duration.
    pub frame_count: Option<u64>,
    /// Seconds.
    pub duration: Option<f64>,
    pub has_audio: bool,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse ffprobe's JSON into `VideoInfo`.
pub fn parse_probe_json(json: &str) -> Result<VideoInfo, CompositeError> {
    let out: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| CompositeError::UnreadableSource(format!("bad ffprobe output: {e}")))?;
    let video = out
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| CompositeError::UnreadableSource("no video stream".to_string()))?;
    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) => (w, h),
        _ => {
            return Err(CompositeError::UnreadableSource(
                "video stream has no dimensions".to_string(),
            ))
        }
    };
    let frame_rate = [&video.r_frame_rate, &video.avg_frame_rate]
        .into_iter()
        .flatten()
        .find_map(|r| FrameRate::parse(r))
        .ok_or_else(|| CompositeError::UnreadableSource("unknown frame rate".to_string()))?;
    let duration = video
        .duration
        .as_deref()
        .or(out.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);
    let frame_count = video
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .or_else(|| duration.map(|d| (d * frame_rate.as_f64()).round() as u64));
    let has_audio = out
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));
    Ok(VideoInfo {
        width,
        height,
        frame_rate,
        frame_count,
        duration,
        has_audio,
    })
}

/// Run ffprobe on `path`. Blocking.
pub fn probe_video(tools: &ToolPaths, path: &Path) -> Result<VideoInfo, CompositeError> {
    let output = std::process::Command::new(&tools.ffprobe)
        .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            CompositeError::UnreadableSource(format!(
                "failed to start {}: {e}",
                tools.ffprobe.display()
            ))
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CompositeError::UnreadableSource(format!(
            "ffprobe {}: {}",
            tools::describe_status(output.status),
            tools::tail(stderr.trim(), 2048)
        )));
    }
    parse_probe_json(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
             "r_frame_rate": "30/1", "avg_frame_rate": "30/1", "nb_frames": "3600", "duration": "120.000000"},
            {"index": 1, "codec_type": "audio", "codec_name": "aac", "r_frame_rate": "0/0"}
        ],
        "format": {"duration": "120.010000"}
    }"#;

    #[test]
    fn parses_video_and_audio_streams() {
        let info = parse_probe_json(SAMPLE).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.frame_rate, FrameRate { num: 30, den: 1 });
        assert_eq!(info.frame_count, Some(3600));
        assert_eq!(info.duration, Some(120.0));
        assert!(info.has_audio);
    }

    #[test]
    fn estimates_frames_from_duration_when_count_missing() {
        let json = r#"{"streams":[{"codec_type":"video","width":640,"height":360,
            "r_frame_rate":"30000/1001"}],"format":{"duration":"10.01"}}"#;
        let info = parse_probe_json(json).unwrap();
        assert_eq!(info.frame_count, Some(300));
        assert!(!info.has_audio);
        assert_eq!(info.frame_rate.to_arg(), "30000/1001");
    }

    #[test]
    fn falls_back_to_average_frame_rate() {
        let json = r#"{"streams":[{"codec_type":"video","width":2,"height":2,
            "r_frame_rate":"0/0","avg_frame_rate":"25/1"}]}"#;
        let info = parse_probe_json(json).unwrap();
        assert_eq!(info.frame_rate.as_f64(), 25.0);
        assert_eq!(info.frame_count, None);
    }

    #[test]
    fn audio_only_source_is_unreadable() {
        let json = r#"{"streams":[{"codec_type":"audio"}]}"#;
        assert!(matches!(
            parse_probe_json(json),
            Err(CompositeError::UnreadableSource(_))
        ));
        assert!(parse_probe_json("not json").is_err());
    }

    #[test]
    fn frame_rate_parsing() {
        assert_eq!(FrameRate::parse("24"), Some(FrameRate { num: 24, den: 1 }));
        assert_eq!(FrameRate::parse("0/0"), None);
        assert_eq!(FrameRate::parse("30/0"), None);
        assert_eq!(FrameRate::parse("abc"), None);
    }
}
