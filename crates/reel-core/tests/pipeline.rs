//! End-to-end job (download from a local server, composite, remux, deliver)
//! plus compositor and remux checks on a generated source.
//!
//! Needs ffmpeg with libx264, ffprobe, and a system font; skipped otherwise.

mod common;

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use reel_core::checksum::digest_file;
use reel_core::config::ReelConfig;
use reel_core::control::CancelToken;
use reel_core::delivery::{Delivery, DirectoryDelivery};
use reel_core::job::{JobContext, JobRunner, JobSettings, JobSpec, JobState};
use reel_core::overlay::{composite, probe_video, resolve_font, OverlayJob};
use reel_core::progress::NoopReporter;
use reel_core::remux::remux;
use reel_core::tools::ToolPaths;
use tempfile::tempdir;

fn toolchain_ready(tools: &ToolPaths) -> bool {
    if !tools.missing().is_empty() || resolve_font(None).is_err() {
        return false;
    }
    Command::new(&tools.ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).contains("libx264"))
        .unwrap_or(false)
}

/// Two seconds of 640x480 test pattern at 15 fps with `audio_secs` of tone.
fn make_source(tools: &ToolPaths, path: &Path, audio_secs: f32) {
    let status = Command::new(&tools.ffmpeg)
        .args(["-hide_banner", "-v", "error", "-y"])
        .args(["-f", "lavfi", "-i", "testsrc=duration=2:size=640x480:rate=15"])
        .args(["-f", "lavfi", "-i"])
        .arg(format!("sine=frequency=440:duration={}", audio_secs))
        .args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac"])
        .arg(path)
        .status()
        .unwrap();
    assert!(status.success());
}

fn make_watermark(path: &Path) {
    image::RgbaImage::from_pixel(48, 24, image::Rgba([255, 255, 255, 160]))
        .save(path)
        .unwrap();
}

/// MD5 of the first audio stream's packets, copied without decoding.
fn audio_md5(tools: &ToolPaths, path: &Path) -> String {
    let out = Command::new(&tools.ffmpeg)
        .args(["-hide_banner", "-v", "error", "-i"])
        .arg(path)
        .args(["-map", "0:a:0", "-c", "copy", "-f", "md5", "-"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    String::from_utf8(out.stdout).unwrap().trim().to_string()
}

fn overlay_job(input: &Path, output: PathBuf, watermark: &Path) -> OverlayJob {
    OverlayJob {
        input_path: input.to_path_buf(),
        output_path: output,
        title_text: "Test Pattern".to_string(),
        watermark: Some(watermark.to_path_buf()),
        timeline_enabled: true,
        max_height: Some(360),
        font_path: None,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn job_produces_scaled_video_with_audio() {
    let cfg = ReelConfig::default();
    let tools = ToolPaths::from_config(&cfg.tools);
    if !toolchain_ready(&tools) {
        eprintln!("skipping: ffmpeg/ffprobe with libx264 or a font not available");
        return;
    }

    let work = tempdir().unwrap();
    let source = work.path().join("testsrc.mp4");
    make_source(&tools, &source, 2.0);
    let watermark = work.path().join("mark.png");
    make_watermark(&watermark);
    let server = common::http_server::start(std::fs::read(&source).unwrap());

    let mut cfg = cfg;
    cfg.transfer.chunk_size = 16 * 1024;
    cfg.transfer.backoff_ms = 10;
    cfg.jobs.scratch_dir = Some(work.path().join("scratch"));
    let out_dir = work.path().join("out");
    let delivery: Arc<dyn Delivery> = Arc::new(DirectoryDelivery::new(&out_dir));
    let mut settings = JobSettings::new("Test Pattern", &cfg);
    settings.max_height = Some(360);
    settings.watermark = Some(watermark);

    let runner = Arc::new(JobRunner::new(JobContext::new(cfg)));
    let outcome = runner
        .run(JobSpec::new(1, server.url.as_str(), settings, delivery))
        .await;

    assert_eq!(outcome.state, JobState::Completed, "{:?}", outcome.history);
    assert_eq!(
        outcome.history,
        vec![
            JobState::Pending,
            JobState::Downloading,
            JobState::Compositing,
            JobState::Remuxing,
            JobState::Uploading,
            JobState::Completed,
        ]
    );
    let ack = outcome.ack.unwrap();
    let delivered = std::path::PathBuf::from(&ack.location);
    assert_eq!(delivered, out_dir.join("Test_Pattern.mp4"));

    let info = probe_video(&tools, &delivered).unwrap();
    assert_eq!((info.width, info.height), (480, 360));
    let frames = info.frame_count.unwrap();
    assert!((28..=30).contains(&frames), "frames {frames}");
    assert!(info.has_audio);
    let duration = info.duration.unwrap();
    assert!((duration - 2.0).abs() < 0.25, "duration {duration}");

    // Scratch artifacts are gone once the job is terminal.
    let leftovers = std::fs::read_dir(work.path().join("scratch"))
        .map(|d| d.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[test]
fn compositing_is_deterministic() {
    let tools = ToolPaths::from_config(&ReelConfig::default().tools);
    if !toolchain_ready(&tools) {
        eprintln!("skipping: ffmpeg/ffprobe with libx264 or a font not available");
        return;
    }

    let work = tempdir().unwrap();
    let source = work.path().join("testsrc.mp4");
    make_source(&tools, &source, 2.0);
    let watermark = work.path().join("mark.png");
    make_watermark(&watermark);

    let mut digests = Vec::new();
    for name in ["first.mp4", "second.mp4"] {
        let job = overlay_job(&source, work.path().join(name), &watermark);
        let report = composite(&job, &tools, Arc::new(NoopReporter), &CancelToken::new()).unwrap();
        assert_eq!((report.width, report.height), (480, 360));
        digests.push(digest_file(&report.output_path).unwrap());
    }
    assert!(digests[0].bytes > 0);
    assert_eq!(digests[0], digests[1]);
}

#[test]
fn remux_keeps_source_audio_bit_exact() {
    let tools = ToolPaths::from_config(&ReelConfig::default().tools);
    if !toolchain_ready(&tools) {
        eprintln!("skipping: ffmpeg/ffprobe with libx264 or a font not available");
        return;
    }

    let work = tempdir().unwrap();
    let source = work.path().join("testsrc.mp4");
    // Audio ends before the picture so the shortest stream is never cut.
    make_source(&tools, &source, 1.5);
    let watermark = work.path().join("mark.png");
    make_watermark(&watermark);

    let job = overlay_job(&source, work.path().join("video.mp4"), &watermark);
    composite(&job, &tools, Arc::new(NoopReporter), &CancelToken::new()).unwrap();
    let final_path = work.path().join("final.mp4");
    remux(&job.output_path, &source, &final_path, &tools).unwrap();

    assert!(probe_video(&tools, &final_path).unwrap().has_audio);
    let expected = audio_md5(&tools, &source);
    assert!(expected.starts_with("MD5="), "{expected}");
    assert_eq!(audio_md5(&tools, &final_path), expected);
}
