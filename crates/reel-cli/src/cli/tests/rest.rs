use super::{parse, parse_err};
use crate::cli::commands::parse_batch;
use crate::cli::progress::format_event;
use crate::cli::CliCommand;
use reel_core::progress::{Phase, ProgressEvent};
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn cli_parse_batch() {
    match parse(&["reel", "batch", "jobs.tsv", "--out-dir", "out", "--max-height", "360"]) {
        CliCommand::Batch {
            file,
            overlay,
            out_dir,
        } => {
            assert_eq!(file, PathBuf::from("jobs.tsv"));
            assert_eq!(out_dir, PathBuf::from("out"));
            assert_eq!(overlay.max_height, Some(360));
        }
        _ => panic!("expected Batch"),
    }
}

#[test]
fn cli_batch_requires_out_dir() {
    parse_err(&["reel", "batch", "jobs.tsv"]);
}

#[test]
fn cli_parse_probe() {
    match parse(&["reel", "probe", "https://example.com/a.mp4"]) {
        CliCommand::Probe { url } => assert_eq!(url, "https://example.com/a.mp4"),
        _ => panic!("expected Probe"),
    }
}

#[test]
fn cli_parse_checksum() {
    match parse(&["reel", "checksum", "/tmp/a.mp4"]) {
        CliCommand::Checksum { path } => assert_eq!(path, PathBuf::from("/tmp/a.mp4")),
        _ => panic!("expected Checksum"),
    }
}

#[test]
fn cli_unknown_command_fails() {
    parse_err(&["reel", "add", "https://example.com/a.mp4"]);
}

#[test]
fn batch_file_parsing() {
    let text = "# url\ttitle\nhttps://a.example/1.mp4\tFirst clip\n\n  \nhttps://a.example/2.mp4\t Second \r\n";
    let entries = parse_batch(text).unwrap();
    assert_eq!(
        entries,
        vec![
            ("https://a.example/1.mp4".to_string(), "First clip".to_string()),
            ("https://a.example/2.mp4".to_string(), "Second".to_string()),
        ]
    );
}

#[test]
fn batch_line_without_tab_is_an_error() {
    let err = parse_batch("https://a.example/1.mp4\tok\nhttps://a.example/2.mp4 no tab\n").unwrap_err();
    assert!(err.to_string().contains("line 2"));
}

#[test]
fn progress_lines() {
    let ev = ProgressEvent {
        phase: Phase::Downloading,
        bytes_done: 5 * 1_048_576,
        bytes_total: Some(10 * 1_048_576),
        elapsed: Duration::from_secs(5),
        rate: 1_048_576.0,
    };
    let line = format_event(&ev);
    assert!(line.starts_with("downloading"));
    assert!(line.contains(" 50%"));
    assert!(line.contains("5.0 MiB"));
    assert!(line.contains("ETA 5s"));

    let frames = ProgressEvent {
        phase: Phase::Compositing,
        bytes_done: 30,
        bytes_total: None,
        elapsed: Duration::from_secs(1),
        rate: 30.0,
    };
    assert_eq!(format_event(&frames), "compositing  30 frames  30.0 fps");
}

#[test]
fn cli_parse_completions() {
    match parse(&["reel", "completions", "bash"]) {
        CliCommand::Completions { shell } => assert_eq!(shell, clap_complete::Shell::Bash),
        _ => panic!("expected Completions"),
    }
    parse_err(&["reel", "completions", "tcsh"]);
}

#[test]
fn completions_and_manpage_render() {
    let mut script = Vec::new();
    crate::cli::commands::write_completions(clap_complete::Shell::Bash, &mut script);
    let script = String::from_utf8(script).unwrap();
    assert!(script.contains("reel"));
    assert!(script.contains("process"));

    let mut page = Vec::new();
    crate::cli::commands::render_manpage(&mut page).unwrap();
    let page = String::from_utf8(page).unwrap();
    assert!(page.contains("reel"));
    assert!(page.contains("checksum"));
}
