//! File names for job artifacts.
//!
//! Scratch artifacts keep the source's container extension so ffmpeg can
//! pick the demuxer; delivered files are named after the job title.

/// Containers the pipeline recognizes by extension.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "mkv", "webm", "avi", "ts", "flv"];

const DEFAULT_EXTENSION: &str = "mp4";

/// Output name when neither the title nor the locator yields anything usable.
const DEFAULT_OUTPUT_STEM: &str = "reel-output";

/// Longest stem kept from a title, in bytes (leaves room for suffixes under NAME_MAX).
const MAX_STEM: usize = 200;

/// Container extension for the downloaded source.
///
/// Uses the locator's path extension when it is a known video container,
/// then the `Content-Type`, else `mp4`.
pub fn source_extension(locator: &str, content_type: Option<&str>) -> &'static str {
    if let Some(ext) = path_extension(locator) {
        if let Some(known) = VIDEO_EXTENSIONS.iter().find(|e| e.eq_ignore_ascii_case(&ext)) {
            return *known;
        }
    }
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|s| s.trim().to_ascii_lowercase());
    match mime.as_deref() {
        Some("video/webm") => "webm",
        Some("video/x-matroska") => "mkv",
        Some("video/quicktime") => "mov",
        Some("video/x-msvideo") => "avi",
        Some("video/mp2t") => "ts",
        Some("video/x-flv") => "flv",
        _ => DEFAULT_EXTENSION,
    }
}

/// Extension of the last path segment of `locator`, without the dot.
fn path_extension(locator: &str) -> Option<String> {
    let parsed = url::Url::parse(locator).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_string())
}

/// Stem of the locator's last path segment, if any.
fn path_stem(locator: &str) -> Option<String> {
    let parsed = url::Url::parse(locator).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let stem = segment.rsplit_once('.').map(|(s, _)| s).unwrap_or(segment);
    Some(stem.to_string())
}

/// Name for the delivered file: the sanitized title with `.mp4`, falling
/// back to the locator's file stem.
pub fn output_filename(title: &str, locator: &str) -> String {
    let stem = [Some(title.to_string()), path_stem(locator)]
        .into_iter()
        .flatten()
        .map(|s| sanitize_stem(&s))
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_OUTPUT_STEM.to_string());
    format!("{}.mp4", stem)
}

/// Make `name` safe as a Linux file name stem.
///
/// Path separators, NUL, control characters, and whitespace become `_`;
/// runs of `_` collapse; leading and trailing dots and underscores are trimmed.
pub fn sanitize_stem(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;
    for c in name.chars() {
        let unsafe_char = c == '/' || c == '\\' || c.is_control() || c.is_whitespace();
        if unsafe_char || c == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }
    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    let mut take = trimmed.len().min(MAX_STEM);
    while !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].to_string()
}
