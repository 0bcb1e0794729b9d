//! Metadata probe for source locators.
//!
//! Uses libcurl to learn the size of a resource and whether it honors byte
//! ranges. A HEAD request is tried first; servers that refuse HEAD are probed
//! with a one-byte ranged GET instead.

mod parse;

pub use parse::{parse_content_range, parse_headers};

use std::str;
use std::time::Duration;

/// What the transfer engine needs to know before choosing a download mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResult {
    /// Total size in bytes, if the server reported one.
    pub total_size: Option<u64>,
    /// True if the server honors `Range: bytes=...` requests.
    pub supports_ranges: bool,
    /// `Content-Type`, if present.
    pub content_type: Option<String>,
    /// `Content-Disposition`, if present (filename hint).
    pub content_disposition: Option<String>,
}

impl ProbeResult {
    /// Parallel ranged download is possible only with a known, non-zero size and range support.
    pub fn allows_parallel(&self) -> bool {
        self.supports_ranges && self.total_size.map(|n| n > 0).unwrap_or(false)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe request failed: {0}")]
    Curl(#[from] curl::Error),
    #[error("probe of {url} returned HTTP {status}")]
    Http { url: String, status: u32 },
}

/// Probe `locator` with HEAD, falling back to a ranged GET when HEAD is refused.
///
/// Blocking; call from `spawn_blocking` when used from async code.
pub fn probe(locator: &str) -> Result<ProbeResult, ProbeError> {
    match probe_head(locator) {
        Ok(r) => Ok(r),
        Err(ProbeError::Http { status, .. }) => {
            tracing::debug!(status, "HEAD refused, probing with ranged GET");
            probe_range(locator)
        }
        Err(e) => Err(e),
    }
}

fn base_easy(locator: &str) -> Result<curl::easy::Easy, curl::Error> {
    let mut easy = curl::easy::Easy::new();
    easy.url(locator)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(Duration::from_secs(15))?;
    easy.timeout(Duration::from_secs(30))?;
    Ok(easy)
}

fn collect_headers(easy: &mut curl::easy::Easy, discard_body: bool) -> Result<Vec<String>, curl::Error> {
    let mut headers: Vec<String> = Vec::new();
    let mut body_seen = 0usize;
    let result = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                let line = s.trim_end();
                if line.starts_with("HTTP/") {
                    headers.clear();
                }
                headers.push(line.to_string());
            }
            true
        })?;
        if discard_body {
            // A server that ignores Range would stream the whole body; stop after the first bytes.
            transfer.write_function(|data| {
                body_seen += data.len();
                if body_seen > 1 {
                    Ok(0)
                } else {
                    Ok(data.len())
                }
            })?;
        }
        transfer.perform()
    };
    match result {
        Ok(()) => Ok(headers),
        Err(e) if discard_body && e.is_write_error() => Ok(headers),
        Err(e) => Err(e),
    }
}

fn probe_head(locator: &str) -> Result<ProbeResult, ProbeError> {
    let mut easy = base_easy(locator)?;
    easy.nobody(true)?;
    let headers = collect_headers(&mut easy, false)?;
    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(ProbeError::Http {
            url: locator.to_string(),
            status: code,
        });
    }
    Ok(parse_headers(&headers))
}

fn probe_range(locator: &str) -> Result<ProbeResult, ProbeError> {
    let mut easy = base_easy(locator)?;
    easy.range("0-0")?;
    let headers = collect_headers(&mut easy, true)?;
    let code = easy.response_code()?;
    match code {
        206 => {
            let mut result = parse_headers(&headers);
            let content_range = headers.iter().find_map(|l| {
                let (name, value) = l.split_once(':')?;
                name.trim()
                    .eq_ignore_ascii_case("content-range")
                    .then(|| value.trim().to_string())
            });
            result.total_size = content_range
                .as_deref()
                .and_then(parse_content_range)
                .and_then(|(_, _, total)| total);
            result.supports_ranges = true;
            Ok(result)
        }
        200..=299 => {
            let mut result = parse_headers(&headers);
            result.supports_ranges = false;
            Ok(result)
        }
        status => Err(ProbeError::Http {
            url: locator.to_string(),
            status,
        }),
    }
}
