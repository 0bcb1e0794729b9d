//! One ranged GET written into the shared `.part` file.

use std::cell::{Cell, RefCell};
use std::str;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::control::CancelToken;
use crate::planner::ChunkRange;
use crate::retry::ChunkError;
use crate::storage::StorageWriter;

/// Shape of a transfer request, which decides whether it gets a hard deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RequestKind {
    /// A bounded byte range, either a ranged GET or a chunk PUT.
    Ranged,
    /// The whole resource in one response; its length can be unbounded.
    Stream,
}

impl RequestKind {
    fn deadline(self) -> Option<Duration> {
        match self {
            RequestKind::Ranged => Some(Duration::from_secs(3600)),
            RequestKind::Stream => None,
        }
    }
}

/// Easy handle with the timeouts shared by every transfer request.
pub(super) fn transfer_easy(
    locator: &str,
    kind: RequestKind,
) -> Result<curl::easy::Easy, curl::Error> {
    let mut easy = curl::easy::Easy::new();
    easy.url(locator)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(Duration::from_secs(30))?;
    // Stalls are caught by the low-speed limit: under 1 KiB/s for 60s.
    easy.low_speed_limit(1024)?;
    easy.low_speed_time(Duration::from_secs(60))?;
    if let Some(deadline) = kind.deadline() {
        easy.timeout(deadline)?;
    }
    Ok(easy)
}

/// Status code of an HTTP status line ("HTTP/1.1 206 Partial Content").
pub(super) fn status_code(line: &str) -> Option<u32> {
    if !line.starts_with("HTTP/") {
        return None;
    }
    line.split_whitespace().nth(1)?.parse().ok()
}

/// Fetch `range` of `locator` and write it at its offset in `storage`.
///
/// `received` is reset to 0 and then counts bytes written by this attempt, so
/// the caller can report in-flight progress. Anything other than a 206 with
/// exactly `range.length` bytes is an error; `stop` aborts the request.
pub(super) fn fetch_chunk(
    locator: &str,
    range: &ChunkRange,
    storage: &StorageWriter,
    received: &AtomicU64,
    stop: &CancelToken,
) -> Result<(), ChunkError> {
    received.store(0, Ordering::Relaxed);
    let mut easy = transfer_easy(locator, RequestKind::Ranged).map_err(ChunkError::Curl)?;
    let mut headers = curl::easy::List::new();
    headers
        .append(&format!("Range: {}", range.range_header_value()))
        .map_err(ChunkError::Curl)?;
    easy.http_headers(headers).map_err(ChunkError::Curl)?;
    easy.progress(true).map_err(ChunkError::Curl)?;

    let status: Cell<Option<u32>> = Cell::new(None);
    let storage_error: RefCell<Option<std::io::Error>> = RefCell::new(None);
    let overflow: Cell<Option<u64>> = Cell::new(None);

    let performed = {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Ok(line) = str::from_utf8(data) {
                    if let Some(code) = status_code(line) {
                        status.set(Some(code));
                    }
                }
                true
            })
            .map_err(ChunkError::Curl)?;
        transfer
            .write_function(|data| {
                // A server that ignored the Range header would overwrite other chunks.
                if status.get() != Some(206) {
                    return Ok(0);
                }
                let done = received.load(Ordering::Relaxed);
                let offered = done + data.len() as u64;
                if offered > range.length {
                    overflow.set(Some(offered));
                    return Ok(0);
                }
                match storage.write_at(range.offset + done, data) {
                    Ok(()) => {
                        received.fetch_add(data.len() as u64, Ordering::Relaxed);
                        Ok(data.len())
                    }
                    Err(e) => {
                        storage_error.replace(Some(e));
                        Ok(0)
                    }
                }
            })
            .map_err(ChunkError::Curl)?;
        transfer
            .progress_function(|_, _, _, _| !stop.is_cancelled())
            .map_err(ChunkError::Curl)?;
        transfer.perform()
    };

    let got = received.load(Ordering::Relaxed);
    if let Err(e) = performed {
        if e.is_aborted_by_callback() && stop.is_cancelled() {
            return Err(ChunkError::Cancelled);
        }
        if e.is_write_error() {
            if let Some(io_err) = storage_error.take() {
                return Err(ChunkError::Storage(io_err));
            }
            if let Some(offered) = overflow.get() {
                return Err(ChunkError::PartialTransfer {
                    expected: range.length,
                    received: offered,
                });
            }
            if let Some(code) = status.get().filter(|c| *c != 206) {
                return Err(ChunkError::Http(code));
            }
        }
        return Err(ChunkError::Curl(e));
    }

    let code = easy.response_code().map_err(ChunkError::Curl)?;
    if code != 206 {
        return Err(ChunkError::Http(code));
    }
    if got != range.length {
        return Err(ChunkError::PartialTransfer {
            expected: range.length,
            received: got,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_lines() {
        assert_eq!(status_code("HTTP/1.1 206 Partial Content\r\n"), Some(206));
        assert_eq!(status_code("HTTP/2 200\r\n"), Some(200));
        assert_eq!(status_code("Content-Length: 10\r\n"), None);
        assert_eq!(status_code("HTTP/1.1 abc"), None);
    }

    #[test]
    fn only_ranged_requests_have_a_deadline() {
        assert_eq!(RequestKind::Ranged.deadline(), Some(Duration::from_secs(3600)));
        assert_eq!(RequestKind::Stream.deadline(), None);
    }
}
