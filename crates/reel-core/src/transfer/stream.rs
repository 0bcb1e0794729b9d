//! Single-GET fallback for sources without range support or a known size.
//!
//! The whole body is one retry unit: a failed attempt truncates the `.part`
//! file and starts again from byte 0.

use std::cell::Cell;
use std::str;
use std::time::Instant;

use crate::control::CancelToken;
use crate::planner::{ChunkRange, ChunkState};
use crate::progress::ProgressTracker;
use crate::retry::{run_with_retry, ChunkError, RetryPolicy};
use crate::storage::StorageWriter;

use super::chunk::{status_code, transfer_easy, RequestKind};
use super::error::TransferError;
use super::throttle::Throttle;

pub(super) struct StreamContext<'a> {
    pub locator: &'a str,
    pub storage: &'a StorageWriter,
    pub policy: &'a RetryPolicy,
    pub throttle: &'a Throttle,
    /// Throttle and progress granularity.
    pub pace_every: u64,
    pub max_bytes: Option<u64>,
}

/// Stream the body into `ctx.storage`; returns `(bytes, attempts)`.
pub(super) fn fetch_stream(
    ctx: &StreamContext<'_>,
    tracker: &mut ProgressTracker,
    cancel: &CancelToken,
) -> Result<(u64, u32), TransferError> {
    let mut state = ChunkState::new(ChunkRange {
        offset: 0,
        length: 0,
    });
    let over_limit: Cell<Option<u64>> = Cell::new(None);
    let mut total = 0u64;
    let result = run_with_retry(ctx.policy, cancel, &mut state, || {
        ctx.storage.reset().map_err(ChunkError::Storage)?;
        total = stream_once(ctx, tracker, cancel, &over_limit)?;
        Ok(())
    });
    if let Some(size) = over_limit.get() {
        return Err(TransferError::TooLarge {
            size,
            limit: ctx.max_bytes.unwrap_or_default(),
        });
    }
    match result {
        Ok(()) => Ok((total, state.attempts)),
        Err(f) if f.is_cancelled() => Err(TransferError::Cancelled),
        Err(f) => Err(TransferError::StreamFailed(f)),
    }
}

fn stream_once(
    ctx: &StreamContext<'_>,
    tracker: &mut ProgressTracker,
    cancel: &CancelToken,
    over_limit: &Cell<Option<u64>>,
) -> Result<u64, ChunkError> {
    let mut easy = transfer_easy(ctx.locator, RequestKind::Stream).map_err(ChunkError::Curl)?;
    easy.progress(true).map_err(ChunkError::Curl)?;

    let status: Cell<Option<u32>> = Cell::new(None);
    let mut storage_error: Option<std::io::Error> = None;
    let mut written = 0u64;
    let mut since_pace = 0u64;
    let mut window_start = Instant::now();
    let mut paced_out = false;

    let performed = {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                let Ok(line) = str::from_utf8(data) else {
                    return true;
                };
                if let Some(code) = status_code(line) {
                    status.set(Some(code));
                    return true;
                }
                if let (Some(limit), Some((name, value))) = (ctx.max_bytes, line.split_once(':')) {
                    if name.trim().eq_ignore_ascii_case("content-length") {
                        if let Ok(len) = value.trim().parse::<u64>() {
                            if len > limit && matches!(status.get(), Some(200..=299)) {
                                over_limit.set(Some(len));
                                return false;
                            }
                        }
                    }
                }
                true
            })
            .map_err(ChunkError::Curl)?;
        transfer
            .write_function(|data| {
                if !matches!(status.get(), Some(200..=299)) {
                    return Ok(0);
                }
                let len = data.len() as u64;
                if let Some(limit) = ctx.max_bytes {
                    if written + len > limit {
                        over_limit.set(Some(written + len));
                        return Ok(0);
                    }
                }
                if let Err(e) = ctx.storage.write_at(written, data) {
                    storage_error = Some(e);
                    return Ok(0);
                }
                written += len;
                since_pace += len;
                if since_pace >= ctx.pace_every {
                    let busy = window_start.elapsed();
                    if !ctx.throttle.pace(since_pace, busy, cancel) {
                        paced_out = true;
                        return Ok(0);
                    }
                    since_pace = 0;
                    window_start = Instant::now();
                }
                tracker.update(written);
                Ok(data.len())
            })
            .map_err(ChunkError::Curl)?;
        transfer
            .progress_function(|_, _, _, _| !cancel.is_cancelled())
            .map_err(ChunkError::Curl)?;
        transfer.perform()
    };

    if let Err(e) = performed {
        if over_limit.get().is_some() || paced_out || cancel.is_cancelled() {
            // Not a network fault; stop the retry loop.
            return Err(ChunkError::Cancelled);
        }
        if e.is_write_error() {
            if let Some(io_err) = storage_error {
                return Err(ChunkError::Storage(io_err));
            }
            if let Some(code) = status.get().filter(|c| !(200..300).contains(c)) {
                return Err(ChunkError::Http(code));
            }
        }
        return Err(ChunkError::Curl(e));
    }

    let code = easy.response_code().map_err(ChunkError::Curl)?;
    if !(200..300).contains(&code) {
        return Err(ChunkError::Http(code));
    }
    if let Ok(expected) = easy.content_length_download() {
        if expected >= 0.0 && (expected as u64) != written {
            return Err(ChunkError::PartialTransfer {
                expected: expected as u64,
                received: written,
            });
        }
    }
    Ok(written)
}
