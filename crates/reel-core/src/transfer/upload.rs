//! Chunked upload of a finished artifact with sequential ranged PUTs.
//!
//! Each chunk is sent as `PUT` with `Content-Range: bytes a-b/total`. A 2xx
//! or a 308 (resumable-upload "continue") acknowledges the chunk. Chunks go
//! out in offset order; each one has its own retry budget.

use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::control::CancelToken;
use crate::planner::{plan, ChunkRange, ChunkState, ChunkTable};
use crate::progress::{Phase, ProgressReporter, ProgressTracker};
use crate::retry::{run_with_retry, ChunkError, RetryPolicy};
use crate::storage::ChunkReader;

use super::chunk::{transfer_easy, RequestKind};
use super::error::TransferError;
use super::throttle::Throttle;

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub source_path: PathBuf,
    pub destination: String,
    pub chunk_size: u64,
    pub retry: RetryPolicy,
    pub bandwidth_cap: Option<u64>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub bytes: u64,
    pub chunks: usize,
    /// Total PUT requests made, retries included.
    pub attempts: u32,
}

/// Upload `req.source_path` to `req.destination`. Blocking.
pub fn upload(
    req: &UploadRequest,
    reporter: Arc<dyn ProgressReporter>,
    cancel: &CancelToken,
) -> Result<UploadReport, TransferError> {
    let reader = ChunkReader::open(&req.source_path)
        .map_err(|e| TransferError::storage(format!("open {}", req.source_path.display()), e))?;
    let total = reader.len();
    let mut tracker = ProgressTracker::new(Phase::Uploading, Some(total), reporter);
    let throttle = Throttle::new(req.bandwidth_cap, 1);
    let content_type = req.content_type.as_deref();

    if total == 0 {
        let mut state = ChunkState::new(ChunkRange {
            offset: 0,
            length: 0,
        });
        run_with_retry(&req.retry, cancel, &mut state, || {
            put_chunk(&req.destination, &[], "bytes */0", content_type, cancel)
        })
        .map_err(|failure| chunk_failure(0, state.range, failure))?;
        tracker.finish(0);
        return Ok(UploadReport {
            bytes: 0,
            chunks: 1,
            attempts: state.attempts,
        });
    }

    let ranges = plan(total, req.chunk_size)?;
    let mut table = ChunkTable::new(&ranges);
    let mut attempts = 0u32;
    tracing::debug!(total, chunks = ranges.len(), destination = %req.destination, "starting upload");

    for (index, range) in ranges.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let data = reader
            .read_chunk(range)
            .map_err(|e| TransferError::storage(format!("read chunk {}", index), e))?;
        let content_range = range.content_range_value(total);
        let mut state = ChunkState::new(*range);
        let mut busy = std::time::Duration::ZERO;
        table.mark_in_flight(index);
        let result = run_with_retry(&req.retry, cancel, &mut state, || {
            let started = Instant::now();
            let r = put_chunk(&req.destination, &data, &content_range, content_type, cancel);
            busy = started.elapsed();
            r
        });
        attempts += state.attempts;
        if let Err(failure) = result {
            table.mark_failed(index, state.attempts);
            return Err(chunk_failure(index, *range, failure));
        }
        table.mark_done(index, state.attempts);
        tracker.update(table.bytes_done());
        if !throttle.pace(range.length, busy, cancel) {
            return Err(TransferError::Cancelled);
        }
    }

    tracker.finish(total);
    Ok(UploadReport {
        bytes: total,
        chunks: table.len(),
        attempts,
    })
}

fn chunk_failure(index: usize, range: ChunkRange, failure: crate::retry::ChunkFailure) -> TransferError {
    if failure.is_cancelled() {
        return TransferError::Cancelled;
    }
    tracing::warn!(chunk = index, attempts = failure.attempts, error = %failure, "upload chunk failed");
    TransferError::ChunkFailed {
        index,
        range,
        failure,
    }
}

/// Acknowledged upload statuses: any 2xx, or 308 from resumable endpoints.
pub(crate) fn is_upload_ack(code: u32) -> bool {
    (200..300).contains(&code) || code == 308
}

fn put_chunk(
    destination: &str,
    data: &[u8],
    content_range: &str,
    content_type: Option<&str>,
    cancel: &CancelToken,
) -> Result<(), ChunkError> {
    let mut easy = transfer_easy(destination, RequestKind::Ranged).map_err(ChunkError::Curl)?;
    easy.upload(true).map_err(ChunkError::Curl)?;
    easy.in_filesize(data.len() as u64).map_err(ChunkError::Curl)?;
    easy.progress(true).map_err(ChunkError::Curl)?;

    let mut headers = curl::easy::List::new();
    headers
        .append(&format!("Content-Range: {}", content_range))
        .map_err(ChunkError::Curl)?;
    // Send the body immediately instead of waiting on 100-continue.
    headers.append("Expect:").map_err(ChunkError::Curl)?;
    if let Some(ct) = content_type {
        headers
            .append(&format!("Content-Type: {}", ct))
            .map_err(ChunkError::Curl)?;
    }
    easy.http_headers(headers).map_err(ChunkError::Curl)?;

    let mut body = Cursor::new(data);
    let performed = {
        let mut transfer = easy.transfer();
        transfer
            .read_function(|buf| Ok(body.read(buf).unwrap_or(0)))
            .map_err(ChunkError::Curl)?;
        transfer
            .write_function(|resp| Ok(resp.len()))
            .map_err(ChunkError::Curl)?;
        transfer
            .progress_function(|_, _, _, _| !cancel.is_cancelled())
            .map_err(ChunkError::Curl)?;
        transfer.perform()
    };
    if let Err(e) = performed {
        if e.is_aborted_by_callback() && cancel.is_cancelled() {
            return Err(ChunkError::Cancelled);
        }
        return Err(ChunkError::Curl(e));
    }

    let code = easy.response_code().map_err(ChunkError::Curl)?;
    if !is_upload_ack(code) {
        return Err(ChunkError::Http(code));
    }
    Ok(())
}
