//! Bounded worker pool running chunk fetches with retry.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::control::CancelToken;
use crate::planner::{ChunkRange, ChunkState, ChunkTable};
use crate::progress::ProgressTracker;
use crate::retry::{run_with_retry, ChunkFailure, RetryPolicy};
use crate::storage::StorageWriter;

use super::chunk;
use super::error::TransferError;
use super::throttle::Throttle;

/// How often the coordinator samples in-flight bytes and the job's cancel flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

enum WorkerMsg {
    Started(usize),
    Finished(usize, ChunkState, Result<(), ChunkFailure>),
}

pub(super) struct PoolContext {
    pub locator: String,
    pub storage: StorageWriter,
    pub policy: RetryPolicy,
    pub throttle: Arc<Throttle>,
    pub workers: usize,
}

/// Fetch every pending chunk of `table` with at most `ctx.workers` in flight.
///
/// The first chunk that exhausts its retry budget (or fails fatally) stops
/// the pool: queued chunks are dropped, in-flight requests are aborted, and
/// that chunk's failure is returned. Job cancellation is forwarded to the
/// workers within one poll interval.
pub(super) fn run_chunks(
    ctx: PoolContext,
    table: &mut ChunkTable,
    tracker: &mut ProgressTracker,
    cancel: &CancelToken,
) -> Result<(), TransferError> {
    let pending = table.pending();
    if pending.is_empty() {
        return Ok(());
    }
    let num_workers = ctx.workers.max(1).min(pending.len());
    let in_flight: Arc<Vec<AtomicU64>> =
        Arc::new((0..table.len()).map(|_| AtomicU64::new(0)).collect());
    let work: Arc<Mutex<VecDeque<(usize, ChunkRange)>>> =
        Arc::new(Mutex::new(pending.into_iter().collect()));
    // Pool-local stop flag: set on first failure or when the job is cancelled.
    let stop = CancelToken::new();
    let ctx = Arc::new(ctx);
    let (tx, rx) = mpsc::channel();

    let mut handles = Vec::with_capacity(num_workers);
    for _ in 0..num_workers {
        let work = Arc::clone(&work);
        let tx = tx.clone();
        let stop = stop.clone();
        let ctx = Arc::clone(&ctx);
        let in_flight = Arc::clone(&in_flight);
        handles.push(std::thread::spawn(move || loop {
            if stop.is_cancelled() {
                break;
            }
            let next = work.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
            let Some((index, range)) = next else {
                break;
            };
            let _ = tx.send(WorkerMsg::Started(index));
            let mut state = ChunkState::new(range);
            let mut busy = Duration::ZERO;
            let result = run_with_retry(&ctx.policy, &stop, &mut state, || {
                let started = Instant::now();
                let r = chunk::fetch_chunk(&ctx.locator, &range, &ctx.storage, &in_flight[index], &stop);
                busy = started.elapsed();
                r
            });
            let paced = result.is_err() || ctx.throttle.pace(range.length, busy, &stop);
            let _ = tx.send(WorkerMsg::Finished(index, state, result));
            if !paced {
                break;
            }
        }));
    }
    drop(tx);

    let mut first_error: Option<TransferError> = None;
    loop {
        if cancel.is_cancelled() && !stop.is_cancelled() {
            tracing::debug!("job cancelled, stopping chunk workers");
            stop.cancel();
        }
        let msg = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(msg) => msg,
            Err(RecvTimeoutError::Timeout) => {
                tracker.update(bytes_so_far(table, &in_flight));
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };
        match msg {
            WorkerMsg::Started(index) => table.mark_in_flight(index),
            WorkerMsg::Finished(index, state, Ok(())) => {
                table.mark_done(index, state.attempts);
                if state.attempts > 1 {
                    tracing::debug!(chunk = index, attempts = state.attempts, "chunk recovered after retry");
                }
                tracker.update(bytes_so_far(table, &in_flight));
            }
            WorkerMsg::Finished(index, state, Err(failure)) => {
                table.mark_failed(index, state.attempts);
                if first_error.is_some() {
                    continue;
                }
                stop.cancel();
                let dropped = {
                    let mut q = work.lock().unwrap_or_else(|e| e.into_inner());
                    let n = q.len();
                    q.clear();
                    n
                };
                if failure.is_cancelled() {
                    first_error = Some(TransferError::Cancelled);
                } else {
                    tracing::warn!(
                        chunk = index,
                        attempts = state.attempts,
                        dropped,
                        done = table.done_count(),
                        error = %failure,
                        "chunk failed, aborting transfer"
                    );
                    first_error = Some(TransferError::ChunkFailed {
                        index,
                        range: state.range,
                        failure,
                    });
                }
            }
        }
    }

    for h in handles {
        if h.join().is_err() && first_error.is_none() {
            first_error = Some(TransferError::WorkerPanicked);
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }
    if cancel.is_cancelled() || !table.all_done() {
        return Err(TransferError::Cancelled);
    }
    tracker.update(table.bytes_done());
    Ok(())
}

/// Completed chunk bytes plus bytes received so far by chunks still in flight.
fn bytes_so_far(table: &ChunkTable, in_flight: &[AtomicU64]) -> u64 {
    let partial: u64 = (0..table.len())
        .filter(|i| {
            table
                .get(*i)
                .map(|c| c.status == crate::planner::ChunkStatus::InFlight)
                .unwrap_or(false)
        })
        .map(|i| in_flight[i].load(Ordering::Relaxed))
        .sum();
    table.bytes_done() + partial
}
