//! Retry loop: run one chunk attempt until success or the policy says stop.

use super::classify;
use super::error::{ChunkError, ChunkFailure};
use super::policy::{RetryDecision, RetryPolicy};
use crate::control::CancelToken;
use crate::planner::{ChunkState, ChunkStatus};

/// Runs `attempt` for `state` until it succeeds or the policy escalates.
///
/// `state.attempts` counts every attempt made; `state.status` ends `Done` or
/// `Failed`. Backoff sleeps wake early on cancellation.
pub fn run_with_retry<F>(
    policy: &RetryPolicy,
    cancel: &CancelToken,
    state: &mut ChunkState,
    mut attempt: F,
) -> Result<(), ChunkFailure>
where
    F: FnMut() -> Result<(), ChunkError>,
{
    let mut failures = 0u32;
    loop {
        if cancel.is_cancelled() {
            state.status = ChunkStatus::Failed;
            return Err(ChunkFailure {
                error: ChunkError::Cancelled,
                attempts: state.attempts,
                budget_exhausted: false,
            });
        }
        state.status = ChunkStatus::InFlight;
        state.attempts += 1;
        let error = match attempt() {
            Ok(()) => {
                state.status = ChunkStatus::Done;
                return Ok(());
            }
            Err(e) => e,
        };
        failures += 1;
        let class = classify::classify(&error);
        match policy.decide(failures, class) {
            RetryDecision::NoRetry => {
                state.status = ChunkStatus::Failed;
                return Err(ChunkFailure {
                    error,
                    attempts: state.attempts,
                    budget_exhausted: class.is_retryable(),
                });
            }
            RetryDecision::RetryAfter(delay) => {
                tracing::debug!(
                    offset = state.range.offset,
                    attempt = state.attempts,
                    error = %error,
                    "chunk attempt failed, retrying"
                );
                state.status = ChunkStatus::Pending;
                if !cancel.sleep(delay) {
                    state.status = ChunkStatus::Failed;
                    return Err(ChunkFailure {
                        error: ChunkError::Cancelled,
                        attempts: state.attempts,
                        budget_exhausted: false,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::ChunkRange;
    use std::time::Duration;

    fn fast_policy(budget: u32) -> RetryPolicy {
        RetryPolicy {
            retry_budget: budget,
            backoff: Duration::from_millis(1),
        }
    }

    fn state() -> ChunkState {
        ChunkState::new(ChunkRange {
            offset: 0,
            length: 10,
        })
    }

    fn failing_n_times(n: u32) -> impl FnMut() -> Result<(), ChunkError> {
        let mut calls = 0u32;
        move || {
            calls += 1;
            if calls <= n {
                Err(ChunkError::Http(503))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn succeeds_when_failures_within_budget() {
        let mut s = state();
        run_with_retry(&fast_policy(5), &CancelToken::new(), &mut s, failing_n_times(2)).unwrap();
        assert_eq!(s.attempts, 3);
        assert_eq!(s.status, ChunkStatus::Done);
    }

    #[test]
    fn succeeds_at_exact_budget() {
        let mut s = state();
        run_with_retry(&fast_policy(5), &CancelToken::new(), &mut s, failing_n_times(5)).unwrap();
        assert_eq!(s.attempts, 6);
    }

    #[test]
    fn fails_when_failures_exceed_budget() {
        let mut s = state();
        let err = run_with_retry(&fast_policy(5), &CancelToken::new(), &mut s, failing_n_times(6))
            .unwrap_err();
        assert!(err.budget_exhausted);
        assert_eq!(err.attempts, 6);
        assert_eq!(s.status, ChunkStatus::Failed);
        assert!(err.to_string().contains("retry budget exhausted"));
        assert!(matches!(err.error, ChunkError::Http(503)));
    }

    #[test]
    fn fatal_error_escalates_without_retry() {
        let mut s = state();
        let err = run_with_retry(&fast_policy(5), &CancelToken::new(), &mut s, || {
            Err(ChunkError::Storage(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        })
        .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert!(!err.budget_exhausted);
    }

    #[test]
    fn cancelled_token_stops_before_attempt() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut s = state();
        let err = run_with_retry(&fast_policy(5), &cancel, &mut s, || Ok(())).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(s.attempts, 0);
    }
}
