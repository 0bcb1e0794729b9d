use std::time::Duration;

/// Retry classification of a chunk failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Timeout, connection reset, partial payload.
    Transient,
    /// Non-success HTTP status.
    Protocol,
    /// Storage failure or a request that can never succeed. Not retried.
    Fatal,
    /// Job cancelled. Not retried.
    Cancelled,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::Transient | ErrorClass::Protocol)
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry; escalate the failure.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Fixed-backoff retry policy with a per-chunk failure budget.
///
/// A chunk may fail up to `retry_budget` times and still succeed; the
/// `retry_budget + 1`-th failure escalates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_budget: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_budget: 5,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Decide what to do after the `failures`-th failure (1-based) of a chunk.
    pub fn decide(&self, failures: u32, class: ErrorClass) -> RetryDecision {
        if !class.is_retryable() || failures > self.retry_budget {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.backoff)
    }
}
