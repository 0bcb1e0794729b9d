//! Per-chunk retry policy.
//!
//! Failures are classified as transient (timeouts, resets, short payloads),
//! protocol (non-success status), or fatal (storage, malformed requests).
//! Transient and protocol failures share one per-chunk attempt budget; fatal
//! failures and cancellation escalate immediately.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::{ChunkError, ChunkFailure};
pub use policy::{ErrorClass, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
