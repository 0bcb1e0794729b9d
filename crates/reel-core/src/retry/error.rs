//! Chunk transfer error types used for retry classification.

use std::fmt;

/// Error from a single attempt at transferring one chunk.
#[derive(Debug)]
pub enum ChunkError {
    /// Curl reported an error (timeout, connection, etc.).
    Curl(curl::Error),
    /// HTTP response had an unexpected status.
    Http(u32),
    /// Fewer bytes than the chunk length arrived (server closed early).
    PartialTransfer { expected: u64, received: u64 },
    /// Disk/storage I/O failed (disk full, permission denied). Not retried.
    Storage(std::io::Error),
    /// The job was cancelled while this chunk was in flight.
    Cancelled,
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkError::Curl(e) => write!(f, "{}", e),
            ChunkError::Http(code) => write!(f, "HTTP {}", code),
            ChunkError::PartialTransfer { expected, received } => {
                write!(f, "partial transfer: expected {} bytes, got {}", expected, received)
            }
            ChunkError::Storage(e) => write!(f, "storage: {}", e),
            ChunkError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for ChunkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChunkError::Curl(e) => Some(e),
            ChunkError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

/// Final failure of a chunk after the retry loop gave up.
#[derive(Debug)]
pub struct ChunkFailure {
    /// Error from the last attempt, unchanged.
    pub error: ChunkError,
    /// Attempts made, including the first.
    pub attempts: u32,
    /// True when the chunk stopped because its retry budget ran out.
    pub budget_exhausted: bool,
}

impl ChunkFailure {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, ChunkError::Cancelled)
    }
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.budget_exhausted {
            write!(
                f,
                "retry budget exhausted after {} attempts: {}",
                self.attempts, self.error
            )
        } else {
            write!(f, "{} (attempt {}, not retried)", self.error, self.attempts)
        }
    }
}

impl std::error::Error for ChunkFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
