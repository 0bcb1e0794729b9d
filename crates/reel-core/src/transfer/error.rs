use crate::planner::{ChunkRange, PlanError};
use crate::probe::ProbeError;
use crate::retry::ChunkFailure;

/// Failure of a whole download or upload.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error("source is {size} bytes, over the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("chunk {index} (bytes {}-{}) failed: {failure}", range.offset, range.end_inclusive())]
    ChunkFailed {
        index: usize,
        range: ChunkRange,
        #[source]
        failure: ChunkFailure,
    },
    #[error("stream transfer failed: {0}")]
    StreamFailed(#[source] ChunkFailure),
    #[error("preparing download file: {0:#}")]
    Prepare(anyhow::Error),
    #[error("storage: {context}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("transfer cancelled")]
    Cancelled,
    #[error("transfer worker panicked")]
    WorkerPanicked,
}

impl TransferError {
    pub(crate) fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        TransferError::Storage {
            context: context.into(),
            source,
        }
    }

    /// True when the failure came from an exhausted per-chunk retry budget.
    pub fn is_retry_exhausted(&self) -> bool {
        match self {
            TransferError::ChunkFailed { failure, .. } | TransferError::StreamFailed(failure) => {
                failure.budget_exhausted
            }
            _ => false,
        }
    }
}
