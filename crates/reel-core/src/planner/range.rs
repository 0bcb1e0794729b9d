//! Chunk range type and the planner.

/// A contiguous byte range `[offset, offset + length)` fetched or sent as one retryable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub offset: u64,
    pub length: u64,
}

impl ChunkRange {
    /// Last byte covered by this range (inclusive). Ranges are never empty.
    pub fn end_inclusive(&self) -> u64 {
        self.offset + self.length.saturating_sub(1)
    }

    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// HTTP Range header value (inclusive end): `bytes=offset-end`.
    pub fn range_header_value(&self) -> String {
        format!("bytes={}-{}", self.offset, self.end_inclusive())
    }

    /// `Content-Range` value for an upload of this range out of `total` bytes.
    pub fn content_range_value(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.offset, self.end_inclusive(), total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("invalid transfer size: 0 bytes")]
    InvalidSize,
    #[error("invalid chunk size: 0 bytes")]
    InvalidChunkSize,
}

/// Builds the chunk plan for `total_size` bytes.
///
/// Range `i` starts at `i * chunk_size` and ends at
/// `min((i + 1) * chunk_size - 1, total_size - 1)`. The ranges are contiguous,
/// disjoint, and cover `[0, total_size)` exactly.
pub fn plan(total_size: u64, chunk_size: u64) -> Result<Vec<ChunkRange>, PlanError> {
    if total_size == 0 {
        return Err(PlanError::InvalidSize);
    }
    if chunk_size == 0 {
        return Err(PlanError::InvalidChunkSize);
    }

    let count = total_size.div_ceil(chunk_size);
    let mut out = Vec::with_capacity(count as usize);
    let mut offset = 0u64;
    while offset < total_size {
        let length = chunk_size.min(total_size - offset);
        out.push(ChunkRange { offset, length });
        offset += length;
    }
    Ok(out)
}
