//! Per-chunk retry state for a running transfer.

use super::ChunkRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Pending,
    InFlight,
    Done,
    Failed,
}

/// State of one chunk: its range, attempts made so far, and current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkState {
    pub range: ChunkRange,
    pub attempts: u32,
    pub status: ChunkStatus,
}

impl ChunkState {
    pub fn new(range: ChunkRange) -> Self {
        Self {
            range,
            attempts: 0,
            status: ChunkStatus::Pending,
        }
    }
}

/// Chunk states for one transfer, indexed by chunk number.
#[derive(Debug, Clone)]
pub struct ChunkTable {
    chunks: Vec<ChunkState>,
}

impl ChunkTable {
    pub fn new(ranges: &[ChunkRange]) -> Self {
        Self {
            chunks: ranges.iter().copied().map(ChunkState::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ChunkState> {
        self.chunks.get(index)
    }

    /// Chunks still waiting to be scheduled, in offset order.
    pub fn pending(&self) -> Vec<(usize, ChunkRange)> {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.status == ChunkStatus::Pending)
            .map(|(i, c)| (i, c.range))
            .collect()
    }

    pub fn mark_in_flight(&mut self, index: usize) {
        if let Some(c) = self.chunks.get_mut(index) {
            c.status = ChunkStatus::InFlight;
        }
    }

    pub fn mark_done(&mut self, index: usize, attempts: u32) {
        if let Some(c) = self.chunks.get_mut(index) {
            c.status = ChunkStatus::Done;
            c.attempts = attempts;
        }
    }

    pub fn mark_failed(&mut self, index: usize, attempts: u32) {
        if let Some(c) = self.chunks.get_mut(index) {
            c.status = ChunkStatus::Failed;
            c.attempts = attempts;
        }
    }

    pub fn all_done(&self) -> bool {
        self.chunks.iter().all(|c| c.status == ChunkStatus::Done)
    }

    pub fn done_count(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Done)
            .count()
    }

    /// Sum of the lengths of all completed chunks.
    pub fn bytes_done(&self) -> u64 {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Done)
            .map(|c| c.range.length)
            .sum()
    }
}
