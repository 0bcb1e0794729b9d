//! Chunk planning for ranged transfers.
//!
//! Splits a transfer of known size into fixed-size byte ranges and tracks the
//! retry state of each range while the transfer runs.

mod range;
mod table;

pub use range::{plan, ChunkRange, PlanError};
pub use table::{ChunkState, ChunkStatus, ChunkTable};
