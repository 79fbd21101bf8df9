//! Local side of a resumable upload: chunk boundaries, exact-length chunk
//! reads, progress tracking and on-disk checkpoints for resume.

mod checkpoint;
mod chunked;
mod plan;
mod progress;
mod types;
mod validation;

pub use checkpoint::{Checkpoint, CheckpointStore, default_checkpoint_dir, source_modified};
pub use chunked::{ChunkReader, fill_buffer};
pub use plan::{ChunkPlan, ChunkPlanner, Chunks};
pub use progress::ThroughputMeter;
pub use types::{UploadSession, UploadTracker};
pub use validation::{source_size, validate_chunk_size};

/// Default chunk size: 8 MiB (32 × the 256 KiB protocol granularity).
///
/// Larger chunks mean fewer round trips; every chunk is held in memory once
/// while it is on the wire.
pub const DEFAULT_CHUNK_SIZE: u64 = 32 * driveup_protocol::constants::CHUNK_GRANULARITY;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("short read at offset {offset}: expected {expected} bytes, got {read}")]
    ShortRead { offset: u64, expected: u64, read: u64 },

    #[error("source changed size during upload: expected {expected} bytes, found {actual}")]
    SourceChanged { expected: u64, actual: u64 },

    #[error("chunk size {chunk_size} is not a positive multiple of {granularity}")]
    InvalidChunkSize { chunk_size: u64, granularity: u64 },

    #[error("offset {offset} is beyond the object size {total}")]
    OffsetOutOfRange { offset: u64, total: u64 },

    #[error("not a regular file: {0}")]
    NotAFile(String),
}
