//! Chunk boundary arithmetic.
//!
//! Offsets are zero-based and ranges half-open: a plan `{start, len}` covers
//! `[start, start + len)`. The inclusive end offset only appears when the plan
//! is rendered as a `Content-Range` header.

use driveup_protocol::ContentRange;

use crate::TransferError;
use crate::validation::validate_chunk_size;

/// The next byte range to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Zero-based offset of the first byte.
    pub start: u64,
    /// Number of bytes in the chunk.
    pub len: u64,
}

impl ChunkPlan {
    /// Offset one past the last byte of this chunk.
    pub fn end(&self) -> u64 {
        self.start + self.len
    }

    /// Framing header for this chunk within an object of `total` bytes.
    pub fn content_range(&self, total: u64) -> ContentRange {
        ContentRange::for_chunk(self.start, self.len, total)
    }
}

/// Splits an object of `total_size` bytes into chunks of `chunk_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlanner {
    total_size: u64,
    chunk_size: u64,
}

impl ChunkPlanner {
    /// Creates a planner for any positive chunk size.
    pub fn new(total_size: u64, chunk_size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::InvalidChunkSize {
                chunk_size,
                granularity: 1,
            });
        }
        Ok(Self {
            total_size,
            chunk_size,
        })
    }

    /// Creates a planner whose chunk size must be a multiple of `granularity`.
    pub fn aligned(total_size: u64, chunk_size: u64, granularity: u64) -> Result<Self, TransferError> {
        validate_chunk_size(chunk_size, granularity)?;
        Self::new(total_size, chunk_size)
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Returns the chunk starting at `offset`, or `None` once every byte has
    /// been planned.
    ///
    /// A zero-length object still yields one empty chunk at offset 0: the
    /// upload is finalized by a single request with no body.
    pub fn plan_at(&self, offset: u64) -> Result<Option<ChunkPlan>, TransferError> {
        if offset > self.total_size {
            return Err(TransferError::OffsetOutOfRange {
                offset,
                total: self.total_size,
            });
        }
        if self.total_size == 0 {
            return Ok(Some(ChunkPlan { start: 0, len: 0 }));
        }
        let remaining = self.total_size - offset;
        if remaining == 0 {
            return Ok(None);
        }
        Ok(Some(ChunkPlan {
            start: offset,
            len: remaining.min(self.chunk_size),
        }))
    }

    /// Returns `true` when `plan` carries the last byte of the object.
    pub fn is_final(&self, plan: &ChunkPlan) -> bool {
        plan.end() == self.total_size
    }

    /// Iterates over every chunk from `offset` to the end of the object.
    pub fn chunks_from(&self, offset: u64) -> Result<Chunks, TransferError> {
        let first = self.plan_at(offset)?;
        Ok(Chunks {
            planner: *self,
            next: first,
        })
    }
}

/// Iterator returned by [`ChunkPlanner::chunks_from`].
#[derive(Debug, Clone)]
pub struct Chunks {
    planner: ChunkPlanner,
    next: Option<ChunkPlan>,
}

impl Iterator for Chunks {
    type Item = ChunkPlan;

    fn next(&mut self) -> Option<ChunkPlan> {
        let current = self.next.take()?;
        if !self.planner.is_final(&current) {
            // `current.end()` is strictly below the total here, so planning
            // cannot fail.
            self.next = self.planner.plan_at(current.end()).ok().flatten();
        }
        Some(current)
    }
}
