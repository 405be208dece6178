//! Bump arena for load-phase pixel staging.
//!
//! The arena is sized once up front, handed out in contiguous ranges during
//! decoding and released in bulk. Ranges are plain indices so the backing
//! storage can move with its owner.

use std::ops::Range;

/// Fixed-capacity byte arena with a single bump cursor.
#[derive(Clone, Debug, Default)]
pub struct PixelArena {
    bytes: Vec<u8>,
    cursor: usize,
}

impl PixelArena {
    /// Create an arena able to hold exactly `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity],
            cursor: 0,
        }
    }

    /// Total bytes the arena can hand out.
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Bytes handed out since the last reset.
    pub fn used(&self) -> usize {
        self.cursor
    }

    /// Reserve `len` bytes and return their range, or `None` when the arena is full.
    pub fn acquire(&mut self, len: usize) -> Option<Range<usize>> {
        let end = self.cursor.checked_add(len)?;
        if end > self.bytes.len() {
            return None;
        }
        let range = self.cursor..end;
        self.cursor = end;
        Some(range)
    }

    /// Mutable view of a previously acquired range.
    pub fn slice_mut(&mut self, range: Range<usize>) -> &mut [u8] {
        &mut self.bytes[range]
    }

    /// Read-only view of a previously acquired range.
    pub fn slice(&self, range: Range<usize>) -> &[u8] {
        &self.bytes[range]
    }

    /// Forget every acquisition; the storage is kept for reuse.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Drop the backing storage entirely.
    pub fn release(&mut self) {
        self.bytes = Vec::new();
        self.cursor = 0;
    }
}
