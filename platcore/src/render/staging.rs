use std::ops::Range;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StagingError {
    #[error("staging buffer overflow: {requested} bytes requested, {available} available")]
    Overflow { requested: u64, available: u64 },
    #[error("alignment {0} is not a power of two")]
    BadAlignment(u64),
}

/// Write and read cursors over a fixed-capacity GPU buffer.
///
/// The CPU reserves byte ranges by advancing the write cursor. Recording a
/// copy out of the buffer consumes everything between the read and the write
/// cursor. Both cursors return to zero once the frame using the buffer has
/// been presented.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferCursor {
    capacity: u64,
    write: u64,
    read: u64,
}

impl BufferCursor {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            write: 0,
            read: 0,
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes reserved since the last reset.
    pub fn written(&self) -> u64 {
        self.write
    }

    pub fn remaining(&self) -> u64 {
        self.capacity - self.write
    }

    /// Reserve `size` bytes starting at the next multiple of `align`.
    pub fn reserve(&mut self, size: u64, align: u64) -> Result<Range<u64>, StagingError> {
        if !align.is_power_of_two() {
            return Err(StagingError::BadAlignment(align));
        }
        let start = (self.write + align - 1) & !(align - 1);
        let end = start.checked_add(size).filter(|&end| end <= self.capacity);
        match end {
            Some(end) => {
                self.write = end;
                Ok(start..end)
            }
            None => Err(StagingError::Overflow {
                requested: size,
                available: self.capacity.saturating_sub(start),
            }),
        }
    }

    /// Bytes written but not yet copied out.
    pub fn pending(&self) -> Range<u64> {
        self.read..self.write
    }

    /// Mark everything pending as copied and return it.
    pub fn consume(&mut self) -> Range<u64> {
        let range = self.pending();
        self.read = self.write;
        range
    }

    pub fn reset(&mut self) {
        self.write = 0;
        self.read = 0;
    }
}

/// Round `value` up to a multiple of `align` (a power of two).
pub fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservations_respect_alignment() {
        let mut cursor = BufferCursor::new(1024);
        assert_eq!(cursor.reserve(10, 4).unwrap(), 0..10);
        assert_eq!(cursor.reserve(8, 256).unwrap(), 256..264);
        assert_eq!(cursor.written(), 264);
        assert_eq!(cursor.remaining(), 760);
    }

    #[test]
    fn overflow_leaves_cursor_untouched() {
        let mut cursor = BufferCursor::new(64);
        cursor.reserve(60, 4).unwrap();
        assert_eq!(
            cursor.reserve(8, 4),
            Err(StagingError::Overflow {
                requested: 8,
                available: 4
            })
        );
        assert_eq!(cursor.written(), 60);
        assert_eq!(cursor.reserve(4, 4).unwrap(), 60..64);
    }

    #[test]
    fn consume_tracks_read_cursor_until_reset() {
        let mut cursor = BufferCursor::new(128);
        cursor.reserve(32, 4).unwrap();
        assert_eq!(cursor.consume(), 0..32);
        assert!(cursor.pending().is_empty());

        cursor.reserve(16, 4).unwrap();
        assert_eq!(cursor.pending(), 32..48);

        cursor.reset();
        assert_eq!(cursor.pending(), 0..0);
        assert_eq!(cursor.reserve(4, 4).unwrap(), 0..4);
    }

    #[test]
    fn rejects_non_power_of_two_alignment() {
        let mut cursor = BufferCursor::new(16);
        assert_eq!(cursor.reserve(4, 3), Err(StagingError::BadAlignment(3)));
    }

    #[test]
    fn align_up_rounds_to_multiple() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(512, 256), 512);
    }
}
