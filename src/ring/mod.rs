//! Sequence-aware ring buffer for fixed-size records
//!
//! This module provides the building blocks of the in-memory staging buffer that
//! sits between a lossy, reordering link and the log file:
//!
//! - `FixedRecord` describing an opaque, fixed-size byte block
//! - `CircularIndex` centralising all modular slot arithmetic
//! - `AddResult` reporting what happened to an inserted record
//!
//! The buffer itself lives in `sequenced`. All index math goes through
//! `CircularIndex` so that wrap handling is written (and tested) once.

pub mod sequenced;

/// A fixed-size record stored verbatim in a ring buffer slot
pub trait FixedRecord {
    /// Size of one record in bytes
    const SIZE: usize;

    /// View the record as raw bytes; the slice must be exactly `SIZE` long
    fn as_bytes(&self) -> &[u8];
}

impl<const N: usize> FixedRecord for [u8; N] {
    const SIZE: usize = N;

    fn as_bytes(&self) -> &[u8] {
        self
    }
}

/// Outcome of adding a record to a `SequencedRingBuffer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    /// Record stored, space remains
    Ok,
    /// Record stored and the buffer is now full
    Full,
    /// Not enough vacancy; the record was not stored and nothing changed
    Overflow,
    /// Late arrival whose slot was already flushed or overwritten
    Dropped,
}

impl AddResult {
    /// Whether the record made it into the buffer
    pub fn is_stored(self) -> bool {
        matches!(self, AddResult::Ok | AddResult::Full)
    }
}

/// Modular arithmetic over slot indices in `[0, capacity)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CircularIndex {
    capacity: usize,
}

impl CircularIndex {
    /// Create index math for a ring of `capacity` slots
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be non-zero");
        Self { capacity }
    }

    /// Number of slots in the ring
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Next slot after `i`
    pub fn inc(&self, i: usize) -> usize {
        self.inc_by(i, 1)
    }

    /// Slot `n` positions after `i`
    pub fn inc_by(&self, i: usize, n: usize) -> usize {
        (i + n % self.capacity) % self.capacity
    }

    /// Previous slot before `i`
    pub fn dec(&self, i: usize) -> usize {
        self.dec_by(i, 1)
    }

    /// Slot `n` positions before `i`
    pub fn dec_by(&self, i: usize, n: usize) -> usize {
        (i + self.capacity - n % self.capacity) % self.capacity
    }

    /// Forward distance walking from `from` to `to`, in `[0, capacity)`
    pub fn distance(&self, from: usize, to: usize) -> usize {
        self.dec_by(to, from)
    }

    /// Whether `pos` lies in the circular half-open range `[start, end)`
    ///
    /// `start == end` is the empty range.
    pub fn in_between(&self, pos: usize, start: usize, end: usize) -> bool {
        self.distance(start, pos) < self.distance(start, end)
    }
}
