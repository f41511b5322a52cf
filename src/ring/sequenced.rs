//! Sequenced ring buffer for out-of-order, fixed-size records
//!
//! This module implements a single-threaded circular store that accepts records
//! tagged with a monotonically increasing sequence number and reconstructs a
//! best-effort ordering before the bytes reach a sink. Key features include:
//!
//! - In-order appends at `head`
//! - Placeholder reservation for sequence gaps, filled later by late arrivals
//! - Retroactive placement of late records while their slot is still unflushed
//! - Byte-granular, resumable flushing with an element cursor plus byte offset
//! - Partial flushing that keeps the newest half available for correction
//!
//! The sink may accept fewer bytes than offered (short writes). The tail cursor
//! only ever advances by what the sink actually accepted, so a later flush
//! resumes exactly where the previous one stopped.

use crate::ring::{AddResult, CircularIndex, FixedRecord};
use std::io::{self, ErrorKind, Write};
use std::marker::PhantomData;
use tracing::{debug, trace};

/// Fixed-capacity ring of `T` records ordered by sequence number
pub struct SequencedRingBuffer<T: FixedRecord> {
    /// Backing storage, `capacity * T::SIZE` bytes
    storage: Box<[u8]>,
    /// Slot arithmetic for this ring
    index: CircularIndex,
    /// Next slot to write
    head: usize,
    /// Oldest slot not yet fully flushed
    tail: usize,
    /// Bytes of the tail slot already flushed
    tail_offset: usize,
    /// Highest sequence number accepted in order
    last_seqno: u32,
    /// Set when `head` caught up with `tail` through writes
    full: bool,
    _record: PhantomData<T>,
}

impl<T: FixedRecord> SequencedRingBuffer<T> {
    /// Create a new ring buffer holding up to `capacity` records
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or `T::SIZE` is zero
    pub fn new(capacity: usize) -> Self {
        assert!(T::SIZE > 0, "Record size must be non-zero");
        let index = CircularIndex::new(capacity);

        Self {
            storage: vec![0u8; capacity * T::SIZE].into_boxed_slice(),
            index,
            head: 0,
            tail: 0,
            tail_offset: 0,
            last_seqno: 0,
            full: false,
            _record: PhantomData,
        }
    }

    /// Number of record slots
    pub fn capacity(&self) -> usize {
        self.index.capacity()
    }

    /// Next slot that an in-order record will be written to
    pub fn head(&self) -> usize {
        self.head
    }

    /// Oldest slot with unflushed bytes
    pub fn tail(&self) -> usize {
        self.tail
    }

    /// Bytes of the tail slot already flushed
    pub fn tail_offset(&self) -> usize {
        self.tail_offset
    }

    /// Highest sequence number accepted in order so far
    pub fn last_seqno(&self) -> u32 {
        self.last_seqno
    }

    /// Whether every slot holds unflushed data
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Whether there is nothing left to flush
    pub fn is_empty(&self) -> bool {
        !self.full && self.head == self.tail
    }

    /// Number of live slots between `tail` and `head`, placeholders included
    pub fn len(&self) -> usize {
        if self.full {
            self.capacity()
        } else {
            self.index.distance(self.tail, self.head)
        }
    }

    /// Number of slots that can still be claimed
    pub fn vacancy(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Forget all contents and start over from sequence number zero
    pub fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.tail_offset = 0;
        self.last_seqno = 0;
        self.full = false;
    }

    /// Add a record carrying sequence number `seqno`
    ///
    /// A jump ahead reserves placeholder slots for the missing numbers so they
    /// can be filled if they arrive later. A number at or behind the last one
    /// accepted is written back into its slot, provided that slot has not been
    /// (even partially) flushed yet. `seqno == 0` always counts as the next
    /// expected number so that a wrapped or restarted counter keeps flowing.
    ///
    /// # Returns
    ///
    /// `Ok` or `Full` when the record was stored, `Overflow` when there was no
    /// room (nothing changes), `Dropped` when a late record's slot is gone.
    pub fn add(&mut self, item: &T, seqno: u32) -> AddResult {
        if self.full {
            return AddResult::Overflow;
        }

        let pos = if seqno != 0 && u64::from(seqno) > u64::from(self.last_seqno) + 1 {
            // The gap plus the record itself must fit, all or nothing
            let needed = (seqno - self.last_seqno) as usize;
            if needed > self.vacancy() {
                debug!(seqno, last_seqno = self.last_seqno, needed, "ring buffer overflow on gap");
                return AddResult::Overflow;
            }
            self.reserve_spaces(needed - 1);
            self.push_head(seqno)
        } else if seqno == 0 || seqno == self.last_seqno.wrapping_add(1) {
            self.push_head(seqno)
        } else {
            let offset = self.last_seqno.wrapping_sub(seqno) as usize;
            match self.retroactive_slot(offset) {
                Some(pos) => pos,
                None => {
                    debug!(seqno, last_seqno = self.last_seqno, "late record dropped");
                    return AddResult::Dropped;
                }
            }
        };

        let start = pos * T::SIZE;
        self.storage[start..start + T::SIZE].copy_from_slice(&item.as_bytes()[..T::SIZE]);

        if self.head == self.tail {
            self.full = true;
            return AddResult::Full;
        }

        AddResult::Ok
    }

    /// Advance `head` by `n` placeholder slots without writing data
    ///
    /// Reserved slots keep whatever stale bytes they held until a late record
    /// fills them. Fails with `Overflow`, leaving everything untouched, when
    /// fewer than `n` slots are vacant.
    pub fn reserve_spaces(&mut self, n: usize) -> AddResult {
        if self.full || n > self.vacancy() {
            return AddResult::Overflow;
        }

        self.head = self.index.inc_by(self.head, n);
        if n > 0 && self.head == self.tail {
            self.full = true;
            return AddResult::Full;
        }

        AddResult::Ok
    }

    /// Flush everything between the tail cursor and `head`
    ///
    /// # Returns
    ///
    /// Number of bytes the sink accepted during this call
    pub fn flush_full<W: Write>(&mut self, sink: &mut W) -> io::Result<usize> {
        self.write_to(sink, self.head)
    }

    /// Flush up to `capacity / 2` slots behind `head`
    ///
    /// The newest half stays buffered so late records can still be placed.
    pub fn flush_partial<W: Write>(&mut self, sink: &mut W) -> io::Result<usize> {
        let keep = self.capacity() / 2;
        if self.len() <= keep {
            trace!(len = self.len(), keep, "nothing to write");
            return Ok(0);
        }

        let to = self.index.dec_by(self.head, keep);
        self.write_to(sink, to)
    }

    fn push_head(&mut self, seqno: u32) -> usize {
        let pos = self.head;
        self.head = self.index.inc(self.head);
        self.last_seqno = seqno;
        pos
    }

    /// Slot for a record `offset` numbers behind `last_seqno`, if still writable
    fn retroactive_slot(&self, offset: usize) -> Option<usize> {
        // The tail slot is excluded, it may be partially flushed
        if offset >= self.capacity() || self.is_empty() {
            return None;
        }

        let pos = self.index.dec_by(self.index.dec(self.head), offset);
        if self.index.in_between(pos, self.index.inc(self.tail), self.head) {
            Some(pos)
        } else {
            None
        }
    }

    fn write_to<W: Write>(&mut self, sink: &mut W, to: usize) -> io::Result<usize> {
        if self.tail == to && !self.full {
            trace!("nothing to write");
            return Ok(0);
        }

        let start = self.tail * T::SIZE + self.tail_offset;
        if self.tail < to {
            return self.write_span(sink, start, to * T::SIZE);
        }

        // Wrapped: tail to the physical end, then the start up to `to`
        let end = self.storage.len();
        let written = self.write_span(sink, start, end)?;
        if written < end - start {
            return Ok(written);
        }

        Ok(written + self.write_span(sink, 0, to * T::SIZE)?)
    }

    fn write_span<W: Write>(&mut self, sink: &mut W, start: usize, end: usize) -> io::Result<usize> {
        if start >= end {
            return Ok(0);
        }

        let written = match sink.write(&self.storage[start..end]) {
            Ok(n) => n.min(end - start),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => 0,
            Err(e) => return Err(e),
        };

        if written > 0 {
            self.advance_tail(written);
        }
        Ok(written)
    }

    fn advance_tail(&mut self, mut num_bytes: usize) {
        if num_bytes < T::SIZE - self.tail_offset {
            // Still inside the pending tail record
            self.tail_offset += num_bytes;
            return;
        }

        if self.tail_offset > 0 {
            num_bytes -= T::SIZE - self.tail_offset;
            self.tail_offset = 0;
            self.tail = self.index.inc(self.tail);
        }

        self.tail = self.index.inc_by(self.tail, num_bytes / T::SIZE);
        self.tail_offset = num_bytes % T::SIZE;

        // At least one whole record left the buffer
        self.full = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Rec = [u8; 4];

    fn rec(v: u8) -> Rec {
        [v; 4]
    }

    /// Sink accepting at most `limit` bytes per write call
    struct ShortWriter {
        out: Vec<u8>,
        limit: usize,
    }

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.limit);
            self.out.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_in_order_adds() {
        let mut ring = SequencedRingBuffer::<Rec>::new(4);
        assert_eq!(ring.add(&rec(1), 1), AddResult::Ok);
        assert_eq!(ring.add(&rec(2), 2), AddResult::Ok);
        assert_eq!(ring.add(&rec(3), 3), AddResult::Ok);
        assert_eq!(ring.add(&rec(4), 4), AddResult::Full);
        assert!(ring.is_full());
        assert_eq!(ring.add(&rec(5), 5), AddResult::Overflow);
        assert_eq!(ring.last_seqno(), 4);
    }

    #[test]
    fn test_gap_reserves_placeholders() {
        let mut ring = SequencedRingBuffer::<Rec>::new(16);
        assert_eq!(ring.add(&rec(1), 1), AddResult::Ok);
        assert_eq!(ring.add(&rec(6), 6), AddResult::Ok);
        assert_eq!(ring.head(), 6);
        assert_eq!(ring.last_seqno(), 6);

        for s in 2..=5 {
            assert_eq!(ring.add(&rec(s), s as u32), AddResult::Ok);
            assert_eq!(ring.head(), 6);
            assert_eq!(ring.tail(), 0);
        }

        let mut out: Vec<u8> = Vec::new();
        assert_eq!(ring.flush_full(&mut out).unwrap(), 24);
        let expected: Vec<u8> = (1..=6).flat_map(rec).collect();
        assert_eq!(out, expected);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_gap_overflow_mutates_nothing() {
        let mut ring = SequencedRingBuffer::<Rec>::new(4);
        ring.add(&rec(1), 1);
        assert_eq!(ring.add(&rec(9), 9), AddResult::Overflow);
        assert_eq!(ring.head(), 1);
        assert_eq!(ring.last_seqno(), 1);
        assert!(!ring.is_full());
    }

    #[test]
    fn test_gap_exactly_filling_buffer_reports_full() {
        let mut ring = SequencedRingBuffer::<Rec>::new(4);
        ring.add(&rec(1), 1);
        assert_eq!(ring.add(&rec(4), 4), AddResult::Full);
        assert_eq!(ring.head(), ring.tail());
    }

    #[test]
    fn test_reserve_spaces() {
        let mut ring = SequencedRingBuffer::<Rec>::new(4);
        assert_eq!(ring.reserve_spaces(0), AddResult::Ok);
        assert!(ring.is_empty());
        assert_eq!(ring.reserve_spaces(5), AddResult::Overflow);
        assert_eq!(ring.head(), 0);
        assert_eq!(ring.reserve_spaces(3), AddResult::Ok);
        assert_eq!(ring.vacancy(), 1);
        assert_eq!(ring.reserve_spaces(1), AddResult::Full);
        assert_eq!(ring.reserve_spaces(1), AddResult::Overflow);
    }

    #[test]
    fn test_duplicate_overwrites_newest() {
        let mut ring = SequencedRingBuffer::<Rec>::new(4);
        ring.add(&rec(1), 1);
        ring.add(&rec(2), 2);
        assert_eq!(ring.add(&rec(9), 2), AddResult::Ok);

        let mut out: Vec<u8> = Vec::new();
        ring.flush_full(&mut out).unwrap();
        assert_eq!(&out[4..], &rec(9));
    }

    #[test]
    fn test_late_record_for_tail_slot_is_dropped() {
        let mut ring = SequencedRingBuffer::<Rec>::new(8);
        ring.add(&rec(1), 1);
        ring.add(&rec(2), 2);
        assert_eq!(ring.add(&rec(1), 1), AddResult::Dropped);
    }

    #[test]
    fn test_late_record_into_empty_buffer_is_dropped() {
        let mut ring = SequencedRingBuffer::<Rec>::new(8);
        ring.add(&rec(1), 1);
        ring.add(&rec(2), 2);
        ring.flush_full(&mut Vec::<u8>::new()).unwrap();
        assert_eq!(ring.add(&rec(2), 2), AddResult::Dropped);
        assert_eq!(ring.head(), 2);
        assert_eq!(ring.tail(), 2);
    }

    #[test]
    fn test_offset_beyond_capacity_is_dropped() {
        let mut ring = SequencedRingBuffer::<Rec>::new(8);
        ring.last_seqno = 99;
        assert_eq!(ring.add(&rec(1), 100), AddResult::Ok);
        assert_eq!(ring.add(&rec(2), 50), AddResult::Dropped);
        assert_eq!(ring.head(), 1);
    }

    #[test]
    fn test_seqno_zero_is_next_expected() {
        let mut ring = SequencedRingBuffer::<Rec>::new(4);
        ring.add(&rec(1), 1);
        ring.add(&rec(2), 2);
        assert_eq!(ring.add(&rec(3), 0), AddResult::Ok);
        assert_eq!(ring.last_seqno(), 0);
        assert_eq!(ring.add(&rec(4), 1), AddResult::Full);
    }

    #[test]
    fn test_seqno_wraps_at_integer_width() {
        let mut ring = SequencedRingBuffer::<Rec>::new(4);
        ring.add(&rec(1), 0);
        ring.last_seqno = u32::MAX - 1;
        assert_eq!(ring.add(&rec(2), u32::MAX), AddResult::Ok);
        assert_eq!(ring.add(&rec(3), 0), AddResult::Ok);
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_short_write_resumes() {
        let mut ring = SequencedRingBuffer::<Rec>::new(4);
        for s in 1..=3u8 {
            ring.add(&rec(s), s as u32);
        }

        let mut sink = ShortWriter { out: Vec::new(), limit: 3 };
        assert_eq!(ring.flush_full(&mut sink).unwrap(), 3);
        assert_eq!(ring.tail(), 0);
        assert_eq!(ring.tail_offset(), 3);

        assert_eq!(ring.flush_full(&mut sink).unwrap(), 3);
        assert_eq!(ring.tail(), 1);
        assert_eq!(ring.tail_offset(), 2);

        sink.limit = usize::MAX;
        assert_eq!(ring.flush_full(&mut sink).unwrap(), 6);
        let expected: Vec<u8> = (1..=3).flat_map(rec).collect();
        assert_eq!(sink.out, expected);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_wrapped_flush_stops_after_short_first_write() {
        let mut ring = SequencedRingBuffer::<Rec>::new(4);
        for s in 1..=3u8 {
            ring.add(&rec(s), s as u32);
        }
        ring.flush_full(&mut Vec::<u8>::new()).unwrap();
        for s in 4..=6u8 {
            ring.add(&rec(s), s as u32);
        }
        assert_eq!(ring.tail(), 3);
        assert_eq!(ring.head(), 2);

        let mut sink = ShortWriter { out: Vec::new(), limit: 2 };
        assert_eq!(ring.flush_full(&mut sink).unwrap(), 2);
        assert_eq!(ring.tail(), 3);
        assert_eq!(ring.tail_offset(), 2);

        sink.limit = usize::MAX;
        assert_eq!(ring.flush_full(&mut sink).unwrap(), 10);
        let expected: Vec<u8> = (4..=6).flat_map(rec).collect();
        assert_eq!(sink.out, expected);
    }

    #[test]
    fn test_full_buffer_drains_to_empty() {
        let mut ring = SequencedRingBuffer::<Rec>::new(2);
        ring.add(&rec(1), 1);
        assert_eq!(ring.add(&rec(2), 2), AddResult::Full);

        let mut out: Vec<u8> = Vec::new();
        assert_eq!(ring.flush_full(&mut out).unwrap(), 8);
        assert!(ring.is_empty());
        assert!(!ring.is_full());
        assert_eq!(ring.add(&rec(3), 3), AddResult::Ok);
    }

    #[test]
    fn test_partial_mid_record_keeps_full() {
        let mut ring = SequencedRingBuffer::<Rec>::new(2);
        ring.add(&rec(1), 1);
        ring.add(&rec(2), 2);

        let mut sink = ShortWriter { out: Vec::new(), limit: 1 };
        ring.flush_full(&mut sink).unwrap();
        assert!(ring.is_full());
        assert_eq!(ring.tail_offset(), 1);
    }

    #[test]
    fn test_flush_partial_keeps_newest_half() {
        let mut ring = SequencedRingBuffer::<Rec>::new(8);
        for s in 1..=6u8 {
            ring.add(&rec(s), s as u32);
        }

        let mut out: Vec<u8> = Vec::new();
        assert_eq!(ring.flush_partial(&mut out).unwrap(), 8);
        let expected: Vec<u8> = (1..=2).flat_map(rec).collect();
        assert_eq!(out, expected);
        assert_eq!(ring.len(), 4);

        assert_eq!(ring.flush_partial(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_flush_partial_on_sparse_buffer_writes_nothing() {
        let mut ring = SequencedRingBuffer::<Rec>::new(8);
        for s in 1..=6u8 {
            ring.add(&rec(s), s as u32);
        }
        ring.flush_full(&mut Vec::<u8>::new()).unwrap();
        ring.add(&rec(7), 7);

        let mut out: Vec<u8> = Vec::new();
        assert_eq!(ring.flush_partial(&mut out).unwrap(), 0);
        assert!(out.is_empty());
        assert_eq!(ring.tail(), 6);
    }

    #[test]
    fn test_would_block_is_zero_write() {
        struct Blocked;
        impl Write for Blocked {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::from(ErrorKind::WouldBlock))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut ring = SequencedRingBuffer::<Rec>::new(4);
        ring.add(&rec(1), 1);
        assert_eq!(ring.flush_full(&mut Blocked).unwrap(), 0);
        assert_eq!(ring.tail(), 0);
        assert_eq!(ring.tail_offset(), 0);
    }

    #[test]
    fn test_sink_error_propagates() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::from(ErrorKind::BrokenPipe))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut ring = SequencedRingBuffer::<Rec>::new(4);
        ring.add(&rec(1), 1);
        assert!(ring.flush_full(&mut Broken).is_err());
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_single_slot_buffer() {
        let mut ring = SequencedRingBuffer::<Rec>::new(1);
        assert_eq!(ring.add(&rec(1), 1), AddResult::Full);
        assert_eq!(ring.add(&rec(2), 2), AddResult::Overflow);

        let mut out: Vec<u8> = Vec::new();
        assert_eq!(ring.flush_partial(&mut out).unwrap(), 4);
        assert!(ring.is_empty());
        assert_eq!(ring.add(&rec(1), 1), AddResult::Dropped);
        assert_eq!(ring.add(&rec(2), 2), AddResult::Full);
    }

    #[test]
    #[should_panic]
    fn test_zero_capacity_panics() {
        SequencedRingBuffer::<Rec>::new(0);
    }
}
