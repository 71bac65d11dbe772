//! Value Chunks
//!
//! A chunk is a fixed-capacity slice of one item's values in ascending time
//! order. Free slots are reserved on the side the chunk was created to grow
//! toward: head chunks grow at the back, tail chunks at the front. Slots freed
//! by trimming become available on the side they were trimmed from.

use std::collections::VecDeque;

use super::arena::Arena;
use super::strpool::StringPool;
use super::value::Slot;
use super::{CHUNK_HEADER_SIZE, MAX_CHUNK_RECORDS, MIN_CHUNK_RECORDS, VALUE_SLOT_SIZE};

/// Clamp a requested slot count to the supported chunk sizes
pub(crate) fn chunk_slot_count(requested: usize) -> usize {
    requested.clamp(MIN_CHUNK_RECORDS, MAX_CHUNK_RECORDS)
}

/// Arena bytes charged for a chunk with `slots` slots
pub(crate) fn chunk_alloc_size(slots: usize) -> usize {
    CHUNK_HEADER_SIZE + slots * VALUE_SLOT_SIZE
}

/// Fixed-capacity, time-ordered run of values
#[derive(Debug)]
pub(crate) struct Chunk {
    values: VecDeque<Slot>,
    front_free: usize,
    back_free: usize,
}

impl Chunk {
    /// Empty chunk growing toward newer values
    pub(crate) fn for_head(slots: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(slots),
            front_free: 0,
            back_free: slots,
        }
    }

    /// Empty chunk growing toward older values
    pub(crate) fn for_tail(slots: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(slots),
            front_free: slots,
            back_free: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.front_free + self.values.len() + self.back_free
    }

    /// Arena bytes charged for this chunk
    pub(crate) fn alloc_size(&self) -> usize {
        chunk_alloc_size(self.capacity())
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Free slots before the oldest value
    pub(crate) fn front_free(&self) -> usize {
        self.front_free
    }

    /// Free slots after the newest value
    pub(crate) fn back_free(&self) -> usize {
        self.back_free
    }

    /// Oldest value
    pub(crate) fn first(&self) -> Option<&Slot> {
        self.values.front()
    }

    /// Newest value
    pub(crate) fn last(&self) -> Option<&Slot> {
        self.values.back()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&Slot> {
        self.values.get(index)
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl DoubleEndedIterator<Item = &Slot> {
        self.values.iter()
    }

    /// Values in `[0, end)`, newest first
    pub(crate) fn iter_rev_to(&self, end: usize) -> impl Iterator<Item = &Slot> {
        self.values.range(..end.min(self.values.len())).rev()
    }

    /// Append a value after the newest one
    pub(crate) fn push_back(&mut self, slot: Slot) {
        debug_assert!(self.back_free > 0, "no free slot at chunk back");
        debug_assert!(self.last().map_or(true, |last| last.timestamp <= slot.timestamp));
        self.back_free -= 1;
        self.values.push_back(slot);
    }

    /// Insert a value before the oldest one
    pub(crate) fn push_front(&mut self, slot: Slot) {
        debug_assert!(self.front_free > 0, "no free slot at chunk front");
        debug_assert!(self.first().map_or(true, |first| slot.timestamp <= first.timestamp));
        self.front_free -= 1;
        self.values.push_front(slot);
    }

    /// Remove the oldest value
    pub(crate) fn pop_front(&mut self) -> Option<Slot> {
        let slot = self.values.pop_front()?;
        self.front_free += 1;
        Some(slot)
    }

    /// Remove and return values from `at` to the newest one
    pub(crate) fn split_off(&mut self, at: usize) -> VecDeque<Slot> {
        let removed = self.values.split_off(at.min(self.values.len()));
        self.back_free += removed.len();
        removed
    }

    /// Index of the newest value whose second is at or before `sec`
    ///
    /// Search uses second resolution only.
    pub(crate) fn find_last_at_or_before(&self, sec: i64) -> Option<usize> {
        self.values
            .partition_point(|slot| slot.sec() <= sec)
            .checked_sub(1)
    }

    /// Number of leading values whose second is before `sec`
    pub(crate) fn count_before(&self, sec: i64) -> usize {
        self.values.partition_point(|slot| slot.sec() < sec)
    }

    /// Release all values and the chunk itself
    ///
    /// Returns the arena bytes freed and the number of values dropped.
    pub(crate) fn release(self, arena: &mut dyn Arena, pool: &mut StringPool) -> (usize, usize) {
        let size = self.alloc_size();
        let count = self.values.len();

        let mut freed = size;
        for slot in self.values {
            freed += slot.value.release(arena, pool);
        }
        arena.free(size);

        (freed, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::arena::BoundedArena;
    use crate::cache::value::{CachedValue, Timespec};

    fn slot(sec: i64, ns: i32) -> Slot {
        Slot {
            timestamp: Timespec::new(sec, ns),
            value: CachedValue::Uint64(sec as u64),
        }
    }

    fn chunk_with(secs: &[i64]) -> Chunk {
        let mut chunk = Chunk::for_head(secs.len() + 2);
        for &sec in secs {
            chunk.push_back(slot(sec, 0));
        }
        chunk
    }

    #[test]
    fn test_slot_count_clamped() {
        assert_eq!(chunk_slot_count(0), MIN_CHUNK_RECORDS);
        assert_eq!(chunk_slot_count(10), 10);
        assert_eq!(chunk_slot_count(100_000), MAX_CHUNK_RECORDS);
    }

    #[test]
    fn test_head_chunk_grows_back() {
        let mut chunk = Chunk::for_head(3);
        assert_eq!(chunk.back_free(), 3);
        assert_eq!(chunk.front_free(), 0);

        chunk.push_back(slot(1, 0));
        chunk.push_back(slot(2, 0));

        assert_eq!(chunk.len(), 2);
        assert_eq!(chunk.back_free(), 1);
        assert_eq!(chunk.first().unwrap().sec(), 1);
        assert_eq!(chunk.last().unwrap().sec(), 2);
    }

    #[test]
    fn test_tail_chunk_grows_front() {
        let mut chunk = Chunk::for_tail(3);
        chunk.push_front(slot(5, 0));
        chunk.push_front(slot(4, 0));

        assert_eq!(chunk.front_free(), 1);
        assert_eq!(chunk.back_free(), 0);
        assert_eq!(chunk.first().unwrap().sec(), 4);
        assert_eq!(chunk.capacity(), 3);
    }

    #[test]
    fn test_find_last_at_or_before() {
        let chunk = chunk_with(&[10, 11, 11, 13]);

        assert_eq!(chunk.find_last_at_or_before(9), None);
        assert_eq!(chunk.find_last_at_or_before(10), Some(0));
        assert_eq!(chunk.find_last_at_or_before(11), Some(2));
        assert_eq!(chunk.find_last_at_or_before(12), Some(2));
        assert_eq!(chunk.find_last_at_or_before(100), Some(3));
    }

    #[test]
    fn test_count_before() {
        let chunk = chunk_with(&[10, 11, 11, 13]);

        assert_eq!(chunk.count_before(10), 0);
        assert_eq!(chunk.count_before(11), 1);
        assert_eq!(chunk.count_before(12), 3);
    }

    #[test]
    fn test_split_off_frees_back_slots() {
        let mut chunk = chunk_with(&[1, 2, 3, 4]);
        let back_free = chunk.back_free();

        let removed = chunk.split_off(1);

        assert_eq!(removed.len(), 3);
        assert_eq!(chunk.len(), 1);
        assert_eq!(chunk.back_free(), back_free + 3);
    }

    #[test]
    fn test_pop_front_frees_front_slot() {
        let mut chunk = chunk_with(&[1, 2]);
        let popped = chunk.pop_front().unwrap();

        assert_eq!(popped.sec(), 1);
        assert_eq!(chunk.front_free(), 1);
    }

    #[test]
    fn test_iter_rev_to() {
        let chunk = chunk_with(&[1, 2, 3]);
        let secs: Vec<i64> = chunk.iter_rev_to(2).map(|s| s.sec()).collect();
        assert_eq!(secs, vec![2, 1]);
    }

    #[test]
    fn test_release_frees_chunk() {
        let mut arena = BoundedArena::new(1024);
        let mut pool = StringPool::new();
        arena.alloc(chunk_alloc_size(4)).unwrap();

        let mut chunk = Chunk::for_head(4);
        chunk.push_back(slot(1, 0));

        let (freed, count) = chunk.release(&mut arena, &mut pool);
        assert_eq!(freed, chunk_alloc_size(4));
        assert_eq!(count, 1);
        assert_eq!(arena.used_size(), 0);
    }
}
