//! Cached Items
//!
//! Per-item chunk list kept in ascending time order from the tail (oldest
//! chunk, deque front) to the head (newest chunk, deque back). New values are
//! appended at the head, backfilled history is inserted at the tail.

use std::collections::VecDeque;

use super::arena::Arena;
use super::chunk::{chunk_alloc_size, chunk_slot_count, Chunk};
use super::eviction::Storage;
use super::strpool::StringPool;
use super::value::{CachedValue, HistoryRecord, ItemId, Slot, Timespec, ValueType};
use super::ITEM_RECORD_SIZE;
use crate::error::Result;

/// Location of a value inside an item's chunk list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Position {
    pub(crate) chunk: usize,
    pub(crate) index: usize,
}

/// History cache of one item
#[derive(Debug)]
pub(crate) struct CacheItem {
    pub(crate) itemid: ItemId,
    pub(crate) value_type: ValueType,
    chunks: VecDeque<Chunk>,
    /// Number of values across all chunks
    pub(crate) values_total: usize,
    /// Largest number of values any single request needed
    pub(crate) max_request_count: usize,
    /// Largest time span (seconds back from now) any request needed; 0 if unknown
    pub(crate) range: i64,
    /// Set once the history store has nothing older than the cached tail
    pub(crate) fully_cached: bool,
    pub(crate) last_accessed: i64,
    pub(crate) hits: u64,
}

impl CacheItem {
    pub(crate) fn new(itemid: ItemId, value_type: ValueType, now: i64) -> Self {
        Self {
            itemid,
            value_type,
            chunks: VecDeque::new(),
            values_total: 0,
            max_request_count: 0,
            range: 0,
            fully_cached: false,
            last_accessed: now,
            hits: 0,
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.values_total == 0
    }

    pub(crate) fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Oldest cached value
    pub(crate) fn oldest(&self) -> Option<&Slot> {
        self.chunks.iter().find_map(Chunk::first)
    }

    /// Newest cached value
    pub(crate) fn newest(&self) -> Option<&Slot> {
        self.chunks.iter().rev().find_map(Chunk::last)
    }

    /// All cached values, oldest first
    #[cfg(test)]
    pub(crate) fn values(&self) -> impl Iterator<Item = &Slot> {
        self.chunks.iter().flat_map(Chunk::iter)
    }

    pub(crate) fn slot(&self, pos: Position) -> Option<&Slot> {
        self.chunks.get(pos.chunk)?.get(pos.index)
    }

    /// Position of the newest value whose second is at or before `sec`
    ///
    /// Walks chunks from the head while their oldest value is newer than the
    /// target, then binary searches the located chunk.
    pub(crate) fn find_at_or_before(&self, sec: i64) -> Option<Position> {
        for (chunk_index, chunk) in self.chunks.iter().enumerate().rev() {
            match chunk.first() {
                Some(first) if first.sec() <= sec => {
                    return chunk.find_last_at_or_before(sec).map(|index| Position {
                        chunk: chunk_index,
                        index,
                    });
                }
                _ => continue,
            }
        }
        None
    }

    /// Position of the newest value at or before the full timestamp `ts`
    ///
    /// Values sharing the target second are scanned backward on nanoseconds.
    pub(crate) fn find_at_or_before_ts(&self, ts: Timespec) -> Option<Position> {
        let mut pos = self.find_at_or_before(ts.sec)?;

        loop {
            let slot = self.slot(pos)?;
            if slot.timestamp <= ts {
                return Some(pos);
            }
            pos = self.previous(pos)?;
        }
    }

    /// Position of the value preceding `pos`
    fn previous(&self, pos: Position) -> Option<Position> {
        if pos.index > 0 {
            return Some(Position {
                chunk: pos.chunk,
                index: pos.index - 1,
            });
        }

        (0..pos.chunk).rev().find_map(|chunk_index| {
            let len = self.chunks[chunk_index].len();
            (len > 0).then(|| Position {
                chunk: chunk_index,
                index: len - 1,
            })
        })
    }

    /// Values from `pos` back to the oldest one, newest first
    pub(crate) fn iter_back_from(&self, pos: Position) -> impl Iterator<Item = &Slot> {
        self.chunks
            .range(..=pos.chunk)
            .rev()
            .enumerate()
            .flat_map(move |(n, chunk)| {
                let end = if n == 0 { pos.index + 1 } else { chunk.len() };
                chunk.iter_rev_to(end)
            })
    }

    /// Number of cached values with a second at or before `sec`, counting at most `limit`
    pub(crate) fn count_at_or_before(&self, sec: i64, limit: usize) -> usize {
        let Some(pos) = self.find_at_or_before(sec) else {
            return 0;
        };

        let mut count = pos.index + 1;
        for chunk in self.chunks.range(..pos.chunk).rev() {
            if count >= limit {
                break;
            }
            count += chunk.len();
        }
        count
    }

    // =========================================================================
    // Head Growth
    // =========================================================================

    /// Append a batch sorted in ascending order at the head
    ///
    /// A batch starting at or before the newest cached value is merged: cached
    /// values from the batch's first second onward are taken out, combined with
    /// the batch, sorted and appended again. A batch reaching below the oldest
    /// cached value replaces the whole chunk list this way and clears
    /// `fully_cached`, since the store may hold older values than the new tail.
    pub(crate) fn append_values(
        &mut self,
        values: &[HistoryRecord],
        storage: &mut Storage<'_>,
    ) -> Result<()> {
        let Some(first) = values.first() else {
            return Ok(());
        };

        let merged: Vec<HistoryRecord>;
        let mut values = values;

        let overlaps = self
            .newest()
            .is_some_and(|newest| first.timestamp <= newest.timestamp);

        if overlaps {
            if self
                .oldest()
                .is_some_and(|oldest| first.timestamp < oldest.timestamp)
            {
                self.fully_cached = false;
            }

            let mut batch = values.to_vec();
            batch.extend(self.take_values_from(first.timestamp.sec, storage));
            batch.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

            merged = batch;
            values = &merged;
        }

        let mut added_chunk = false;

        for record in values {
            let slot = Slot {
                timestamp: record.timestamp,
                value: CachedValue::store(&record.value, self.value_type, storage)?,
            };

            match self.chunks.back_mut() {
                Some(head) if head.back_free() > 0 => head.push_back(slot),
                _ => {
                    let slots = chunk_slot_count(self.max_request_count / 2 + 1);
                    if let Err(e) = storage.allocate(chunk_alloc_size(slots)) {
                        storage.release_value(slot.value);
                        return Err(e);
                    }
                    let mut chunk = Chunk::for_head(slots);
                    chunk.push_back(slot);
                    self.chunks.push_back(chunk);
                    added_chunk = true;
                }
            }
            self.values_total += 1;
        }

        if added_chunk {
            self.prune(storage);
        }

        Ok(())
    }

    /// Take out every cached value whose second is at or after `sec`
    fn take_values_from(&mut self, sec: i64, storage: &mut Storage<'_>) -> Vec<HistoryRecord> {
        let mut taken = Vec::new();

        loop {
            let Some(head) = self.chunks.back_mut() else {
                break;
            };
            let keep = head.count_before(sec);
            let removed = head.split_off(keep);
            let emptied = head.is_empty();

            for slot in removed {
                taken.push(slot.to_record());
                storage.release_value(slot.value);
                self.values_total -= 1;
            }

            if emptied {
                if let Some(chunk) = self.chunks.pop_back() {
                    storage.release_chunk(chunk);
                }
            }

            if keep > 0 {
                break;
            }
        }

        taken
    }

    // =========================================================================
    // Tail Growth
    // =========================================================================

    /// Insert a batch sorted in ascending order below the oldest cached value
    ///
    /// New tail chunks are sized to the number of values still to insert.
    pub(crate) fn prepend_values(
        &mut self,
        values: &[HistoryRecord],
        storage: &mut Storage<'_>,
    ) -> Result<()> {
        for (n, record) in values.iter().rev().enumerate() {
            let remaining = values.len() - n;
            let slot = Slot {
                timestamp: record.timestamp,
                value: CachedValue::store(&record.value, self.value_type, storage)?,
            };

            match self.chunks.front_mut() {
                Some(tail) if tail.front_free() > 0 => tail.push_front(slot),
                _ => {
                    let slots = chunk_slot_count(remaining);
                    if let Err(e) = storage.allocate(chunk_alloc_size(slots)) {
                        storage.release_value(slot.value);
                        return Err(e);
                    }
                    let mut chunk = Chunk::for_tail(slots);
                    chunk.push_front(slot);
                    self.chunks.push_front(chunk);
                }
            }
            self.values_total += 1;
        }

        Ok(())
    }

    // =========================================================================
    // Retention
    // =========================================================================

    /// Drop tail chunks entirely older than `now - range`
    ///
    /// Values sharing the second of a dropped chunk's newest value are dropped
    /// with it, so a second is never split between kept and dropped values.
    /// The head chunk and the newest second are always kept.
    pub(crate) fn prune(&mut self, storage: &mut Storage<'_>) {
        if self.range == 0 {
            return;
        }
        let Some(newest_sec) = self.newest().map(Slot::sec) else {
            return;
        };

        let floor = storage.now - self.range;
        let mut removed = false;

        while self.chunks.len() > 1 {
            let last_sec = match self.chunks.front().and_then(Chunk::last) {
                Some(last) if last.sec() < floor && last.sec() != newest_sec => last.sec(),
                _ => break,
            };

            if let Some(chunk) = self.chunks.pop_front() {
                let (_, count) = storage.release_chunk(chunk);
                self.values_total -= count;
                removed = true;
            }

            while let Some(next) = self.chunks.front_mut() {
                if next.first().map_or(true, |first| first.sec() != last_sec) {
                    break;
                }
                if let Some(slot) = next.pop_front() {
                    storage.release_value(slot.value);
                    self.values_total -= 1;
                }
                if next.is_empty() {
                    if let Some(chunk) = self.chunks.pop_front() {
                        storage.release_chunk(chunk);
                    }
                }
            }
        }

        if removed {
            self.fully_cached = false;
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Drop all cached values and reset request bookkeeping
    ///
    /// Returns the arena bytes freed.
    pub(crate) fn clear_values(&mut self, arena: &mut dyn Arena, pool: &mut StringPool) -> usize {
        let mut freed = 0;
        for chunk in self.chunks.drain(..) {
            freed += chunk.release(arena, pool).0;
        }

        self.values_total = 0;
        self.max_request_count = 0;
        self.range = 0;
        self.fully_cached = false;
        freed
    }

    /// Switch the item to another value type, dropping its history
    pub(crate) fn change_value_type(
        &mut self,
        value_type: ValueType,
        arena: &mut dyn Arena,
        pool: &mut StringPool,
    ) -> usize {
        let freed = self.clear_values(arena, pool);
        self.value_type = value_type;
        freed
    }

    /// Release the item and everything it holds
    pub(crate) fn release(mut self, arena: &mut dyn Arena, pool: &mut StringPool) -> usize {
        let freed = self.clear_values(arena, pool);
        arena.free(ITEM_RECORD_SIZE);
        freed + ITEM_RECORD_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::eviction::TestHeap;
    use crate::cache::value::HistoryValue;

    const NOW: i64 = 1_000_000;

    fn records(secs: &[i64]) -> Vec<HistoryRecord> {
        secs.iter()
            .map(|&sec| HistoryRecord::float(sec, 0, sec as f64))
            .collect()
    }

    fn secs(item: &CacheItem) -> Vec<i64> {
        item.values().map(Slot::sec).collect()
    }

    fn assert_consistent(item: &CacheItem) {
        let stamps: Vec<Timespec> = item.values().map(|slot| slot.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]), "out of order: {:?}", stamps);
        assert_eq!(stamps.len(), item.values_total);
        assert!(item.chunks.iter().all(|chunk| !chunk.is_empty()));
    }

    fn new_item(heap: &mut TestHeap) -> CacheItem {
        heap.arena.alloc(ITEM_RECORD_SIZE).unwrap();
        CacheItem::new(1, ValueType::Float, NOW)
    }

    // =========================================================================
    // Append Tests
    // =========================================================================

    #[test]
    fn test_append_in_order() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);

        item.append_values(&records(&[1, 2, 3]), &mut heap.storage(NOW))
            .unwrap();
        item.append_values(&records(&[4, 5]), &mut heap.storage(NOW))
            .unwrap();

        assert_eq!(secs(&item), vec![1, 2, 3, 4, 5]);
        assert_consistent(&item);
    }

    #[test]
    fn test_append_spills_into_new_chunk() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);

        let batch: Vec<i64> = (1..=10).collect();
        item.append_values(&records(&batch), &mut heap.storage(NOW))
            .unwrap();

        // max_request_count 0 gives minimum sized chunks
        assert_eq!(item.chunk_count(), 4);
        assert_eq!(secs(&item), batch);
        assert_consistent(&item);
    }

    #[test]
    fn test_append_chunk_size_follows_request_count() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);
        item.max_request_count = 20;

        let batch: Vec<i64> = (1..=11).collect();
        item.append_values(&records(&batch), &mut heap.storage(NOW))
            .unwrap();

        assert_eq!(item.chunk_count(), 1);
        assert_eq!(item.chunks[0].capacity(), 11);
    }

    #[test]
    fn test_append_out_of_order_merges() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);

        item.append_values(&records(&[10, 20, 30, 40]), &mut heap.storage(NOW))
            .unwrap();
        item.append_values(&records(&[15, 35]), &mut heap.storage(NOW))
            .unwrap();

        assert_eq!(secs(&item), vec![10, 15, 20, 30, 35, 40]);
        assert_consistent(&item);
    }

    #[test]
    fn test_append_equal_timestamp_keeps_both() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);

        item.append_values(&records(&[10, 20]), &mut heap.storage(NOW))
            .unwrap();
        item.append_values(
            &[HistoryRecord::float(20, 0, -1.0)],
            &mut heap.storage(NOW),
        )
        .unwrap();

        assert_eq!(secs(&item), vec![10, 20, 20]);
        assert_consistent(&item);
    }

    #[test]
    fn test_append_merges_values_older_than_tail() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);
        item.fully_cached = true;

        item.append_values(&records(&[10, 20, 30]), &mut heap.storage(NOW))
            .unwrap();
        item.append_values(&records(&[5, 25]), &mut heap.storage(NOW))
            .unwrap();

        assert_eq!(secs(&item), vec![5, 10, 20, 25, 30]);
        assert!(!item.fully_cached);
        assert_consistent(&item);
    }

    #[test]
    fn test_append_late_value_in_tail_second() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);

        let cached = vec![
            HistoryRecord::float(10, 500, 1.0),
            HistoryRecord::float(11, 0, 2.0),
            HistoryRecord::float(12, 0, 3.0),
        ];
        item.append_values(&cached, &mut heap.storage(NOW)).unwrap();
        item.append_values(&[HistoryRecord::float(10, 100, 0.5)], &mut heap.storage(NOW))
            .unwrap();

        let stamps: Vec<Timespec> = item.values().map(|slot| slot.timestamp).collect();
        assert_eq!(
            stamps,
            vec![
                Timespec::new(10, 100),
                Timespec::new(10, 500),
                Timespec::new(11, 0),
                Timespec::new(12, 0),
            ]
        );
        assert_consistent(&item);
    }

    #[test]
    fn test_append_only_old_values_keeps_cached() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);

        item.append_values(&records(&[10, 20]), &mut heap.storage(NOW))
            .unwrap();
        item.append_values(&records(&[1, 2]), &mut heap.storage(NOW))
            .unwrap();

        assert_eq!(secs(&item), vec![1, 2, 10, 20]);
        assert_consistent(&item);
    }

    #[test]
    fn test_merge_releases_strings() {
        let mut heap = TestHeap::new(64 * 1024);
        heap.arena.alloc(ITEM_RECORD_SIZE).unwrap();
        let mut item = CacheItem::new(1, ValueType::Str, NOW);

        let text = |sec: i64, s: &str| {
            HistoryRecord::new(Timespec::new(sec, 0), HistoryValue::Str(s.to_string()))
        };

        item.append_values(&[text(10, "a"), text(20, "b")], &mut heap.storage(NOW))
            .unwrap();
        item.append_values(&[text(15, "c")], &mut heap.storage(NOW))
            .unwrap();

        assert_eq!(heap.pool.len(), 3);
        assert_eq!(heap.pool.refcount("b"), Some(1));

        let freed = item.release(&mut heap.arena, &mut heap.pool);
        assert!(freed > 0);
        assert!(heap.pool.is_empty());
        assert_eq!(heap.used(), 0);
    }

    // =========================================================================
    // Prepend Tests
    // =========================================================================

    #[test]
    fn test_prepend_sizes_chunk_to_request() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);

        item.append_values(&records(&[100]), &mut heap.storage(NOW))
            .unwrap();
        let batch: Vec<i64> = (50..60).collect();
        item.prepend_values(&records(&batch), &mut heap.storage(NOW))
            .unwrap();

        assert_eq!(item.chunk_count(), 2);
        assert_eq!(item.chunks[0].capacity(), 10);
        assert_eq!(item.oldest().unwrap().sec(), 50);
        assert_consistent(&item);
    }

    #[test]
    fn test_prepend_fills_free_front_slots() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);

        item.prepend_values(&records(&[10]), &mut heap.storage(NOW))
            .unwrap();
        // first tail chunk has MIN_CHUNK_RECORDS slots
        item.prepend_values(&records(&[8, 9]), &mut heap.storage(NOW))
            .unwrap();

        assert_eq!(item.chunk_count(), 1);
        assert_eq!(secs(&item), vec![8, 9, 10]);
    }

    // =========================================================================
    // Lookup Tests
    // =========================================================================

    #[test]
    fn test_find_at_or_before_across_chunks() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);
        item.append_values(&records(&[1, 3, 5, 7, 9, 11, 13]), &mut heap.storage(NOW))
            .unwrap();

        assert_eq!(item.find_at_or_before(0), None);
        let pos = item.find_at_or_before(8).unwrap();
        assert_eq!(item.slot(pos).unwrap().sec(), 7);
        let pos = item.find_at_or_before(100).unwrap();
        assert_eq!(item.slot(pos).unwrap().sec(), 13);
    }

    #[test]
    fn test_find_at_or_before_ts_scans_nanoseconds() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);
        let batch = vec![
            HistoryRecord::float(9, 0, 0.0),
            HistoryRecord::float(10, 100, 1.0),
            HistoryRecord::float(10, 200, 2.0),
            HistoryRecord::float(10, 300, 3.0),
        ];
        item.append_values(&batch, &mut heap.storage(NOW)).unwrap();

        let pos = item.find_at_or_before_ts(Timespec::new(10, 250)).unwrap();
        assert_eq!(item.slot(pos).unwrap().timestamp, Timespec::new(10, 200));

        let pos = item.find_at_or_before_ts(Timespec::new(10, 50)).unwrap();
        assert_eq!(item.slot(pos).unwrap().timestamp, Timespec::new(9, 0));

        assert_eq!(item.find_at_or_before_ts(Timespec::new(8, 999)), None);
    }

    #[test]
    fn test_iter_back_from() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);
        item.append_values(&records(&[1, 2, 3, 4, 5, 6, 7]), &mut heap.storage(NOW))
            .unwrap();

        let pos = item.find_at_or_before(5).unwrap();
        let back: Vec<i64> = item.iter_back_from(pos).map(Slot::sec).collect();
        assert_eq!(back, vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_count_at_or_before() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);
        item.append_values(&records(&[1, 2, 3, 4, 5, 6, 7]), &mut heap.storage(NOW))
            .unwrap();

        assert_eq!(item.count_at_or_before(0, 10), 0);
        assert_eq!(item.count_at_or_before(5, 10), 5);
        assert!(item.count_at_or_before(7, 2) >= 2);
    }

    // =========================================================================
    // Retention Tests
    // =========================================================================

    #[test]
    fn test_prune_drops_old_chunks() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);

        let old: Vec<i64> = (NOW - 500..NOW - 497).collect();
        item.append_values(&records(&old), &mut heap.storage(NOW))
            .unwrap();
        item.range = 100;
        item.fully_cached = true;
        item.append_values(&records(&[NOW - 10, NOW - 5, NOW]), &mut heap.storage(NOW))
            .unwrap();

        assert_eq!(secs(&item), vec![NOW - 10, NOW - 5, NOW]);
        assert!(!item.fully_cached);
        assert_consistent(&item);
    }

    #[test]
    fn test_prune_keeps_delayed_batch() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);
        item.range = 60;

        item.append_values(&records(&[NOW - 300, NOW - 200]), &mut heap.storage(NOW))
            .unwrap();

        assert_eq!(item.values_total, 2);
        assert_eq!(secs(&item), vec![NOW - 300, NOW - 200]);
    }

    #[test]
    fn test_prune_keeps_head_chunk() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);
        item.range = 60;

        let old: Vec<i64> = (NOW - 510..NOW - 500).collect();
        item.append_values(&records(&old), &mut heap.storage(NOW))
            .unwrap();

        assert_eq!(item.chunk_count(), 1);
        assert_eq!(item.newest().unwrap().sec(), NOW - 501);
        assert_consistent(&item);
    }

    #[test]
    fn test_prune_disabled_without_range() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);

        let batch: Vec<i64> = (1..=10).collect();
        item.append_values(&records(&batch), &mut heap.storage(NOW))
            .unwrap();

        assert_eq!(item.values_total, 10);
    }

    #[test]
    fn test_prune_keeps_same_second_together() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);

        // chunk of 3: [10, 20, 30.0], then [30.1, 30.2, 40]
        let batch = vec![
            HistoryRecord::float(10, 0, 0.0),
            HistoryRecord::float(20, 0, 0.0),
            HistoryRecord::float(30, 0, 0.0),
            HistoryRecord::float(30, 1, 0.0),
            HistoryRecord::float(30, 2, 0.0),
            HistoryRecord::float(40, 0, 0.0),
        ];
        item.append_values(&batch, &mut heap.storage(NOW)).unwrap();
        assert_eq!(item.chunk_count(), 2);

        item.range = NOW - 35;
        item.prune(&mut heap.storage(NOW));

        assert_eq!(secs(&item), vec![40]);
        assert_consistent(&item);
    }

    #[test]
    fn test_prune_same_second_spanning_chunks() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);

        let mut batch = vec![HistoryRecord::float(10, 0, 0.0), HistoryRecord::float(20, 0, 0.0)];
        batch.extend((0..5).map(|ns| HistoryRecord::float(30, ns, 0.0)));
        batch.push(HistoryRecord::float(50, 0, 0.0));
        item.append_values(&batch, &mut heap.storage(NOW)).unwrap();

        item.range = NOW - 35;
        item.prune(&mut heap.storage(NOW));

        assert!(secs(&item).iter().all(|&sec| sec != 30));
        assert_eq!(secs(&item), vec![50]);
        assert_consistent(&item);
    }

    // =========================================================================
    // Teardown Tests
    // =========================================================================

    #[test]
    fn test_change_value_type_resets() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);
        item.append_values(&records(&[1, 2, 3]), &mut heap.storage(NOW))
            .unwrap();
        item.range = 50;
        item.fully_cached = true;

        item.change_value_type(ValueType::Uint64, &mut heap.arena, &mut heap.pool);

        assert!(item.is_empty());
        assert_eq!(item.chunk_count(), 0);
        assert_eq!(item.value_type, ValueType::Uint64);
        assert_eq!(item.range, 0);
        assert!(!item.fully_cached);
        assert_eq!(heap.used(), ITEM_RECORD_SIZE);
    }

    #[test]
    fn test_release_returns_all_space() {
        let mut heap = TestHeap::new(64 * 1024);
        let mut item = new_item(&mut heap);
        item.append_values(&records(&[1, 2, 3, 4, 5]), &mut heap.storage(NOW))
            .unwrap();

        let used = heap.used();
        assert_eq!(item.release(&mut heap.arena, &mut heap.pool), used);
        assert_eq!(heap.used(), 0);
    }
}
