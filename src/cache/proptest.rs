//! Property-Based Tests for the Value Cache
//!
//! # Test Properties
//!
//! 1. **Ordering**: cached values stay in ascending timestamp order under any
//!    mix of appends, backfills and pruning
//! 2. **Conservation**: merging an overlapping batch keeps exactly the union
//!    of cached and appended values
//! 3. **Same-second pruning**: a second is never split between kept and
//!    dropped values
//! 4. **Weight order**: of two equally sized items the one with fewer hits is
//!    evicted first
//! 5. **String pool round trip**: interning n times and releasing n times
//!    leaves nothing behind

#![cfg(test)]

use proptest::prelude::*;

use super::arena::{Arena, BoundedArena};
use super::eviction::TestHeap;
use super::item::CacheItem;
use super::strpool::{PooledStr, StringPool};
use super::value::{HistoryRecord, Timespec, ValueType};
use super::ITEM_RECORD_SIZE;

const NOW: i64 = 1_000_000;

fn record(sec: i64, ns: i32) -> HistoryRecord {
    HistoryRecord::float(sec, ns, sec as f64)
}

fn sorted(mut records: Vec<HistoryRecord>) -> Vec<HistoryRecord> {
    records.sort_by_key(|r| r.timestamp);
    records
}

fn timestamps(item: &CacheItem) -> Vec<Timespec> {
    item.values().map(|slot| slot.timestamp).collect()
}

// =============================================================================
// Property Strategies
// =============================================================================

#[derive(Debug, Clone)]
enum ItemOp {
    /// Append a batch of (second offset, ns) pairs relative to the newest value
    Append(Vec<(i64, i32)>),
    /// Backfill this many values below the oldest value
    Backfill(usize),
    /// Prune with the given retention range
    Prune(i64),
}

/// Strategy for one item operation
fn item_op_strategy() -> impl Strategy<Value = ItemOp> {
    prop_oneof![
        3 => prop::collection::vec((-20i64..20, 0i32..1000), 1..40).prop_map(ItemOp::Append),
        1 => (1usize..30).prop_map(ItemOp::Backfill),
        1 => (1i64..200).prop_map(ItemOp::Prune),
    ]
}

/// Strategy for a batch of seconds with repeats, as (sec, ns) pairs
fn same_second_strategy() -> impl Strategy<Value = Vec<(i64, i32)>> {
    prop::collection::vec((0i64..60, 1usize..5), 1..40).prop_map(|runs| {
        runs.into_iter()
            .flat_map(|(sec, count)| (0..count).map(move |ns| (NOW - 100 + sec, ns as i32)))
            .collect()
    })
}

/// Strategy for short pooled strings
fn string_strategy() -> impl Strategy<Value = String> {
    "[a-z]{0,32}"
}

// =============================================================================
// Item Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: cached values are ordered after any sequence of operations.
    #[test]
    fn prop_values_stay_ordered(ops in prop::collection::vec(item_op_strategy(), 1..20)) {
        let mut heap = TestHeap::new(16 * 1024 * 1024);
        let mut item = CacheItem::new(1, ValueType::Float, NOW);

        for op in ops {
            let mut storage = heap.storage(NOW);
            match op {
                ItemOp::Append(offsets) => {
                    let base = item.newest().map_or(NOW - 50, |slot| slot.sec());
                    let batch = sorted(
                        offsets.iter().map(|&(off, ns)| record(base + off, ns)).collect(),
                    );
                    item.append_values(&batch, &mut storage)?;
                }
                ItemOp::Backfill(count) => {
                    let oldest = item.oldest().map_or(NOW, |slot| slot.sec());
                    let batch: Vec<HistoryRecord> = (0..count as i64)
                        .map(|i| record(oldest - count as i64 + i, 0))
                        .collect();
                    item.prepend_values(&batch, &mut storage)?;
                }
                ItemOp::Prune(range) => {
                    item.range = range;
                    item.prune(&mut storage);
                }
            }

            let cached = timestamps(&item);
            prop_assert!(cached.windows(2).all(|w| w[0] <= w[1]), "out of order: {:?}", cached);
            prop_assert_eq!(cached.len(), item.values_total);
        }
    }

    /// Property: an overlapping append keeps the union of both value sets.
    #[test]
    fn prop_merge_conserves_values(
        cached in prop::collection::btree_set(0i64..100, 1..50),
        appended in prop::collection::btree_set(0i64..150, 1..50),
    ) {
        let mut heap = TestHeap::new(16 * 1024 * 1024);
        let mut item = CacheItem::new(1, ValueType::Float, NOW);

        let cached: Vec<HistoryRecord> = cached.iter().map(|&s| record(NOW - 200 + s, 0)).collect();
        let appended: Vec<HistoryRecord> = appended.iter().map(|&s| record(NOW - 200 + s, 1)).collect();

        item.append_values(&cached, &mut heap.storage(NOW))?;
        item.append_values(&appended, &mut heap.storage(NOW))?;

        let expected: Vec<Timespec> = sorted([cached, appended].concat())
            .iter()
            .map(|r| r.timestamp)
            .collect();
        prop_assert_eq!(timestamps(&item), expected);
    }

    /// Property: pruning never splits a second between kept and dropped values.
    #[test]
    fn prop_prune_keeps_seconds_whole(
        values in same_second_strategy(),
        range in 1i64..120,
    ) {
        let mut heap = TestHeap::new(16 * 1024 * 1024);
        let mut item = CacheItem::new(1, ValueType::Float, NOW);
        let batch = sorted(values.iter().map(|&(sec, ns)| record(sec, ns)).collect());

        // minimal chunks put chunk boundaries inside seconds
        item.prepend_values(&batch[..1], &mut heap.storage(NOW))?;
        item.append_values(&batch[1..], &mut heap.storage(NOW))?;
        let before = timestamps(&item);

        item.range = range;
        item.prune(&mut heap.storage(NOW));
        let after = timestamps(&item);

        let dropped = &before[..before.len() - after.len()];
        prop_assert_eq!(&before[dropped.len()..], &after[..]);
        if let (Some(last_dropped), Some(first_kept)) = (dropped.last(), after.first()) {
            prop_assert!(last_dropped.sec < first_kept.sec);
        }
    }
}

// =============================================================================
// Eviction Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: with equal value counts, the item with fewer hits goes first.
    #[test]
    fn prop_fewer_hits_evicted_first(
        values in 1i64..100,
        hits in 0u64..1000,
        extra in 1u64..1000,
        swap in any::<bool>(),
    ) {
        let mut heap = TestHeap::new(16 * 1024 * 1024);
        heap.policy.min_free_space = 1;

        let (cold, hot) = if swap { (2, 1) } else { (1, 2) };
        for (itemid, item_hits) in [(cold, hits), (hot, hits + extra)] {
            heap.storage(NOW).allocate(ITEM_RECORD_SIZE)?;
            let mut item = CacheItem::new(itemid, ValueType::Float, NOW);
            let batch: Vec<HistoryRecord> = (0..values).map(|i| record(NOW - values + i, 0)).collect();
            item.append_values(&batch, &mut heap.storage(NOW))?;
            item.hits = item_hits;
            heap.items.insert(itemid, item);
        }

        heap.storage(NOW).release_space(1);

        prop_assert!(!heap.items.contains_key(&cold));
        prop_assert!(heap.items.contains_key(&hot));
    }
}

// =============================================================================
// String Pool Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: n interns and n releases leave the pool and arena empty.
    #[test]
    fn prop_string_pool_round_trip(s in string_strategy(), n in 1usize..10) {
        let mut arena = BoundedArena::new(1024 * 1024);
        let mut pool = StringPool::new();

        let handles: Vec<PooledStr> = (0..n)
            .map(|_| pool.intern(&s, &mut arena))
            .collect::<Result<_, _>>()?;

        prop_assert_eq!(arena.used_size(), StringPool::entry_size(&s));
        prop_assert_eq!(pool.refcount(&s), Some(n as u32));
        prop_assert!(handles.iter().all(|h| h.as_str() == s));
        prop_assert!(handles.iter().all(|h| PooledStr::ptr_eq(h, &handles[0])));

        for handle in handles {
            pool.release(handle, &mut arena);
        }

        prop_assert!(pool.is_empty());
        prop_assert_eq!(arena.used_size(), 0);
    }
}
