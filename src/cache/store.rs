//! History Store Contract
//!
//! The slow backing store the cache fills itself from. Implementations only
//! need to answer half-open time range reads; count based and point reads are
//! built on top of them.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;

use super::value::{HistoryRecord, HistoryValue, ItemId, Timespec, ValueType};
use crate::error::{Error, Result};

const SEC_PER_HOUR: i64 = 60 * 60;
const SEC_PER_DAY: i64 = 24 * SEC_PER_HOUR;
const SEC_PER_WEEK: i64 = 7 * SEC_PER_DAY;
const SEC_PER_MONTH: i64 = 30 * SEC_PER_DAY;

/// Windows used by count based reads, widening until enough values are found.
/// `None` reads everything older.
const COUNT_READ_PERIODS: [Option<i64>; 5] = [
    Some(SEC_PER_HOUR),
    Some(SEC_PER_DAY),
    Some(SEC_PER_WEEK),
    Some(SEC_PER_MONTH),
    None,
];

/// Backing history store
///
/// All reads are synchronous. The cache calls them while holding its lock.
pub trait HistoryStore: Send + Sync {
    /// Values with a second in `(after, until]`; `after = None` means unbounded
    ///
    /// Result order is unspecified.
    fn read_range(
        &self,
        itemid: ItemId,
        value_type: ValueType,
        after: Option<i64>,
        until: i64,
    ) -> Result<Vec<HistoryRecord>>;

    /// Values with a second in `(end - seconds, end]`
    fn read_by_time(
        &self,
        itemid: ItemId,
        value_type: ValueType,
        seconds: i64,
        end: i64,
    ) -> Result<Vec<HistoryRecord>> {
        self.read_range(itemid, value_type, Some(end - seconds), end)
    }

    /// At least `count` values at or before `end`, newest first
    ///
    /// Values newer than `count_from` are returned but not counted. Values
    /// sharing the second of the last counted value are always included.
    /// Reads an hour, then a day, a week, a month and finally everything older
    /// until enough values are found.
    fn read_by_count(
        &self,
        itemid: ItemId,
        value_type: ValueType,
        count: usize,
        end: i64,
        count_from: i64,
    ) -> Result<Vec<HistoryRecord>> {
        let mut values: Vec<HistoryRecord> = Vec::new();
        let mut needed = count;
        let mut until = end;

        for period in COUNT_READ_PERIODS {
            if values.len() >= needed {
                break;
            }

            let after = period.map(|period| until - period);
            let mut window = self.read_range(itemid, value_type, after, until)?;
            window.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

            let mut last_sec = None;
            for record in window {
                if values.len() >= needed && last_sec != Some(record.timestamp.sec) {
                    break;
                }
                if record.timestamp.sec > count_from {
                    needed += 1;
                }
                last_sec = Some(record.timestamp.sec);
                values.push(record);
            }

            match after {
                Some(after) => until = after,
                None => break,
            }
        }

        Ok(values)
    }

    /// The value at `ts`, or the newest value before it
    fn read_point_or_before(
        &self,
        itemid: ItemId,
        value_type: ValueType,
        ts: Timespec,
    ) -> Result<Option<HistoryRecord>> {
        // all of the target second plus at least one older value
        let candidates = self.read_by_count(itemid, value_type, 1, ts.sec, ts.sec - 1)?;

        Ok(candidates
            .into_iter()
            .filter(|record| record.timestamp <= ts)
            .max_by_key(|record| record.timestamp))
    }
}

// =============================================================================
// In-Memory Store
// =============================================================================

type Table = BTreeMap<Timespec, HistoryValue>;

/// In-memory history store for tests and simulations
///
/// Keeps one table per item and value type. Counts every range read so callers
/// can observe how often the cache went to the store.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    tables: RwLock<HashMap<(ItemId, ValueType), Table>>,
    reads: AtomicU64,
    failing: AtomicBool,
}

impl InMemoryHistoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record under the table of its value type
    pub fn insert(&self, itemid: ItemId, record: HistoryRecord) {
        let key = (itemid, record.value.value_type());
        self.tables
            .write()
            .entry(key)
            .or_default()
            .insert(record.timestamp, record.value);
    }

    /// Store several records
    pub fn insert_many(&self, itemid: ItemId, records: impl IntoIterator<Item = HistoryRecord>) {
        for record in records {
            self.insert(itemid, record);
        }
    }

    /// Number of stored values for an item and value type
    pub fn len(&self, itemid: ItemId, value_type: ValueType) -> usize {
        self.tables
            .read()
            .get(&(itemid, value_type))
            .map_or(0, BTreeMap::len)
    }

    /// Number of range reads served so far
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Make every following read fail until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn read_range(
        &self,
        itemid: ItemId,
        value_type: ValueType,
        after: Option<i64>,
        until: i64,
    ) -> Result<Vec<HistoryRecord>> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        if self.failing.load(Ordering::Relaxed) {
            return Err(Error::BackingStore(format!(
                "read of item {} is unavailable",
                itemid
            )));
        }

        let lower = match after {
            Some(after) => Bound::Included(Timespec::new(after + 1, 0)),
            None => Bound::Unbounded,
        };
        let upper = Bound::Included(Timespec::new(until, i32::MAX));

        if let Bound::Included(low) = lower {
            if low.sec > until {
                return Ok(Vec::new());
            }
        }

        let tables = self.tables.read();
        Ok(tables
            .get(&(itemid, value_type))
            .map(|table| {
                table
                    .range((lower, upper))
                    .map(|(ts, value)| HistoryRecord::new(*ts, value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}
