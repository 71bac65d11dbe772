//! Query Engine
//!
//! Time range, count and point reads over one cached item. Each read first
//! makes sure the cache covers the request, backfilling older history from the
//! store below the cached tail when it does not, then answers from the chunks.

use tracing::trace;

use super::eviction::Storage;
use super::item::CacheItem;
use super::store::HistoryStore;
use super::value::{HistoryRecord, Slot, Timespec};
use crate::error::Result;

/// Hit and miss counts of one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ReadStats {
    pub(crate) hits: u64,
    pub(crate) misses: u64,
}

impl ReadStats {
    /// Split `returned` values into hits and misses given `read` backfilled values
    ///
    /// Backfilled values count as misses even when more were read than
    /// returned; the rest of the returned values are hits.
    pub(crate) fn split(returned: usize, read: usize) -> Self {
        let misses = read.min(returned);
        Self {
            hits: (returned - misses) as u64,
            misses: misses as u64,
        }
    }
}

impl CacheItem {
    // =========================================================================
    // Coverage
    // =========================================================================

    /// Make sure values in `(timestamp - seconds, timestamp]` are cached
    ///
    /// Returns the number of values read from the store.
    pub(crate) fn cache_by_time(
        &mut self,
        seconds: i64,
        timestamp: i64,
        store: &dyn HistoryStore,
        storage: &mut Storage<'_>,
    ) -> Result<usize> {
        let now = storage.now;
        let start = timestamp - seconds;

        let (update_seconds, update_end) = match self.oldest() {
            None => (now - timestamp + seconds, now),
            Some(oldest) if start < now - self.range => {
                let end = oldest.sec() - 1;
                (end - start, end)
            }
            Some(_) => (0, 0),
        };

        if update_seconds <= 0 || self.fully_cached {
            return Ok(0);
        }

        let mut records =
            store.read_by_time(self.itemid, self.value_type, update_seconds, update_end)?;
        trace!(
            itemid = self.itemid,
            seconds = update_seconds,
            end = update_end,
            read = records.len(),
            "backfilled by time"
        );

        self.prepend_sorted(&mut records, storage)
    }

    /// Make sure `count` values at or before `timestamp` are cached
    ///
    /// Returns the number of values read from the store.
    pub(crate) fn cache_by_count(
        &mut self,
        count: usize,
        timestamp: i64,
        store: &dyn HistoryStore,
        storage: &mut Storage<'_>,
    ) -> Result<usize> {
        let (cached, update_end) = match self.oldest() {
            Some(oldest) => (self.count_at_or_before(timestamp, count), oldest.sec() - 1),
            None => (0, storage.now),
        };

        if self.fully_cached || cached >= count {
            return Ok(0);
        }

        let mut records = store.read_by_count(
            self.itemid,
            self.value_type,
            count - cached,
            update_end,
            timestamp,
        )?;
        trace!(
            itemid = self.itemid,
            count = count - cached,
            end = update_end,
            read = records.len(),
            "backfilled by count"
        );

        self.prepend_sorted(&mut records, storage)
    }

    fn prepend_sorted(
        &mut self,
        records: &mut [HistoryRecord],
        storage: &mut Storage<'_>,
    ) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        self.prepend_values(records, storage)?;
        Ok(records.len())
    }

    // =========================================================================
    // Cached Reads
    // =========================================================================

    /// Cached values in `(timestamp - seconds, timestamp]`, newest first
    pub(crate) fn values_by_time(
        &mut self,
        seconds: i64,
        timestamp: i64,
        now: i64,
    ) -> Vec<HistoryRecord> {
        // a zero range on a fully cached item means a count request of unknown span
        if self.range != 0 || !self.fully_cached {
            self.range = self.range.max(seconds + now - timestamp);
        }

        let start = timestamp - seconds;
        match self.find_at_or_before(timestamp) {
            Some(pos) => self
                .iter_back_from(pos)
                .take_while(|slot| slot.sec() > start)
                .map(Slot::to_record)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Up to `count` cached values at or before `timestamp`, newest first
    pub(crate) fn values_by_count(
        &mut self,
        count: usize,
        timestamp: i64,
        now: i64,
    ) -> Vec<HistoryRecord> {
        let values: Vec<HistoryRecord> = match self.find_at_or_before(timestamp) {
            Some(pos) => self
                .iter_back_from(pos)
                .take(count)
                .map(Slot::to_record)
                .collect(),
            None => Vec::new(),
        };

        if values.len() < count {
            // the store has nothing more to give
            self.range = 0;
            self.fully_cached = true;
        } else if let Some(oldest) = values.last() {
            self.range = self.range.max(now - oldest.timestamp.sec);
        }

        values
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Values in `(timestamp - seconds, timestamp]`, newest first, with backfill
    pub(crate) fn read_by_time(
        &mut self,
        seconds: i64,
        timestamp: i64,
        store: &dyn HistoryStore,
        storage: &mut Storage<'_>,
    ) -> Result<(Vec<HistoryRecord>, ReadStats)> {
        let read = self.cache_by_time(seconds, timestamp, store, storage)?;
        let values = self.values_by_time(seconds, timestamp, storage.now);

        Ok(self.account(values, read))
    }

    /// `count` newest values at or before `timestamp`, newest first, with backfill
    pub(crate) fn read_by_count(
        &mut self,
        count: usize,
        timestamp: i64,
        store: &dyn HistoryStore,
        storage: &mut Storage<'_>,
    ) -> Result<(Vec<HistoryRecord>, ReadStats)> {
        let read = self.cache_by_count(count, timestamp, store, storage)?;
        let values = self.values_by_count(count, timestamp, storage.now);

        self.max_request_count = self.max_request_count.max(values.len().max(count));
        Ok(self.account(values, read))
    }

    /// Value at `ts` or the newest one before it, with backfill
    ///
    /// A request is a hit when the oldest cached value is not newer than `ts`.
    /// Statistics only count requests that found a value.
    pub(crate) fn read_point(
        &mut self,
        ts: Timespec,
        store: &dyn HistoryStore,
        storage: &mut Storage<'_>,
    ) -> Result<(Option<HistoryRecord>, ReadStats)> {
        let covered = self.oldest().is_some_and(|oldest| oldest.timestamp <= ts);

        let stats = if covered {
            ReadStats { hits: 1, misses: 0 }
        } else {
            // count from the previous second so older values behind a
            // partially covered target second are fetched too
            self.cache_by_count(1, ts.sec - 1, store, storage)?;
            ReadStats { hits: 0, misses: 1 }
        };

        let found = self
            .find_at_or_before_ts(ts)
            .and_then(|pos| self.slot(pos))
            .map(Slot::to_record);

        match found {
            Some(record) => {
                self.max_request_count = self.max_request_count.max(1);
                self.range = self.range.max(storage.now - record.timestamp.sec);
                self.hits += stats.hits;
                Ok((Some(record), stats))
            }
            None => {
                self.fully_cached = true;
                Ok((None, ReadStats::default()))
            }
        }
    }

    fn account(
        &mut self,
        values: Vec<HistoryRecord>,
        read: usize,
    ) -> (Vec<HistoryRecord>, ReadStats) {
        let stats = ReadStats::split(values.len(), read);
        self.hits += stats.hits;
        (values, stats)
    }
}
