//! Value Cache Facade
//!
//! The public entry point. Every operation runs under one reentrant,
//! process-wide lock; callers may take that lock explicitly with
//! [`ValueCache::lock`] to batch several operations into one critical section.
//!
//! The item being served is taken out of the item table for the duration of
//! the operation. If it cannot be updated consistently it is dropped rather
//! than put back half-updated.

use std::cell::{RefCell, RefMut};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, info, instrument};

use super::arena::{Arena, BoundedArena};
use super::clock::{Clock, SystemClock};
use super::eviction::{EvictionPolicy, MemoryState, Storage};
use super::item::CacheItem;
use super::metrics::{CacheStats, ItemSummary};
use super::query::ReadStats;
use super::store::HistoryStore;
use super::strpool::StringPool;
use super::value::{HistoryRecord, ItemId, Timespec, ValueType};
use super::ITEM_RECORD_SIZE;
use crate::config::CacheConfig;
use crate::error::{Error, Result};

/// Everything guarded by the cache lock
struct CacheCore {
    arena: Box<dyn Arena>,
    pool: StringPool,
    items: HashMap<ItemId, CacheItem>,
    memory: MemoryState,
    policy: EvictionPolicy,
    hits: u64,
    misses: u64,
}

impl CacheCore {
    fn new(config: &CacheConfig) -> Self {
        Self {
            arena: Box::new(BoundedArena::new(config.size)),
            pool: StringPool::new(),
            items: HashMap::new(),
            memory: MemoryState::default(),
            policy: config.eviction_policy(),
            hits: 0,
            misses: 0,
        }
    }

    fn storage(&mut self, now: i64) -> Storage<'_> {
        Storage {
            arena: &mut *self.arena,
            pool: &mut self.pool,
            items: &mut self.items,
            memory: &mut self.memory,
            policy: &self.policy,
            now,
        }
    }

    /// Take an item out of the table for an operation, resetting it if its
    /// value type changed
    fn checkout(&mut self, itemid: ItemId, value_type: ValueType) -> Option<CacheItem> {
        let mut item = self.items.remove(&itemid)?;

        if item.value_type != value_type {
            let freed = item.change_value_type(value_type, &mut *self.arena, &mut self.pool);
            debug!(itemid, %value_type, freed, "value type changed, cached history dropped");
        }

        Some(item)
    }

    /// Put an item back after a failed operation, or drop it
    ///
    /// Store failures leave the item untouched. Anything else may have left
    /// it partially updated.
    fn settle_failure(&mut self, item: CacheItem, err: &Error) {
        match err {
            Error::BackingStore(_) => {
                self.items.insert(item.itemid, item);
            }
            _ => {
                let itemid = item.itemid;
                let freed = item.release(&mut *self.arena, &mut self.pool);
                debug!(itemid, freed, error = %err, "dropped item after failed update");
            }
        }
    }
}

fn borrow_core(cell: &RefCell<CacheCore>) -> Result<RefMut<'_, CacheCore>> {
    cell.try_borrow_mut()
        .map_err(|_| Error::Internal("value cache re-entered during an operation".to_string()))
}

/// Guard holding the cache lock across several operations
///
/// Operations called on the same thread while the guard is alive do not block.
/// Dropping the guard releases the lock.
pub struct CacheLock<'a> {
    _guard: ReentrantMutexGuard<'a, RefCell<CacheCore>>,
}

impl CacheLock<'_> {
    /// Release the lock
    pub fn unlock(self) {}
}

/// Bounded cache of item history values in front of a [`HistoryStore`]
///
/// A cache built with a zero size is disabled: every call returns
/// [`Error::Disabled`] and callers read the store directly.
pub struct ValueCache {
    inner: Option<ReentrantMutex<RefCell<CacheCore>>>,
    store: Arc<dyn HistoryStore>,
    clock: Arc<dyn Clock>,
}

impl ValueCache {
    /// Create a cache driven by the system clock
    pub fn new(config: &CacheConfig, store: Arc<dyn HistoryStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit clock
    pub fn with_clock(
        config: &CacheConfig,
        store: Arc<dyn HistoryStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let inner = if config.is_enabled() {
            info!(size = config.size, "value cache created");
            Some(ReentrantMutex::new(RefCell::new(CacheCore::new(config))))
        } else {
            info!("value cache disabled");
            None
        };

        Self {
            inner,
            store,
            clock,
        }
    }

    /// Check if the cache is enabled
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    fn core(&self) -> Result<&ReentrantMutex<RefCell<CacheCore>>> {
        self.inner.as_ref().ok_or(Error::Disabled)
    }

    /// Take the cache lock until the returned guard is dropped
    pub fn lock(&self) -> Result<CacheLock<'_>> {
        Ok(CacheLock {
            _guard: self.core()?.lock(),
        })
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Add newly collected values of an item
    ///
    /// Only items already cached by a previous read are updated; values of
    /// other items are ignored. On failure the item is dropped from the cache
    /// and the error returned, which means "not cached" rather than data loss.
    #[instrument(skip(self, values), fields(count = values.len()))]
    pub fn add_values(
        &self,
        itemid: ItemId,
        value_type: ValueType,
        mut values: Vec<HistoryRecord>,
    ) -> Result<()> {
        let inner = self.core()?;

        if let Some(record) = values.iter().find(|r| r.value.value_type() != value_type) {
            return Err(Error::ValueTypeMismatch {
                expected: value_type,
                found: record.value.value_type(),
            });
        }
        if values.is_empty() {
            return Ok(());
        }
        values.sort_by_key(|record| record.timestamp);

        let now = self.clock.now();
        let guard = inner.lock();
        let mut cell = borrow_core(&guard)?;
        let core = &mut *cell;

        let Some(mut item) = core.checkout(itemid, value_type) else {
            return Ok(());
        };

        match item.append_values(&values, &mut core.storage(now)) {
            Ok(()) => {
                debug!(values = item.values_total, "values added");
                core.items.insert(itemid, item);
                Ok(())
            }
            Err(err) => {
                core.settle_failure(item, &err);
                Err(err)
            }
        }
    }

    /// Add one newly collected value of an item
    pub fn add_value(
        &self,
        itemid: ItemId,
        value_type: ValueType,
        record: HistoryRecord,
    ) -> Result<()> {
        self.add_values(itemid, value_type, vec![record])
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Values in `(timestamp - seconds, timestamp]`, newest first
    #[instrument(skip(self))]
    pub fn get_values_by_time(
        &self,
        itemid: ItemId,
        value_type: ValueType,
        seconds: i64,
        timestamp: i64,
    ) -> Result<Vec<HistoryRecord>> {
        self.core()?;
        if seconds <= 0 {
            return Ok(Vec::new());
        }

        self.read_item(itemid, value_type, |item, store, storage| {
            item.read_by_time(seconds, timestamp, store, storage)
        })
    }

    /// The `count` newest values at or before `timestamp`, newest first
    ///
    /// Fewer values are returned when the history is shorter.
    #[instrument(skip(self))]
    pub fn get_values_by_count(
        &self,
        itemid: ItemId,
        value_type: ValueType,
        count: usize,
        timestamp: i64,
    ) -> Result<Vec<HistoryRecord>> {
        self.core()?;
        if count == 0 {
            return Ok(Vec::new());
        }

        self.read_item(itemid, value_type, |item, store, storage| {
            item.read_by_count(count, timestamp, store, storage)
        })
    }

    /// The value at `ts`, or the newest value before it
    #[instrument(skip(self))]
    pub fn get_value(
        &self,
        itemid: ItemId,
        value_type: ValueType,
        ts: Timespec,
    ) -> Result<HistoryRecord> {
        self.read_item(itemid, value_type, |item, store, storage| {
            item.read_point(ts, store, storage)
        })?
        .ok_or(Error::NotFound)
    }

    fn read_item<T>(
        &self,
        itemid: ItemId,
        value_type: ValueType,
        read: impl FnOnce(&mut CacheItem, &dyn HistoryStore, &mut Storage<'_>) -> Result<(T, ReadStats)>,
    ) -> Result<T> {
        let inner = self.core()?;
        let now = self.clock.now();
        let guard = inner.lock();
        let mut cell = borrow_core(&guard)?;
        let core = &mut *cell;

        if core.memory.low_memory {
            core.memory.warn_low_memory(&core.policy, now);
        }

        let mut item = match core.checkout(itemid, value_type) {
            Some(item) => item,
            // no new items once space ran out, the caller reads the store
            None if core.memory.low_memory => {
                debug!(itemid, "not caching new item in low memory mode");
                return Err(Error::OutOfSpace {
                    requested: ITEM_RECORD_SIZE,
                });
            }
            None => {
                core.storage(now).allocate(ITEM_RECORD_SIZE)?;
                CacheItem::new(itemid, value_type, now)
            }
        };

        match read(&mut item, self.store.as_ref(), &mut core.storage(now)) {
            Ok((value, stats)) => {
                debug!(hits = stats.hits, misses = stats.misses, "read served");
                item.last_accessed = now;
                core.hits += stats.hits;
                core.misses += stats.misses;
                core.items.insert(itemid, item);
                Ok(value)
            }
            Err(err) => {
                core.settle_failure(item, &err);
                Err(err)
            }
        }
    }

    // =========================================================================
    // Statistics and Maintenance
    // =========================================================================

    /// Cache-wide statistics snapshot
    pub fn statistics(&self) -> Result<CacheStats> {
        let guard = self.core()?.lock();
        let core = borrow_core(&guard)?;

        Ok(CacheStats {
            hits: core.hits,
            misses: core.misses,
            low_memory: core.memory.low_memory,
            total_size: core.arena.total_size(),
            used_size: core.arena.used_size(),
            items: core.items.len(),
        })
    }

    /// Snapshot of one cached item, if cached
    pub fn item_summary(&self, itemid: ItemId) -> Result<Option<ItemSummary>> {
        let guard = self.core()?.lock();
        let core = borrow_core(&guard)?;

        Ok(core.items.get(&itemid).map(|item| ItemSummary {
            itemid,
            value_type: item.value_type,
            values: item.values_total,
            chunks: item.chunk_count(),
            range: item.range,
            fully_cached: item.fully_cached,
            hits: item.hits,
            last_accessed: item.last_accessed,
        }))
    }

    /// Drop every cached item and return its space to the arena
    #[instrument(skip(self))]
    pub fn clear(&self) -> Result<()> {
        let guard = self.core()?.lock();
        let mut cell = borrow_core(&guard)?;
        let core = &mut *cell;

        let mut freed = 0;
        let count = core.items.len();
        for (_, item) in core.items.drain() {
            freed += item.release(&mut *core.arena, &mut core.pool);
        }

        info!(items = count, freed, "value cache cleared");
        Ok(())
    }

    /// Cached timestamps of an item in ascending order
    #[cfg(test)]
    pub(crate) fn cached_timestamps(&self, itemid: ItemId) -> Vec<Timespec> {
        let Some(inner) = self.inner.as_ref() else {
            return Vec::new();
        };
        let guard = inner.lock();
        let core = guard.borrow();

        core.items
            .get(&itemid)
            .map(|item| item.values().map(|slot| slot.timestamp).collect())
            .unwrap_or_default()
    }
}
