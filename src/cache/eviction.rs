//! Space Reclamation
//!
//! Runs synchronously whenever an arena allocation fails. Items idle for longer
//! than the policy's idle age are dropped first; if that is not enough the cache
//! enters low-memory mode and drops the items with the lowest hit density.
//!
//! The item being served is never a candidate: callers take it out of the item
//! table for the duration of an operation, so the sweep cannot see it.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::arena::Arena;
use super::chunk::Chunk;
use super::item::CacheItem;
use super::strpool::{PooledStr, StringPool};
use super::value::{CachedValue, ItemId};
use super::{IDLE_ITEM_AGE, LOW_MEMORY_WARNING_PERIOD, MIN_FREE_SPACE};
use crate::error::Result;

/// Eviction policy configuration
#[derive(Debug, Clone)]
pub struct EvictionPolicy {
    /// Minimum bytes to free per eviction run
    pub min_free_space: usize,
    /// Items not accessed for longer than this are swept first (seconds)
    pub idle_age: i64,
    /// Minimum interval between low-memory warnings (seconds)
    pub warning_period: i64,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            min_free_space: MIN_FREE_SPACE,
            idle_age: IDLE_ITEM_AGE,
            warning_period: LOW_MEMORY_WARNING_PERIOD,
        }
    }
}

impl EvictionPolicy {
    /// Check if an item should be evicted in the idle sweep
    pub fn is_idle(&self, last_accessed: i64, now: i64) -> bool {
        last_accessed < now - self.idle_age
    }

    /// Hit density of an item; lower weights are evicted first
    pub fn weight(&self, hits: u64, values_total: usize) -> f64 {
        if values_total == 0 {
            0.0
        } else {
            hits as f64 / values_total as f64
        }
    }

    /// Bytes an eviction run should free for a request of `space` bytes
    pub fn target(&self, space: usize) -> usize {
        space.max(self.min_free_space)
    }
}

/// Cache-wide memory pressure state
#[derive(Debug, Default)]
pub(crate) struct MemoryState {
    /// Sticky once the idle sweep alone could not satisfy a request
    pub(crate) low_memory: bool,
    last_warning: Option<i64>,
}

impl MemoryState {
    /// Emit the low-memory warning unless one was emitted recently
    pub(crate) fn warn_low_memory(&mut self, policy: &EvictionPolicy, now: i64) {
        let due = match self.last_warning {
            Some(last) => now - last > policy.warning_period,
            None => true,
        };

        if due {
            self.last_warning = Some(now);
            warn!("value cache is fully used: please increase the cache size");
        }
    }
}

// =============================================================================
// Storage Context
// =============================================================================

/// Allocation context for one cache operation
///
/// Bundles the arena, the string pool and every item except the one being
/// served. Allocations that fail release space and are retried once.
pub(crate) struct Storage<'a> {
    pub(crate) arena: &'a mut dyn Arena,
    pub(crate) pool: &'a mut StringPool,
    pub(crate) items: &'a mut HashMap<ItemId, CacheItem>,
    pub(crate) memory: &'a mut MemoryState,
    pub(crate) policy: &'a EvictionPolicy,
    pub(crate) now: i64,
}

impl Storage<'_> {
    /// Reserve `size` bytes, evicting other items once if the arena is full
    pub(crate) fn allocate(&mut self, size: usize) -> Result<()> {
        match self.arena.alloc(size) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.release_space(size);
                self.arena.alloc(size)
            }
        }
    }

    /// Return `size` bytes to the arena
    pub(crate) fn free(&mut self, size: usize) {
        self.arena.free(size);
    }

    /// Intern a string, evicting other items once if the arena is full
    pub(crate) fn intern(&mut self, s: &str) -> Result<PooledStr> {
        match self.pool.intern(s, &mut *self.arena) {
            Ok(handle) => Ok(handle),
            Err(_) => {
                self.release_space(StringPool::entry_size(s));
                self.pool.intern(s, &mut *self.arena)
            }
        }
    }

    pub(crate) fn release_str(&mut self, handle: PooledStr) -> usize {
        self.pool.release(handle, &mut *self.arena)
    }

    pub(crate) fn release_value(&mut self, value: CachedValue) -> usize {
        value.release(&mut *self.arena, self.pool)
    }

    /// Release a chunk, returning the bytes freed and the values dropped
    pub(crate) fn release_chunk(&mut self, chunk: Chunk) -> (usize, usize) {
        chunk.release(&mut *self.arena, self.pool)
    }

    /// Free at least `space` bytes (floored at the policy minimum) by evicting items
    ///
    /// Returns the number of bytes freed.
    pub(crate) fn release_space(&mut self, space: usize) -> usize {
        let space = self.policy.target(space);
        let now = self.now;
        let mut freed = 0;
        let mut evicted = 0;

        let idle: Vec<ItemId> = self
            .items
            .iter()
            .filter(|(_, item)| self.policy.is_idle(item.last_accessed, now))
            .map(|(itemid, _)| *itemid)
            .collect();

        for itemid in idle {
            freed += self.evict(itemid);
            evicted += 1;
        }

        if freed >= space {
            debug!(space, freed, evicted, "released idle items");
            return freed;
        }

        self.memory.low_memory = true;
        self.memory.warn_low_memory(self.policy, now);

        let mut weights: Vec<(f64, ItemId)> = self
            .items
            .iter()
            .map(|(itemid, item)| (self.policy.weight(item.hits, item.values_total), *itemid))
            .collect();
        weights.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        for (_, itemid) in weights {
            if freed >= space {
                break;
            }
            freed += self.evict(itemid);
            evicted += 1;
        }

        info!(space, freed, evicted, "released cache space in low memory mode");
        freed
    }

    fn evict(&mut self, itemid: ItemId) -> usize {
        match self.items.remove(&itemid) {
            Some(item) => item.release(&mut *self.arena, self.pool),
            None => 0,
        }
    }
}

// =============================================================================
// Test Support
// =============================================================================

/// Owned backing state for building a [`Storage`] in unit tests
#[cfg(test)]
pub(crate) struct TestHeap {
    pub(crate) arena: super::arena::BoundedArena,
    pub(crate) pool: StringPool,
    pub(crate) items: HashMap<ItemId, CacheItem>,
    pub(crate) memory: MemoryState,
    pub(crate) policy: EvictionPolicy,
}

#[cfg(test)]
impl TestHeap {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            arena: super::arena::BoundedArena::new(size),
            pool: StringPool::new(),
            items: HashMap::new(),
            memory: MemoryState::default(),
            policy: EvictionPolicy::default(),
        }
    }

    pub(crate) fn storage(&mut self, now: i64) -> Storage<'_> {
        Storage {
            arena: &mut self.arena,
            pool: &mut self.pool,
            items: &mut self.items,
            memory: &mut self.memory,
            policy: &self.policy,
            now,
        }
    }

    pub(crate) fn used(&self) -> usize {
        self.arena.used_size()
    }

    pub(crate) fn release(&mut self, value: CachedValue) -> usize {
        value.release(&mut self.arena, &mut self.pool)
    }
}
