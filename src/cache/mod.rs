//! History Value Cache
//!
//! Bounded, lock-guarded cache of per-item history values sitting in front of a
//! slow history store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                         ValueCache (facade)                              │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  add_values        get_values_by_time / by_count / get_value             │
//! │       │                         │                                        │
//! │       ▼                         ▼                                        │
//! │  ┌──────────────┐      ┌────────────────┐      ┌────────────────────┐    │
//! │  │  CacheItem   │◀─────│  Query engine  │─────▶│   HistoryStore     │    │
//! │  │ chunk deque  │      │ (backfill)     │      │ (external reads)   │    │
//! │  └──────────────┘      └────────────────┘      └────────────────────┘    │
//! │       │                                                                  │
//! │       ▼                                                                  │
//! │  ┌──────────────┐      ┌────────────────┐      ┌────────────────────┐    │
//! │  │    Chunk     │─────▶│  StringPool    │─────▶│  Arena (bounded)   │    │
//! │  └──────────────┘      └────────────────┘      └────────────────────┘    │
//! │                                  ▲                       │               │
//! │                                  └──── Eviction ◀────────┘ out of space  │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Memory Accounting
//!
//! Every structure the cache keeps is charged against a fixed-size [`Arena`].
//! When a charge fails the eviction engine reclaims space from other items and
//! the charge is retried once. If it still fails, the item being updated is
//! dropped so that no half-updated item remains in the cache.

mod arena;
mod chunk;
mod clock;
mod eviction;
mod item;
mod manager;
mod metrics;
mod query;
mod store;
mod strpool;
mod value;

#[cfg(test)]
mod proptest;

pub use arena::{Arena, BoundedArena};
pub use clock::{Clock, ManualClock, SystemClock};
pub use eviction::EvictionPolicy;
pub use manager::{CacheLock, ValueCache};
pub use metrics::{CacheStats, ItemSummary};
pub use store::{HistoryStore, InMemoryHistoryStore};
pub use strpool::{PooledStr, StringPool};
pub use value::{HistoryRecord, HistoryValue, ItemId, LogValue, Timespec, ValueType};

/// Size charged for one value slot inside a chunk
pub const VALUE_SLOT_SIZE: usize = 16;

/// Fixed size charged for every chunk on top of its slots
pub const CHUNK_HEADER_SIZE: usize = 32;

/// Largest chunk allocation
pub const MAX_CHUNK_SIZE: usize = 4 * 1024;

/// Smallest slot count for which three half-full chunks use less memory than two full ones
pub const MIN_CHUNK_RECORDS: usize = 1 + CHUNK_HEADER_SIZE / VALUE_SLOT_SIZE;

/// Largest slot count keeping a chunk within [`MAX_CHUNK_SIZE`]
pub const MAX_CHUNK_RECORDS: usize = (MAX_CHUNK_SIZE - CHUNK_HEADER_SIZE) / VALUE_SLOT_SIZE;

/// Size charged for one cached item record
pub const ITEM_RECORD_SIZE: usize = 64;

/// Size charged for one cached log record header (strings are pooled separately)
pub const LOG_RECORD_SIZE: usize = 40;

/// Minimum number of bytes the eviction engine tries to free per run (64KB)
pub const MIN_FREE_SPACE: usize = 64 * 1024;

/// Items not accessed for this long are evicted first (seconds)
pub const IDLE_ITEM_AGE: i64 = 24 * 60 * 60;

/// Minimum interval between two low-memory warnings (seconds)
pub const LOW_MEMORY_WARNING_PERIOD: i64 = 5 * 60;

// =============================================================================
// Tests
// =============================================================================
