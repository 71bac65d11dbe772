//! Value Cache - Bounded History Cache
//!
//! A process-local cache of per-item historical values sitting in front of a
//! slow history store. Recent values are appended as they are collected; older
//! values are backfilled on demand when a query reaches below what is cached.
//! All memory is charged against a fixed-size arena and reclaimed by evicting
//! idle and rarely hit items.
//!
//! # Architecture
//!
//! ```text
//! collector ──add_values──▶ ValueCache ◀──get_values_*── readers
//!                               │
//!                     miss ─────┴────▶ HistoryStore
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Cache engine: arena, chunks, items, queries, eviction
//! - [`config`] - Cache configuration and size parsing
//! - [`error`] - Error types

pub mod cache;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use cache::{
    CacheStats, HistoryRecord, HistoryStore, HistoryValue, InMemoryHistoryStore, ItemId,
    Timespec, ValueCache, ValueType,
};
pub use config::CacheConfig;
pub use error::{Error, Result};
