//! Cache Statistics
//!
//! Point-in-time statistics snapshots and their Prometheus text exposition.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use serde::Serialize;

use super::value::{ItemId, ValueType};
use crate::error::{Error, Result};

/// Cache-wide statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Values served from the cache
    pub hits: u64,
    /// Values that had to be read from the history store
    pub misses: u64,
    /// Set once the cache had to evict recently used items
    pub low_memory: bool,
    /// Arena capacity in bytes
    pub total_size: usize,
    /// Arena bytes in use
    pub used_size: usize,
    /// Number of cached items
    pub items: usize,
}

impl CacheStats {
    /// Arena bytes still available
    pub fn free_size(&self) -> usize {
        self.total_size.saturating_sub(self.used_size)
    }

    /// Fraction of requested values served from the cache
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Register the snapshot's values in `registry`
    pub fn export(&self, registry: &Registry) -> Result<()> {
        let hits = IntCounter::new("valuecache_hits_total", "Values served from the cache")?;
        hits.inc_by(self.hits);
        registry.register(Box::new(hits))?;

        let misses = IntCounter::new(
            "valuecache_misses_total",
            "Values read from the history store",
        )?;
        misses.inc_by(self.misses);
        registry.register(Box::new(misses))?;

        let gauges = [
            (
                "valuecache_low_memory",
                "Whether the cache runs in low memory mode",
                i64::from(self.low_memory),
            ),
            (
                "valuecache_memory_total_bytes",
                "Cache arena capacity",
                self.total_size as i64,
            ),
            (
                "valuecache_memory_used_bytes",
                "Cache arena bytes in use",
                self.used_size as i64,
            ),
            ("valuecache_items", "Number of cached items", self.items as i64),
        ];

        for (name, help, value) in gauges {
            let gauge = IntGauge::new(name, help)?;
            gauge.set(value);
            registry.register(Box::new(gauge))?;
        }

        Ok(())
    }

    /// Render the snapshot in the Prometheus text format
    pub fn render_prometheus(&self) -> Result<String> {
        let registry = Registry::new();
        self.export(&registry)?;

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }
}

/// Snapshot of one cached item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSummary {
    pub itemid: ItemId,
    pub value_type: ValueType,
    /// Number of cached values
    pub values: usize,
    /// Number of chunks holding them
    pub chunks: usize,
    /// Retention span in seconds; 0 if unknown
    pub range: i64,
    /// True once the store has nothing older than the cached values
    pub fully_cached: bool,
    pub hits: u64,
    pub last_accessed: i64,
}
