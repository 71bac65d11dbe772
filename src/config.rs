//! Cache Configuration
//!
//! Sizing and eviction tunables, loadable from YAML. Sizes accept either a
//! plain byte count or a string with a binary unit suffix (`"64M"`, `"1G"`).

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::cache::{EvictionPolicy, IDLE_ITEM_AGE, LOW_MEMORY_WARNING_PERIOD, MIN_FREE_SPACE};
use crate::error::{Error, Result};

/// Default cache size (8 MiB)
pub const DEFAULT_CACHE_SIZE: usize = 8 * 1024 * 1024;

/// Value cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct CacheConfig {
    /// Arena capacity in bytes; 0 disables the cache
    #[serde(deserialize_with = "deserialize_size")]
    pub size: usize,
    /// Minimum bytes freed per eviction run
    #[serde(deserialize_with = "deserialize_size")]
    pub min_free_space: usize,
    /// Items idle for longer than this many seconds are evicted first
    pub idle_item_age: i64,
    /// Minimum seconds between low-memory warnings
    pub low_memory_warning_period: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CACHE_SIZE,
            min_free_space: MIN_FREE_SPACE,
            idle_item_age: IDLE_ITEM_AGE,
            low_memory_warning_period: LOW_MEMORY_WARNING_PERIOD,
        }
    }
}

impl CacheConfig {
    /// Config with the given size and default tunables
    pub fn with_size(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    /// Load and validate a YAML config file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the tunables for consistency
    pub fn validate(&self) -> Result<()> {
        if self.idle_item_age <= 0 {
            return Err(Error::Config(format!(
                "idle_item_age must be positive, got {}",
                self.idle_item_age
            )));
        }
        if self.low_memory_warning_period < 0 {
            return Err(Error::Config(format!(
                "low_memory_warning_period must not be negative, got {}",
                self.low_memory_warning_period
            )));
        }
        if self.min_free_space == 0 {
            return Err(Error::Config("min_free_space must be positive".to_string()));
        }
        Ok(())
    }

    /// A zero size disables the cache
    pub fn is_enabled(&self) -> bool {
        self.size > 0
    }

    /// Eviction policy derived from the tunables
    pub fn eviction_policy(&self) -> EvictionPolicy {
        EvictionPolicy {
            min_free_space: self.min_free_space,
            idle_age: self.idle_item_age,
            warning_period: self.low_memory_warning_period,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Bytes(u64),
    Text(String),
}

fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let bytes = match SizeValue::deserialize(deserializer)? {
        SizeValue::Bytes(bytes) => bytes,
        SizeValue::Text(text) => parse_size(&text).map_err(serde::de::Error::custom)?,
    };
    usize::try_from(bytes).map_err(serde::de::Error::custom)
}

/// Parse a size string like "512", "64K", "8M" or "1G" into bytes
///
/// Units are binary multiples and case insensitive; an optional trailing `B`
/// is accepted ("64KB").
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::SizeParse("empty size string".to_string()));
    }

    let digits = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (number, unit) = s.split_at(digits);

    let num: u64 = number
        .parse()
        .map_err(|_| Error::SizeParse(format!("invalid number in size: {}", s)))?;

    let unit = unit.trim().to_ascii_uppercase();
    let unit = unit.strip_suffix('B').unwrap_or(&unit);

    let multiplier: u64 = match unit {
        "" => 1,
        "K" => 1 << 10,
        "M" => 1 << 20,
        "G" => 1 << 30,
        "T" => 1 << 40,
        _ => {
            return Err(Error::SizeParse(format!(
                "unknown size unit: {}",
                unit
            )))
        }
    };

    num.checked_mul(multiplier)
        .ok_or_else(|| Error::SizeParse(format!("size overflows: {}", s)))
}
