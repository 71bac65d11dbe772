//! History Values
//!
//! Owned value types exchanged with callers and the history store, plus the
//! cached representation kept inside chunks. Cached numeric values are stored
//! inline; string payloads are interned in the [`StringPool`] and log records
//! get their own arena-charged header.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::arena::Arena;
use super::eviction::Storage;
use super::strpool::{PooledStr, StringPool};
use super::LOG_RECORD_SIZE;
use crate::error::{Error, Result};

/// Item identifier
pub type ItemId = u64;

// =============================================================================
// Timestamps
// =============================================================================

/// Timestamp with nanosecond resolution
///
/// Ordering compares seconds first, then nanoseconds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timespec {
    /// Seconds since the Unix epoch
    pub sec: i64,
    /// Nanoseconds within the second
    pub ns: i32,
}

impl Timespec {
    /// Create a timestamp
    pub const fn new(sec: i64, ns: i32) -> Self {
        Self { sec, ns }
    }
}

impl fmt::Display for Timespec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.ns)
    }
}

// =============================================================================
// Value Types
// =============================================================================

/// Value type of an item's history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Floating point numbers
    Float,
    /// Short strings
    Str,
    /// Log records
    Log,
    /// Unsigned 64-bit integers
    Uint64,
    /// Long text
    Text,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Float => write!(f, "float"),
            ValueType::Str => write!(f, "str"),
            ValueType::Log => write!(f, "log"),
            ValueType::Uint64 => write!(f, "uint64"),
            ValueType::Text => write!(f, "text"),
        }
    }
}

/// Log record payload
#[derive(Debug, Clone, PartialEq)]
pub struct LogValue {
    /// Timestamp reported by the log source
    pub timestamp: i64,
    /// Event identifier
    pub logeventid: i64,
    /// Severity
    pub severity: i32,
    /// Log source, when known
    pub source: Option<String>,
    /// Log line
    pub value: String,
}

impl LogValue {
    /// Create a log payload with only a message
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            timestamp: 0,
            logeventid: 0,
            severity: 0,
            source: None,
            value: value.into(),
        }
    }
}

/// Owned history value
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryValue {
    Float(f64),
    Uint64(u64),
    Str(String),
    Text(String),
    Log(LogValue),
}

impl HistoryValue {
    /// Value type this payload belongs to
    pub fn value_type(&self) -> ValueType {
        match self {
            HistoryValue::Float(_) => ValueType::Float,
            HistoryValue::Uint64(_) => ValueType::Uint64,
            HistoryValue::Str(_) => ValueType::Str,
            HistoryValue::Text(_) => ValueType::Text,
            HistoryValue::Log(_) => ValueType::Log,
        }
    }
}

impl fmt::Display for HistoryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryValue::Float(v) => write!(f, "{:.6}", v),
            HistoryValue::Uint64(v) => write!(f, "{}", v),
            HistoryValue::Str(s) | HistoryValue::Text(s) => f.write_str(s),
            HistoryValue::Log(log) => f.write_str(&log.value),
        }
    }
}

/// Timestamped history value
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub timestamp: Timespec,
    pub value: HistoryValue,
}

impl HistoryRecord {
    /// Create a record
    pub fn new(timestamp: Timespec, value: HistoryValue) -> Self {
        Self { timestamp, value }
    }

    /// Create a float record at `sec.ns`
    pub fn float(sec: i64, ns: i32, value: f64) -> Self {
        Self::new(Timespec::new(sec, ns), HistoryValue::Float(value))
    }

    /// Create an unsigned integer record at `sec.ns`
    pub fn uint64(sec: i64, ns: i32, value: u64) -> Self {
        Self::new(Timespec::new(sec, ns), HistoryValue::Uint64(value))
    }
}

// =============================================================================
// Cached Representation
// =============================================================================

/// Log record as kept in the cache
#[derive(Debug)]
pub(crate) struct CachedLog {
    timestamp: i64,
    logeventid: i64,
    severity: i32,
    source: Option<PooledStr>,
    value: PooledStr,
}

/// Value as kept in a chunk slot
#[derive(Debug)]
pub(crate) enum CachedValue {
    Float(f64),
    Uint64(u64),
    Str(PooledStr),
    Text(PooledStr),
    Log(Box<CachedLog>),
}

impl CachedValue {
    /// Copy `value` into the cache, interning its strings
    ///
    /// A partially built log record is rolled back before the error is returned.
    pub(crate) fn store(
        value: &HistoryValue,
        value_type: ValueType,
        storage: &mut Storage<'_>,
    ) -> Result<Self> {
        if value.value_type() != value_type {
            return Err(Error::ValueTypeMismatch {
                expected: value_type,
                found: value.value_type(),
            });
        }

        match value {
            HistoryValue::Float(v) => Ok(CachedValue::Float(*v)),
            HistoryValue::Uint64(v) => Ok(CachedValue::Uint64(*v)),
            HistoryValue::Str(s) => Ok(CachedValue::Str(storage.intern(s)?)),
            HistoryValue::Text(s) => Ok(CachedValue::Text(storage.intern(s)?)),
            HistoryValue::Log(log) => {
                storage.allocate(LOG_RECORD_SIZE)?;

                let source = match log.source.as_deref().map(|s| storage.intern(s)).transpose() {
                    Ok(source) => source,
                    Err(e) => {
                        storage.free(LOG_RECORD_SIZE);
                        return Err(e);
                    }
                };

                let text = match storage.intern(&log.value) {
                    Ok(text) => text,
                    Err(e) => {
                        if let Some(source) = source {
                            storage.release_str(source);
                        }
                        storage.free(LOG_RECORD_SIZE);
                        return Err(e);
                    }
                };

                Ok(CachedValue::Log(Box::new(CachedLog {
                    timestamp: log.timestamp,
                    logeventid: log.logeventid,
                    severity: log.severity,
                    source,
                    value: text,
                })))
            }
        }
    }

    /// Duplicate the cached value into an owned one
    pub(crate) fn load(&self) -> HistoryValue {
        match self {
            CachedValue::Float(v) => HistoryValue::Float(*v),
            CachedValue::Uint64(v) => HistoryValue::Uint64(*v),
            CachedValue::Str(s) => HistoryValue::Str(s.to_string()),
            CachedValue::Text(s) => HistoryValue::Text(s.to_string()),
            CachedValue::Log(log) => HistoryValue::Log(LogValue {
                timestamp: log.timestamp,
                logeventid: log.logeventid,
                severity: log.severity,
                source: log.source.as_ref().map(|s| s.to_string()),
                value: log.value.to_string(),
            }),
        }
    }

    /// Release everything the value holds, returning the arena bytes freed
    pub(crate) fn release(self, arena: &mut dyn Arena, pool: &mut StringPool) -> usize {
        match self {
            CachedValue::Float(_) | CachedValue::Uint64(_) => 0,
            CachedValue::Str(s) | CachedValue::Text(s) => pool.release(s, arena),
            CachedValue::Log(log) => {
                let CachedLog { source, value, .. } = *log;
                let mut freed = LOG_RECORD_SIZE;
                arena.free(LOG_RECORD_SIZE);
                if let Some(source) = source {
                    freed += pool.release(source, arena);
                }
                freed + pool.release(value, arena)
            }
        }
    }
}

/// One occupied chunk slot
#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) timestamp: Timespec,
    pub(crate) value: CachedValue,
}

impl Slot {
    /// Owned copy of the slot contents
    pub(crate) fn to_record(&self) -> HistoryRecord {
        HistoryRecord::new(self.timestamp, self.value.load())
    }

    pub(crate) fn sec(&self) -> i64 {
        self.timestamp.sec
    }
}
