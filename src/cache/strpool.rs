//! String Pool
//!
//! Reference-counted interning table for string and log payloads. Identical
//! contents share one allocation; the entry is freed when the last handle is
//! released.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use super::arena::Arena;
use crate::error::Result;

/// Bytes charged for the reference counter of a pooled string
const REFCOUNT_SIZE: usize = 4;

/// Bytes charged for the lookup table entry of a pooled string
const TABLE_ENTRY_SIZE: usize = 16;

/// Handle to a pooled string
///
/// Handles are not `Clone`: every handle stands for one reference held in the
/// pool and must be given back through [`StringPool::release`].
#[derive(Debug, PartialEq, Eq)]
pub struct PooledStr(Arc<str>);

impl PooledStr {
    /// Borrow the pooled content
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if both handles point to the same pooled allocation
    pub fn ptr_eq(a: &PooledStr, b: &PooledStr) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl Deref for PooledStr {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PooledStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Interning table mapping string content to a shared, counted allocation
#[derive(Debug, Default)]
pub struct StringPool {
    entries: HashMap<Arc<str>, u32>,
}

impl StringPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Arena bytes charged for a pooled copy of `s`
    pub fn entry_size(s: &str) -> usize {
        s.len() + 1 + REFCOUNT_SIZE + TABLE_ENTRY_SIZE
    }

    /// Intern `s`, sharing an existing entry when the content is already pooled
    ///
    /// Only a new entry is charged against the arena.
    pub fn intern(&mut self, s: &str, arena: &mut dyn Arena) -> Result<PooledStr> {
        if let Some((key, _)) = self.entries.get_key_value(s) {
            let handle = PooledStr(Arc::clone(key));
            if let Some(refs) = self.entries.get_mut(s) {
                *refs += 1;
            }
            return Ok(handle);
        }

        arena.alloc(Self::entry_size(s))?;

        let key: Arc<str> = Arc::from(s);
        self.entries.insert(Arc::clone(&key), 1);
        Ok(PooledStr(key))
    }

    /// Drop one reference, freeing the entry when it was the last one
    ///
    /// Returns the number of arena bytes freed.
    pub fn release(&mut self, handle: PooledStr, arena: &mut dyn Arena) -> usize {
        let key = handle.as_str();

        let remaining = match self.entries.get_mut(key) {
            Some(refs) => {
                *refs -= 1;
                *refs
            }
            None => return 0,
        };

        if remaining > 0 {
            return 0;
        }

        self.entries.remove(key);
        let size = Self::entry_size(key);
        arena.free(size);
        size
    }

    /// Current reference count of `s`, if pooled
    pub fn refcount(&self, s: &str) -> Option<u32> {
        self.entries.get(s).copied()
    }

    /// Number of distinct pooled strings
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is pooled
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
