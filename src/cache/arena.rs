//! Bounded Arena
//!
//! Byte accounting for every structure the cache owns. The arena never grows:
//! an allocation that does not fit fails with [`Error::OutOfSpace`] and the
//! caller decides whether to release space and retry.

use tracing::trace;

use crate::error::{Error, Result};

/// Bounded allocator contract used by the cache
pub trait Arena: Send {
    /// Reserve `size` bytes, failing instead of growing when exhausted
    fn alloc(&mut self, size: usize) -> Result<()>;

    /// Return `size` previously reserved bytes
    fn free(&mut self, size: usize);

    /// Resize a reservation from `old` to `new` bytes
    ///
    /// On failure the original reservation is left untouched.
    fn realloc(&mut self, old: usize, new: usize) -> Result<()> {
        if new > old {
            self.alloc(new - old)
        } else {
            self.free(old - new);
            Ok(())
        }
    }

    /// Total arena capacity in bytes
    fn total_size(&self) -> usize;

    /// Bytes currently reserved
    fn used_size(&self) -> usize;

    /// Bytes still available
    fn free_size(&self) -> usize {
        self.total_size().saturating_sub(self.used_size())
    }
}

/// Fixed-capacity arena backed by a simple usage counter
#[derive(Debug, Clone)]
pub struct BoundedArena {
    total: usize,
    used: usize,
    peak: usize,
}

impl BoundedArena {
    /// Create an arena with the given capacity in bytes
    pub fn new(total: usize) -> Self {
        Self {
            total,
            used: 0,
            peak: 0,
        }
    }

    /// Highest usage observed since creation
    pub fn peak_size(&self) -> usize {
        self.peak
    }
}

impl Arena for BoundedArena {
    fn alloc(&mut self, size: usize) -> Result<()> {
        if size > self.total - self.used {
            trace!(size, used = self.used, total = self.total, "arena exhausted");
            return Err(Error::OutOfSpace { requested: size });
        }

        self.used += size;
        self.peak = self.peak.max(self.used);
        Ok(())
    }

    fn free(&mut self, size: usize) {
        debug_assert!(size <= self.used, "freeing more than was allocated");
        self.used = self.used.saturating_sub(size);
    }

    fn total_size(&self) -> usize {
        self.total
    }

    fn used_size(&self) -> usize {
        self.used
    }
}
