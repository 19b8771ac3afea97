//! Freelist statistics

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Point-in-time snapshot of a pool, taken under its guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FreeListStats {
    /// Size of each element
    pub element_size: usize,
    /// Whether the pool serializes access internally
    pub thread_safe: bool,
    /// Chunks acquired so far
    pub chunks: usize,
    /// Bytes held across all chunks
    pub reserved_bytes: usize,
    /// Elements carved from all chunks
    pub capacity: usize,
    /// Elements currently on the free list
    pub free: usize,
    /// Elements currently held by callers
    pub allocated: usize,
    /// Elements the next exhaustion refill will request
    pub refill_size: usize,
    /// Refills of any kind, construction included
    pub refills: u64,
    /// Refills triggered by allocating from an empty free list
    pub exhaustion_refills: u64,
    /// Successful allocations
    pub allocations: u64,
    /// Elements returned to the pool
    pub frees: u64,
}

impl FreeListStats {
    /// Every element carved from a chunk is either free or allocated
    pub fn is_conserved(&self) -> bool {
        self.capacity == self.free + self.allocated
    }

    /// Fraction of capacity currently held by callers
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.allocated as f64 / self.capacity as f64
        }
    }
}

/// What a pool handed back to its chunk allocator at teardown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReleaseReport {
    /// Chunks released
    pub chunks: usize,
    /// Bytes released
    pub bytes: usize,
}
