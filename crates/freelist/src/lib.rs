//! Fixed-size element freelists for Nebula network providers
//!
//! This crate provides a slab-style pool of equally-sized elements,
//! tuned for the per-packet and per-connection records of protocol stacks:
//!
//! - Bulk chunk allocation with a configurable initial fill
//! - On-demand refill with geometric growth up to a ceiling
//! - FIFO reuse of returned elements
//! - Optional pool-wide locking for shared use
//! - Pluggable, budgetable chunk memory
//!
//! # Features
//!
//! - `serde`: Serialize/deserialize configuration and statistics
//!
//! # Example
//!
//! ```
//! use nebula_freelist::FreeListConfig;
//!
//! fn main() -> nebula_freelist::Result<()> {
//!     let config = FreeListConfig::new(128, 0)
//!         .with_init_size(16)
//!         .with_refill_size(4)
//!         .with_max_refill_size(64);
//!
//!     let pool = nebula_freelist::init(config)?;
//!     let mut packet = pool.allocate()?;
//!     pool.write(&mut packet, |bytes| bytes[64] = 0x45);
//!     pool.free(packet);
//!
//!     let stats = pool.stats();
//!     assert!(stats.is_conserved());
//!     assert_eq!(stats.capacity, 16);
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

// Core modules
pub mod chunk;
pub mod config;
pub mod error;
pub mod growth;
pub mod guard;
pub mod stats;

mod freelist;
mod queue;

// Re-export common types for convenience
pub use chunk::{BudgetedChunkAllocator, ChunkAllocator, SystemChunkAllocator};
pub use config::{FreeListConfig, LINK_NODE_SIZE, RefillPolicy};
pub use error::{FreeListError, Result};
pub use freelist::{ElementHandle, FreeList, SyncFreeList};
pub use guard::{GuardStrategy, Locked, Unguarded};
pub use stats::{FreeListStats, ReleaseReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create a single-threaded freelist backed by the global heap
///
/// # Example
///
/// ```
/// let pool = nebula_freelist::init(nebula_freelist::FreeListConfig::new(32, 0))?;
/// assert_eq!(pool.free_len(), nebula_freelist::config::DEFAULT_INIT_SIZE);
/// # Ok::<(), nebula_freelist::FreeListError>(())
/// ```
///
/// # Panics
/// Panics if `config` fails [`FreeListConfig::validate`].
pub fn init(config: FreeListConfig) -> Result<FreeList> {
    FreeList::new(config)
}

/// Create a freelist that can be shared between threads
///
/// Every operation on the returned pool runs under one pool-wide lock.
///
/// # Panics
/// Panics if `config` fails [`FreeListConfig::validate`].
pub fn init_thread_safe(config: FreeListConfig) -> Result<SyncFreeList> {
    FreeList::new(config)
}
