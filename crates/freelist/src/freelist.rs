//! Fixed-size element freelist
//!
//! A pool of equally-sized elements carved from bulk chunks. Empty free lists
//! are refilled on demand with a growing refill size; chunks are never given
//! back before the pool is torn down.
//!
//! ## Invariants
//!
//! - Every slot lives in exactly one chunk for the lifetime of the pool
//! - A slot is either queued as free or held by exactly one [`ElementHandle`]
//! - The refill size never decreases and never exceeds `max_refill_size`
//! - The chunk set only grows until teardown
//! - A failed refill leaves the pool exactly as it was

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace, warn};

use crate::chunk::{ChunkAllocator, ChunkSet, SystemChunkAllocator};
use crate::config::{FreeListConfig, LINK_NODE_SIZE, RefillPolicy};
use crate::error::{FreeListError, Result};
use crate::growth::next_refill_size;
use crate::guard::{GuardCell, GuardStrategy, Locked, Unguarded};
use crate::queue::FreeQueue;
use crate::stats::{FreeListStats, ReleaseReport};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Thread-safe freelist: every operation runs under one pool-wide mutex
pub type SyncFreeList<A = SystemChunkAllocator> = FreeList<Locked, A>;

/// Exclusive claim on one allocated element.
///
/// Handles are move-only: [`FreeList::free`] consumes them, so an element
/// cannot be returned twice through the same handle. A handle stays
/// meaningful only for the pool that produced it.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "dropping a handle leaks its element until the pool is destroyed"]
pub struct ElementHandle {
    slot: usize,
    pool_id: u64,
}

impl ElementHandle {
    /// Position of the element in its pool, stable for the pool's lifetime
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// Mutable pool state, reached only through the guard
#[derive(Debug)]
struct State {
    pool_id: u64,
    chunks: ChunkSet,
    free: FreeQueue,
    refill_size: usize,
    refills: u64,
    exhaustion_refills: u64,
    allocations: u64,
    frees: u64,
}

impl State {
    fn new(pool_id: u64, element_size: usize, refill_size: usize) -> Self {
        Self {
            pool_id,
            chunks: ChunkSet::new(element_size),
            free: FreeQueue::new(),
            refill_size,
            refills: 0,
            exhaustion_refills: 0,
            allocations: 0,
            frees: 0,
        }
    }

    /// Acquire one chunk of `count` elements and queue all of them.
    ///
    /// Side tables are reserved before the chunk is requested, so an error
    /// at any step leaves the state untouched. A chunk of the wrong length
    /// is handed back to `allocator` and reported as
    /// [`FreeListError::TryAgain`] with nothing refilled.
    fn refill<A: ChunkAllocator>(
        &mut self,
        allocator: &A,
        element_size: usize,
        count: usize,
    ) -> Result<()> {
        debug_assert!(count > 0, "refill of zero elements");

        let bytes = count
            .checked_mul(element_size)
            .ok_or_else(|| FreeListError::out_of_memory(usize::MAX))?;

        let reserved = self
            .chunks
            .try_reserve_one()
            .and_then(|()| self.free.try_reserve(count));
        if reserved.is_err() {
            warn!(pool = self.pool_id, count, bytes, "Free list bookkeeping allocation failed");
            return Err(FreeListError::out_of_memory(bytes));
        }

        let storage = allocator.allocate_zeroed(bytes).inspect_err(|err| {
            warn!(pool = self.pool_id, count, bytes, error = %err, "Free list refill failed");
        })?;

        if storage.len() != bytes {
            warn!(
                pool = self.pool_id,
                count,
                bytes,
                received = storage.len(),
                "Chunk allocator returned a chunk of the wrong size"
            );
            allocator.release(storage);
            return Err(FreeListError::try_again(0));
        }

        let slots = self.chunks.push(storage);
        self.free.extend(slots);
        self.refills += 1;

        debug!(
            pool = self.pool_id,
            count,
            bytes,
            chunks = self.chunks.len(),
            free = self.free.len(),
            "Free list refilled"
        );
        Ok(())
    }

    fn stats(&self, element_size: usize, thread_safe: bool) -> FreeListStats {
        FreeListStats {
            element_size,
            thread_safe,
            chunks: self.chunks.len(),
            reserved_bytes: self.chunks.bytes(),
            capacity: self.chunks.slots(),
            free: self.free.len(),
            allocated: (self.allocations - self.frees) as usize,
            refill_size: self.refill_size,
            refills: self.refills,
            exhaustion_refills: self.exhaustion_refills,
            allocations: self.allocations,
            frees: self.frees,
        }
    }
}

/// Pool of fixed-size elements backed by bulk chunks
///
/// `G` selects the serialization strategy ([`Unguarded`] or [`Locked`]) and
/// `A` the source of chunk memory.
///
/// # Memory Layout
/// ```text
/// chunk 0: [slot 0][slot 1][slot 2][slot 3]     (init_size)
/// chunk 1: [slot 4][slot 5]                     (refill_size)
/// chunk 2: [slot 6][slot 7][slot 8][slot 9]     (refill_size * growth_factor)
///
/// free queue: head -> 5 -> 2 -> 7 -> 8 -> 9 <- tail
/// ```
///
/// # Example
/// ```
/// use nebula_freelist::{FreeList, FreeListConfig};
///
/// let config = FreeListConfig::new(64, 0).with_init_size(4);
/// let pool: FreeList = FreeList::new(config)?;
///
/// let mut element = pool.allocate()?;
/// pool.write(&mut element, |bytes| bytes[..5].copy_from_slice(b"hello"));
/// assert_eq!(pool.read(&element, |bytes| bytes[0]), b'h');
/// pool.free(element);
///
/// let report = pool.destroy();
/// assert_eq!(report.bytes, 4 * 64);
/// # Ok::<(), nebula_freelist::FreeListError>(())
/// ```
pub struct FreeList<G: GuardStrategy = Unguarded, A: ChunkAllocator = SystemChunkAllocator> {
    id: u64,
    element_size: usize,
    link_offset: usize,
    policy: RefillPolicy,
    allocator: A,
    state: G::Cell<State>,
}

impl<G: GuardStrategy> FreeList<G, SystemChunkAllocator> {
    /// Create a pool backed by the global heap and fill it with
    /// `init_size` elements.
    ///
    /// # Panics
    /// Panics if `config` fails [`FreeListConfig::validate`].
    pub fn new(config: FreeListConfig) -> Result<Self> {
        Self::with_allocator(config, SystemChunkAllocator)
    }
}

impl<G: GuardStrategy, A: ChunkAllocator> FreeList<G, A> {
    /// Create a pool drawing chunks from `allocator` and fill it with
    /// `init_size` elements.
    ///
    /// # Errors
    /// [`FreeListError::OutOfMemory`] if the initial chunk cannot be
    /// allocated. No chunk outlives a failed construction.
    ///
    /// # Panics
    /// Panics if `config` fails [`FreeListConfig::validate`].
    pub fn with_allocator(config: FreeListConfig, allocator: A) -> Result<Self> {
        if let Err(err) = config.validate() {
            panic!("{err}");
        }

        let policy = config.resolve();
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);

        let mut state = State::new(id, config.element_size, policy.refill_size);
        state.refill(&allocator, config.element_size, policy.init_size)?;

        debug!(
            pool = id,
            element_size = config.element_size,
            init_size = policy.init_size,
            refill_size = policy.refill_size,
            growth_factor = policy.growth_factor,
            max_refill_size = policy.max_refill_size,
            thread_safe = G::THREAD_SAFE,
            "Free list created"
        );

        Ok(Self {
            id,
            element_size: config.element_size,
            link_offset: config.link_offset,
            policy,
            allocator,
            state: <G::Cell<State> as GuardCell<State>>::new(state),
        })
    }

    /// Take one free element, refilling the pool if it is empty.
    ///
    /// The element's bytes are whatever its previous holder left behind,
    /// except for the link-node region, which reads as zeroes.
    ///
    /// # Errors
    /// - [`FreeListError::OutOfMemory`] if a refill was needed and failed;
    ///   the pool is unchanged.
    /// - [`FreeListError::TryAgain`] if the free list was still empty after
    ///   the refill, which happens when the chunk allocator hands back a
    ///   chunk of the wrong size; the pool is unchanged.
    pub fn allocate(&self) -> Result<ElementHandle> {
        let slot = self.state.with(|state| {
            if state.free.is_empty() {
                let count = state.refill_size;
                state.refill(&self.allocator, self.element_size, count)?;
                state.exhaustion_refills += 1;

                let policy = self.policy;
                let next = next_refill_size(count, policy.growth_factor, policy.max_refill_size);
                if next != count {
                    trace!(pool = self.id, from = count, to = next, "Refill size grown");
                }
                state.refill_size = next;
            }

            let slot = state.free.pop_front().ok_or_else(|| {
                warn!(pool = self.id, "Free list empty right after refill");
                FreeListError::try_again(0)
            })?;
            state.allocations += 1;
            Ok(slot)
        })?;

        Ok(ElementHandle {
            slot,
            pool_id: self.id,
        })
    }

    /// Return an element to the pool.
    ///
    /// The link-node region of the element is zeroed before it is queued.
    ///
    /// # Panics
    /// Panics if `handle` was allocated by a different pool.
    pub fn free(&self, handle: ElementHandle) {
        self.check_owner(&handle);
        let link = self.link_offset..self.link_offset + LINK_NODE_SIZE;

        self.state.with(|state| {
            state.chunks.element_mut(handle.slot)[link].fill(0);
            state.free.push_back(handle.slot);
            state.frees += 1;
        });
    }

    /// Run `f` over the bytes of an allocated element.
    ///
    /// `f` runs under the pool guard and must not call back into the pool.
    ///
    /// # Panics
    /// Panics if `handle` was allocated by a different pool.
    pub fn read<R>(&self, handle: &ElementHandle, f: impl FnOnce(&[u8]) -> R) -> R {
        self.check_owner(handle);
        self.state.with(|state| f(state.chunks.element(handle.slot)))
    }

    /// Run `f` over the bytes of an allocated element, mutably.
    ///
    /// `f` runs under the pool guard and must not call back into the pool.
    ///
    /// # Panics
    /// Panics if `handle` was allocated by a different pool.
    pub fn write<R>(&self, handle: &mut ElementHandle, f: impl FnOnce(&mut [u8]) -> R) -> R {
        self.check_owner(handle);
        self.state.with(|state| f(state.chunks.element_mut(handle.slot)))
    }

    /// Add `count` elements in one new chunk without advancing the refill
    /// size. Does nothing for `count == 0`.
    ///
    /// # Errors
    /// [`FreeListError::OutOfMemory`] if the chunk cannot be allocated; the
    /// pool is unchanged.
    pub fn reserve(&self, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.state
            .with(|state| state.refill(&self.allocator, self.element_size, count))
    }

    /// Snapshot of the pool counters
    pub fn stats(&self) -> FreeListStats {
        self.state
            .with(|state| state.stats(self.element_size, G::THREAD_SAFE))
    }

    /// Number of elements on the free list
    pub fn free_len(&self) -> usize {
        self.state.with(|state| state.free.len())
    }

    /// Returns `true` if the next allocation will trigger a refill
    pub fn is_empty(&self) -> bool {
        self.free_len() == 0
    }

    /// Number of chunks acquired so far
    pub fn chunk_count(&self) -> usize {
        self.state.with(|state| state.chunks.len())
    }

    /// Size of each element in bytes
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Offset of the link-node region inside each element
    pub fn link_offset(&self) -> usize {
        self.link_offset
    }

    /// Sizing parameters after default substitution
    pub fn policy(&self) -> RefillPolicy {
        self.policy
    }

    /// Whether the pool serializes access internally
    pub fn is_thread_safe(&self) -> bool {
        G::THREAD_SAFE
    }

    /// The allocator chunks are drawn from
    pub fn chunk_allocator(&self) -> &A {
        &self.allocator
    }

    /// Tear the pool down, releasing every chunk.
    ///
    /// Elements still held by callers are reclaimed along with their chunks;
    /// their handles become meaningless.
    pub fn destroy(mut self) -> ReleaseReport {
        self.release_chunks()
    }

    fn release_chunks(&mut self) -> ReleaseReport {
        let state = self.state.get_mut();
        let outstanding = state.allocations - state.frees;
        let report = state.chunks.release_all(&self.allocator);
        if report.chunks > 0 {
            debug!(
                pool = self.id,
                chunks = report.chunks,
                bytes = report.bytes,
                outstanding,
                "Free list destroyed"
            );
        }
        report
    }

    fn check_owner(&self, handle: &ElementHandle) {
        assert_eq!(
            handle.pool_id, self.id,
            "element handle used with a pool that did not allocate it"
        );
    }
}

impl<G: GuardStrategy, A: ChunkAllocator> Drop for FreeList<G, A> {
    fn drop(&mut self) {
        self.release_chunks();
    }
}

impl<G: GuardStrategy, A: ChunkAllocator> std::fmt::Debug for FreeList<G, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreeList")
            .field("id", &self.id)
            .field("element_size", &self.element_size)
            .field("link_offset", &self.link_offset)
            .field("policy", &self.policy)
            .field("thread_safe", &G::THREAD_SAFE)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::chunk::BudgetedChunkAllocator;

    fn small_config() -> FreeListConfig {
        FreeListConfig::from_raw(64, 0, 4, 2, 2, 8)
    }

    #[test]
    fn test_construction_fills_init_size() {
        let pool: FreeList = FreeList::new(small_config()).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.capacity, 4);
        assert_eq!(stats.free, 4);
        assert_eq!(stats.refills, 1);
        assert_eq!(stats.exhaustion_refills, 0);
        assert_eq!(stats.refill_size, 2);
        assert!(!pool.is_thread_safe());
    }

    #[test]
    fn test_allocation_order_is_fifo() {
        let pool: FreeList = FreeList::new(small_config()).unwrap();
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        assert_eq!((a.slot(), b.slot()), (0, 1));

        pool.free(a);
        let c = pool.allocate().unwrap();
        let d = pool.allocate().unwrap();
        let e = pool.allocate().unwrap();
        assert_eq!((c.slot(), d.slot(), e.slot()), (2, 3, 0));
        for h in [b, c, d, e] {
            pool.free(h);
        }
    }

    #[test]
    fn test_exhaustion_refill_grows_refill_size() {
        let pool: FreeList = FreeList::new(small_config()).unwrap();
        let mut held: Vec<_> = (0..4).map(|_| pool.allocate().unwrap()).collect();
        assert!(pool.is_empty());

        held.push(pool.allocate().unwrap());
        let stats = pool.stats();
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.capacity, 6);
        assert_eq!(stats.refill_size, 4);

        held.push(pool.allocate().unwrap());
        held.push(pool.allocate().unwrap());
        let stats = pool.stats();
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.capacity, 10);
        assert_eq!(stats.refill_size, 8);
        assert_eq!(stats.exhaustion_refills, 2);

        for h in held {
            pool.free(h);
        }
    }

    #[test]
    fn test_free_scrubs_link_region_only() {
        let config = FreeListConfig::from_raw(64, 8, 1, 1, 2, 1);
        let pool: FreeList = FreeList::new(config).unwrap();

        let mut h = pool.allocate().unwrap();
        pool.write(&mut h, |bytes| bytes.fill(0xAB));
        pool.free(h);

        let h = pool.allocate().unwrap();
        pool.read(&h, |bytes| {
            assert!(bytes[..8].iter().all(|&b| b == 0xAB));
            assert!(bytes[8..8 + LINK_NODE_SIZE].iter().all(|&b| b == 0));
            assert!(bytes[8 + LINK_NODE_SIZE..].iter().all(|&b| b == 0xAB));
        });
        pool.free(h);
    }

    #[test]
    fn test_initial_oom_leaves_nothing_behind() {
        let budget = Arc::new(BudgetedChunkAllocator::new(64 * 3));
        let result = FreeList::<Unguarded, _>::with_allocator(small_config(), Arc::clone(&budget));
        assert_eq!(result.unwrap_err(), FreeListError::out_of_memory(64 * 4));
        assert_eq!(budget.live_bytes(), 0);
        assert_eq!(budget.total_allocated_bytes(), 0);
    }

    #[test]
    fn test_refill_oom_keeps_pool_usable() {
        let budget = Arc::new(BudgetedChunkAllocator::new(64 * 4));
        let pool =
            FreeList::<Unguarded, _>::with_allocator(small_config(), Arc::clone(&budget)).unwrap();
        let held: Vec<_> = (0..4).map(|_| pool.allocate().unwrap()).collect();

        let before = pool.stats();
        let err = pool.allocate().unwrap_err();
        assert!(err.is_out_of_memory());
        assert_eq!(pool.stats(), before);

        let mut held = held.into_iter();
        pool.free(held.next().unwrap());
        let again = pool.allocate().unwrap();
        assert_eq!(again.slot(), 0);

        pool.free(again);
        for h in held {
            pool.free(h);
        }
    }

    #[test]
    fn test_reserve_does_not_grow_refill_size() {
        let pool: FreeList = FreeList::new(small_config()).unwrap();
        pool.reserve(3).unwrap();
        pool.reserve(0).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.free, 7);
        assert_eq!(stats.refill_size, 2);
        assert_eq!(stats.exhaustion_refills, 0);
    }

    #[test]
    fn test_destroy_releases_every_chunk() {
        let budget = Arc::new(BudgetedChunkAllocator::new(usize::MAX));
        let pool =
            FreeList::<Locked, _>::with_allocator(small_config(), Arc::clone(&budget)).unwrap();
        let held: Vec<_> = (0..7).map(|_| pool.allocate().unwrap()).collect();
        assert_eq!(held.len(), 7);

        let report = pool.destroy();
        assert_eq!(report, ReleaseReport { chunks: 3, bytes: 64 * 10 });
        assert_eq!(budget.live_bytes(), 0);
        assert_eq!(budget.total_released_bytes(), budget.total_allocated_bytes());
    }

    #[test]
    fn test_drop_releases_chunks() {
        let budget = Arc::new(BudgetedChunkAllocator::new(usize::MAX));
        {
            let _pool = SyncFreeList::with_allocator(small_config(), Arc::clone(&budget)).unwrap();
            assert_eq!(budget.live_bytes(), 64 * 4);
        }
        assert_eq!(budget.live_bytes(), 0);
    }

    #[test]
    #[should_panic(expected = "did not allocate it")]
    fn test_foreign_handle_panics() {
        let a: FreeList = FreeList::new(small_config()).unwrap();
        let b: FreeList = FreeList::new(small_config()).unwrap();
        let h = a.allocate().unwrap();
        b.free(h);
    }

    #[test]
    #[should_panic(expected = "element_size must be greater than 0")]
    fn test_zero_element_size_panics() {
        let _ = FreeList::<Unguarded>::new(FreeListConfig::new(0, 0));
    }

    #[test]
    fn test_locked_pool_reports_thread_safe() {
        let pool = SyncFreeList::new(small_config()).unwrap();
        assert!(pool.is_thread_safe());
        assert!(pool.stats().thread_safe);
    }
}
