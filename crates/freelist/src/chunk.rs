//! Backing chunks
//!
//! Memory is obtained in bulk through a [`ChunkAllocator`] and carved into
//! element slots. Chunks are owned by the pool alone, only ever appended, and
//! handed back to the allocator when the pool is torn down.

use std::collections::TryReserveError;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{FreeListError, Result};
use crate::stats::ReleaseReport;

/// Source of zero-initialized backing memory for pool chunks
pub trait ChunkAllocator: Send + Sync {
    /// Allocate `bytes` zeroed bytes.
    ///
    /// The returned chunk must be exactly `bytes` long; pools hand back any
    /// other chunk and fail the refill.
    ///
    /// # Errors
    /// [`FreeListError::OutOfMemory`] when the memory cannot be obtained.
    fn allocate_zeroed(&self, bytes: usize) -> Result<Box<[u8]>>;

    /// Take back a chunk previously returned by
    /// [`allocate_zeroed`](Self::allocate_zeroed)
    fn release(&self, storage: Box<[u8]>) {
        drop(storage);
    }
}

impl<A: ChunkAllocator + ?Sized> ChunkAllocator for Arc<A> {
    fn allocate_zeroed(&self, bytes: usize) -> Result<Box<[u8]>> {
        (**self).allocate_zeroed(bytes)
    }

    fn release(&self, storage: Box<[u8]>) {
        (**self).release(storage);
    }
}

/// Global-heap chunks, allocated fallibly
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemChunkAllocator;

impl ChunkAllocator for SystemChunkAllocator {
    // Zero-filled by hand after a fallible reserve, so large chunks are touched
    // up front instead of arriving as lazily zeroed pages.
    fn allocate_zeroed(&self, bytes: usize) -> Result<Box<[u8]>> {
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(bytes)
            .map_err(|_| FreeListError::out_of_memory(bytes))?;
        storage.resize(bytes, 0);
        Ok(storage.into_boxed_slice())
    }
}

/// Chunk allocator with a ceiling on live bytes.
///
/// Requests that would push the live total past the budget fail with
/// [`FreeListError::OutOfMemory`] without reaching the inner allocator.
/// Lifetime totals are kept for leak accounting.
#[derive(Debug)]
pub struct BudgetedChunkAllocator<A = SystemChunkAllocator> {
    inner: A,
    budget: usize,
    live: AtomicUsize,
    allocated_total: AtomicUsize,
    released_total: AtomicUsize,
}

impl BudgetedChunkAllocator {
    /// Budget the global heap
    pub fn new(budget: usize) -> Self {
        Self::with_inner(SystemChunkAllocator, budget)
    }
}

impl<A: ChunkAllocator> BudgetedChunkAllocator<A> {
    /// Budget another chunk allocator
    pub fn with_inner(inner: A, budget: usize) -> Self {
        Self {
            inner,
            budget,
            live: AtomicUsize::new(0),
            allocated_total: AtomicUsize::new(0),
            released_total: AtomicUsize::new(0),
        }
    }

    /// Maximum number of live bytes
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Bytes currently handed out
    pub fn live_bytes(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Bytes handed out over the allocator's lifetime
    pub fn total_allocated_bytes(&self) -> usize {
        self.allocated_total.load(Ordering::Relaxed)
    }

    /// Bytes taken back over the allocator's lifetime
    pub fn total_released_bytes(&self) -> usize {
        self.released_total.load(Ordering::Relaxed)
    }
}

impl<A: ChunkAllocator> ChunkAllocator for BudgetedChunkAllocator<A> {
    fn allocate_zeroed(&self, bytes: usize) -> Result<Box<[u8]>> {
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                live.checked_add(bytes).filter(|&next| next <= self.budget)
            })
            .map_err(|_| FreeListError::out_of_memory(bytes))?;

        match self.inner.allocate_zeroed(bytes) {
            Ok(storage) => {
                self.allocated_total.fetch_add(bytes, Ordering::Relaxed);
                Ok(storage)
            },
            Err(err) => {
                self.live.fetch_sub(bytes, Ordering::AcqRel);
                Err(err)
            },
        }
    }

    fn release(&self, storage: Box<[u8]>) {
        let bytes = storage.len();
        self.inner.release(storage);
        self.live.fetch_sub(bytes, Ordering::AcqRel);
        self.released_total.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// One backing block and the slot range carved from it
#[derive(Debug)]
struct Chunk {
    first_slot: usize,
    storage: Box<[u8]>,
}

/// Append-only set of chunks owned by one pool
#[derive(Debug)]
pub(crate) struct ChunkSet {
    chunks: Vec<Chunk>,
    element_size: usize,
    slots: usize,
    bytes: usize,
}

impl ChunkSet {
    pub(crate) const fn new(element_size: usize) -> Self {
        Self {
            chunks: Vec::new(),
            element_size,
            slots: 0,
            bytes: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Slots carved from all chunks so far
    pub(crate) fn slots(&self) -> usize {
        self.slots
    }

    /// Bytes held across all chunks
    pub(crate) fn bytes(&self) -> usize {
        self.bytes
    }

    /// Make room to register one more chunk
    pub(crate) fn try_reserve_one(&mut self) -> std::result::Result<(), TryReserveError> {
        self.chunks.try_reserve(1)
    }

    /// Register `storage` and return the slots carved from it
    pub(crate) fn push(&mut self, storage: Box<[u8]>) -> Range<usize> {
        debug_assert_eq!(storage.len() % self.element_size, 0);
        let first_slot = self.slots;
        let count = storage.len() / self.element_size;

        self.bytes += storage.len();
        self.slots += count;
        self.chunks.push(Chunk {
            first_slot,
            storage,
        });

        first_slot..first_slot + count
    }

    pub(crate) fn element(&self, slot: usize) -> &[u8] {
        let (chunk, offset) = self.locate(slot);
        &self.chunks[chunk].storage[offset..offset + self.element_size]
    }

    pub(crate) fn element_mut(&mut self, slot: usize) -> &mut [u8] {
        let (chunk, offset) = self.locate(slot);
        let size = self.element_size;
        &mut self.chunks[chunk].storage[offset..offset + size]
    }

    /// Hand every chunk back to `allocator`, oldest first
    pub(crate) fn release_all<A: ChunkAllocator>(&mut self, allocator: &A) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        for chunk in self.chunks.drain(..) {
            report.chunks += 1;
            report.bytes += chunk.storage.len();
            allocator.release(chunk.storage);
        }
        self.slots = 0;
        self.bytes = 0;
        report
    }

    fn locate(&self, slot: usize) -> (usize, usize) {
        assert!(slot < self.slots, "slot {slot} out of range ({} slots)", self.slots);
        let chunk = self.chunks.partition_point(|c| c.first_slot <= slot) - 1;
        let offset = (slot - self.chunks[chunk].first_slot) * self.element_size;
        (chunk, offset)
    }
}
