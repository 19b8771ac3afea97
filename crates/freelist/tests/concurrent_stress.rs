//! Concurrent stress test for the thread-safe freelist.
//!
//! Many threads allocate, stamp, verify and free elements from one shared
//! pool. A stamp overwritten by another thread means two callers held the
//! same element at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use nebula_freelist::{BudgetedChunkAllocator, FreeListConfig, SyncFreeList};
use pretty_assertions::assert_eq;

const THREADS: usize = 16;
const ROUNDS: usize = 500;
const BATCH: usize = 8;

fn stamp(thread: usize, round: usize, index: usize) -> u64 {
    ((thread as u64) << 48) | ((round as u64) << 16) | index as u64
}

#[test]
fn stress_threads_never_share_an_element() {
    let allocator = Arc::new(BudgetedChunkAllocator::new(usize::MAX));
    let config = FreeListConfig::from_raw(64, 32, 4, 2, 2, 64);
    let pool = SyncFreeList::with_allocator(config, Arc::clone(&allocator)).unwrap();
    let collisions = AtomicUsize::new(0);

    thread::scope(|s| {
        for t in 0..THREADS {
            let pool = &pool;
            let collisions = &collisions;
            s.spawn(move || {
                for round in 0..ROUNDS {
                    let mut batch = Vec::with_capacity(BATCH);
                    for i in 0..BATCH {
                        let mut h = pool.allocate().unwrap();
                        let value = stamp(t, round, i);
                        pool.write(&mut h, |bytes| {
                            bytes[..8].copy_from_slice(&value.to_le_bytes());
                        });
                        batch.push((h, value));
                    }

                    thread::yield_now();

                    for (h, value) in batch {
                        let seen = pool.read(&h, |bytes| {
                            u64::from_le_bytes(bytes[..8].try_into().unwrap())
                        });
                        if seen != value {
                            collisions.fetch_add(1, Ordering::Relaxed);
                        }
                        pool.free(h);
                    }
                }
            });
        }
    });

    assert_eq!(collisions.load(Ordering::Relaxed), 0);

    let stats = pool.stats();
    assert!(stats.is_conserved());
    assert_eq!(stats.allocated, 0);
    assert_eq!(stats.allocations, (THREADS * ROUNDS * BATCH) as u64);
    assert_eq!(stats.frees, stats.allocations);
    assert!(stats.capacity >= BATCH);
    assert!(stats.refill_size <= 64);

    let report = pool.destroy();
    assert_eq!(report.bytes, stats.reserved_bytes);
    assert_eq!(allocator.live_bytes(), 0);
}

#[test]
fn stress_shared_through_arc() {
    let config = FreeListConfig::new(32, 0).with_init_size(4);
    let pool = Arc::new(nebula_freelist::init_thread_safe(config).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for _ in 0..1000 {
                    let h = pool.allocate().unwrap();
                    pool.free(h);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let stats = pool.stats();
    assert_eq!(stats.allocated, 0);
    assert!(stats.capacity <= 4 + 8 * 4, "capacity grew to {}", stats.capacity);
    assert!(stats.is_conserved());
}
