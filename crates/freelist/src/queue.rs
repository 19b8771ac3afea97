//! Index-based FIFO of free element slots
//!
//! Each slot owns one link entry in a side table instead of a pointer
//! embedded in its bytes. The table only grows during a refill, after a
//! fallible reservation, so pushing a freed slot never allocates.

use std::collections::TryReserveError;
use std::ops::Range;

const NIL: usize = usize::MAX;

#[derive(Debug)]
pub(crate) struct FreeQueue {
    /// `next[slot]` is the slot queued after `slot`, or `NIL`
    next: Vec<usize>,
    head: usize,
    tail: usize,
    len: usize,
}

impl FreeQueue {
    pub(crate) const fn new() -> Self {
        Self {
            next: Vec::new(),
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Make room for `additional` new slots in the link table
    pub(crate) fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.next.try_reserve_exact(additional)
    }

    /// Register the freshly carved `slots` and queue them in ascending order.
    ///
    /// `slots` must start right after the last registered slot.
    pub(crate) fn extend(&mut self, slots: Range<usize>) {
        assert_eq!(slots.start, self.next.len(), "slot ranges must be contiguous");
        self.next.resize(slots.end, NIL);
        for slot in slots {
            self.push_back(slot);
        }
    }

    pub(crate) fn push_back(&mut self, slot: usize) {
        debug_assert!(slot < self.next.len(), "slot {slot} was never registered");
        self.next[slot] = NIL;
        if self.tail == NIL {
            self.head = slot;
        } else {
            self.next[self.tail] = slot;
        }
        self.tail = slot;
        self.len += 1;
    }

    pub(crate) fn pop_front(&mut self) -> Option<usize> {
        if self.head == NIL {
            return None;
        }
        let slot = self.head;
        self.head = self.next[slot];
        if self.head == NIL {
            self.tail = NIL;
        }
        self.next[slot] = NIL;
        self.len -= 1;
        Some(slot)
    }
}
