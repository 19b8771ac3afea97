//! Refill growth policy
//!
//! After every refill triggered by an empty free list, the refill quantity is
//! multiplied by the growth factor and clamped to the configured maximum.
//! Explicit pre-growth through `FreeList::reserve` does not advance it.

/// Computes the refill size to use after an exhaustion-triggered refill.
///
/// The result never drops below `current` and never exceeds `max` unless
/// `current` already does. Overflow saturates before the clamp.
///
/// # Examples
/// ```
/// use nebula_freelist::growth::next_refill_size;
///
/// assert_eq!(next_refill_size(2, 2, 8), 4);
/// assert_eq!(next_refill_size(4, 2, 8), 8);
/// assert_eq!(next_refill_size(8, 2, 8), 8);
/// assert_eq!(next_refill_size(5, 3, 8), 8);
/// ```
#[inline]
pub const fn next_refill_size(current: usize, growth_factor: usize, max: usize) -> usize {
    if current >= max {
        return current;
    }
    let grown = current.saturating_mul(growth_factor);
    if grown >= max {
        max
    } else if grown < current {
        // growth_factor of 0 never shrinks the refill
        current
    } else {
        grown
    }
}
