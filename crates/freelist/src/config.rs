//! Freelist configuration
//!
//! A [`FreeListConfig`] carries the six numeric parameters a pool is built
//! from. Zero in any of the sizing fields means "use the default", which is
//! resolved once at construction into a [`RefillPolicy`].

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{FreeListError, Result};

/// Number of elements placed on the free list at construction when
/// `init_size` is left at zero
pub const DEFAULT_INIT_SIZE: usize = 100;

/// Number of elements requested by the first exhaustion refill when
/// `refill_size` is left at zero
pub const DEFAULT_REFILL_SIZE: usize = 10;

/// Multiplier applied to the refill size after each exhaustion refill when
/// `growth_factor` is left at zero
pub const DEFAULT_GROWTH_FACTOR: usize = 2;

/// Bytes reserved for the free-list link node inside every element.
///
/// Two machine words, the footprint of a doubly-linked list entry. Elements
/// must be large enough to hold it at `link_offset`.
pub const LINK_NODE_SIZE: usize = 2 * core::mem::size_of::<usize>();

/// Configuration for a [`FreeList`](crate::FreeList)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FreeListConfig {
    /// Size in bytes of every element handed out by the pool
    pub element_size: usize,
    /// Offset of the link-node region inside an element
    pub link_offset: usize,
    /// Elements allocated at construction (0 = [`DEFAULT_INIT_SIZE`])
    pub init_size: usize,
    /// Elements requested by the first exhaustion refill
    /// (0 = [`DEFAULT_REFILL_SIZE`])
    pub refill_size: usize,
    /// Refill multiplier (0 = [`DEFAULT_GROWTH_FACTOR`])
    pub growth_factor: usize,
    /// Upper bound for the refill size (0 = resolved `init_size`)
    pub max_refill_size: usize,
}

impl FreeListConfig {
    /// Create a configuration with every sizing parameter left at its default
    pub const fn new(element_size: usize, link_offset: usize) -> Self {
        Self {
            element_size,
            link_offset,
            init_size: 0,
            refill_size: 0,
            growth_factor: 0,
            max_refill_size: 0,
        }
    }

    /// Create a configuration from the raw parameter list, zeros included
    pub const fn from_raw(
        element_size: usize,
        link_offset: usize,
        init_size: usize,
        refill_size: usize,
        growth_factor: usize,
        max_refill_size: usize,
    ) -> Self {
        Self {
            element_size,
            link_offset,
            init_size,
            refill_size,
            growth_factor,
            max_refill_size,
        }
    }

    /// Set the number of elements allocated at construction
    #[must_use]
    pub const fn with_init_size(mut self, init_size: usize) -> Self {
        self.init_size = init_size;
        self
    }

    /// Set the first exhaustion refill size
    #[must_use]
    pub const fn with_refill_size(mut self, refill_size: usize) -> Self {
        self.refill_size = refill_size;
        self
    }

    /// Set the refill growth factor
    #[must_use]
    pub const fn with_growth_factor(mut self, growth_factor: usize) -> Self {
        self.growth_factor = growth_factor;
        self
    }

    /// Set the refill size ceiling
    #[must_use]
    pub const fn with_max_refill_size(mut self, max_refill_size: usize) -> Self {
        self.max_refill_size = max_refill_size;
        self
    }

    /// Validate the configuration, returning an error if invalid.
    ///
    /// Pool constructors treat a failure here as a programmer error and
    /// panic; call this first when the parameters come from outside.
    pub fn validate(&self) -> Result<()> {
        if self.element_size == 0 {
            return Err(FreeListError::invalid_config(
                "element_size must be greater than 0",
            ));
        }

        let link_end = self.link_offset.checked_add(LINK_NODE_SIZE);
        if link_end.is_none_or(|end| end > self.element_size) {
            return Err(FreeListError::invalid_config(format!(
                "link node at offset {} ({} bytes) does not fit in a {}-byte element",
                self.link_offset, LINK_NODE_SIZE, self.element_size
            )));
        }

        Ok(())
    }

    /// Substitute defaults for every zero-valued sizing parameter
    pub fn resolve(&self) -> RefillPolicy {
        let init_size = non_zero_or(self.init_size, DEFAULT_INIT_SIZE);
        let max_refill_size = non_zero_or(self.max_refill_size, init_size);
        let refill_size = non_zero_or(self.refill_size, DEFAULT_REFILL_SIZE).min(max_refill_size);

        RefillPolicy {
            init_size,
            refill_size,
            growth_factor: non_zero_or(self.growth_factor, DEFAULT_GROWTH_FACTOR),
            max_refill_size,
        }
    }
}

const fn non_zero_or(value: usize, default: usize) -> usize {
    if value == 0 { default } else { value }
}

/// Sizing parameters after default substitution.
///
/// `refill_size` here is the starting value; the live value grows as the
/// pool is exhausted and is reported by
/// [`FreeListStats::refill_size`](crate::FreeListStats::refill_size).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RefillPolicy {
    /// Elements allocated at construction
    pub init_size: usize,
    /// Elements requested by the first exhaustion refill
    pub refill_size: usize,
    /// Refill multiplier
    pub growth_factor: usize,
    /// Refill size ceiling
    pub max_refill_size: usize,
}
