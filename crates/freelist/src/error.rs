//! Error types for freelist operations

use thiserror::Error;

/// Result type for freelist operations
pub type Result<T> = std::result::Result<T, FreeListError>;

/// Freelist operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FreeListError {
    /// Backing memory for a new chunk could not be obtained
    #[error("Out of memory: failed to acquire a {requested_bytes}-byte chunk")]
    OutOfMemory {
        /// Size of the chunk that was requested
        requested_bytes: usize,
    },

    /// The free list was still empty after a refill, because the chunk
    /// allocator returned a chunk of the wrong size
    #[error("Free list empty after refilling {refilled} elements, try again")]
    TryAgain {
        /// Number of elements the refill appended (always 0 for a rejected chunk)
        refilled: usize,
    },

    /// Configuration rejected by [`FreeListConfig::validate`]
    ///
    /// [`FreeListConfig::validate`]: crate::FreeListConfig::validate
    #[error("Configuration error: {message}")]
    InvalidConfig {
        /// What is wrong with the configuration
        message: String,
    },
}

impl FreeListError {
    /// Create an out of memory error
    pub fn out_of_memory(requested_bytes: usize) -> Self {
        Self::OutOfMemory { requested_bytes }
    }

    /// Create a try-again error
    pub fn try_again(refilled: usize) -> Self {
        Self::TryAgain { refilled }
    }

    /// Create a configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns `true` for [`FreeListError::OutOfMemory`]
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }

    /// Check if the failed operation may succeed when repeated later.
    ///
    /// Only memory exhaustion qualifies: `TryAgain` means the chunk allocator
    /// broke its contract, and repeating the call does not fix that.
    pub fn is_retryable(&self) -> bool {
        self.is_out_of_memory()
    }
}
