//! Error types for allocator construction.
//!
//! List operations have no failure mode: contention is retried and contract
//! violations are assertions. The only fallible surface is validating an
//! [`AllocatorConfig`](crate::allocator::AllocatorConfig).

use thiserror::Error;

/// Errors reported when building a [`LinkAllocator`](crate::allocator::LinkAllocator).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocatorError {
    /// A bundle must hold at least one link.
    #[error("links per bundle must be at least 1")]
    EmptyBundle,

    /// The requested bundle would be unreasonably large to carve in one go.
    #[error("links per bundle {requested} exceeds the maximum of {max}")]
    BundleTooLarge {
        /// Requested number of links per bundle.
        requested: usize,
        /// Largest accepted number of links per bundle.
        max: usize,
    },
}

/// Result type for allocator construction.
pub type Result<T> = std::result::Result<T, AllocatorError>;
