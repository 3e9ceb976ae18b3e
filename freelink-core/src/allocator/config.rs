use crate::error::{AllocatorError, Result};

/// Default number of links carved per bundle.
pub const LINKS_PER_BUNDLE: usize = 1024;

/// Largest bundle an allocator accepts.
pub const MAX_LINKS_PER_BUNDLE: usize = 1 << 20;

/// Tuning knobs of a [`LinkAllocator`](super::LinkAllocator).
///
/// ```
/// use freelink_core::{AllocatorConfig, LinkAllocator};
///
/// let config = AllocatorConfig::new().with_links_per_bundle(64);
/// let allocator = LinkAllocator::leak(config).unwrap();
/// assert_eq!(allocator.links_per_bundle(), 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Number of links carved at once and moved between caches as a unit.
    pub links_per_bundle: usize,
}

impl AllocatorConfig {
    pub const fn new() -> Self {
        AllocatorConfig {
            links_per_bundle: LINKS_PER_BUNDLE,
        }
    }

    pub const fn with_links_per_bundle(mut self, links_per_bundle: usize) -> Self {
        self.links_per_bundle = links_per_bundle;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.links_per_bundle == 0 {
            return Err(AllocatorError::EmptyBundle);
        }

        if self.links_per_bundle > MAX_LINKS_PER_BUNDLE {
            return Err(AllocatorError::BundleTooLarge {
                requested: self.links_per_bundle,
                max: MAX_LINKS_PER_BUNDLE,
            });
        }

        Ok(())
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self::new()
    }
}
