//! Bundle-based allocator for list links.
//!
//! # Design
//!
//! Links are fixed-size, so the allocator never deals in sizes. It carves
//! links in bundles, hands them out through per-thread [`LinkCache`]s and
//! recycles them through the same caches. Full bundles travel between caches
//! through a small mutex-protected store, which also merges the short chains
//! left behind by dropped caches back into bundles:
//!
//! ```text
//! LinkAllocator (process lifetime)
//!     │
//!     ├── closed sentinel link
//!     ├── global bundle store   full bundles + one merged remainder
//!     └── counters              used / free / carved / recycled
//!
//! LinkCache (one per worker thread)
//!     ├── partial chain         allocate from / free into
//!     └── full chain            one spare bundle
//! ```
//!
//! Link memory is never returned to the system allocator. A reader may pin a
//! link that has since been recycled; keeping the memory alive turns that into
//! a harmless counter increment instead of a use-after-free.
//!
//! # Lifecycle
//!
//! [`LinkAllocator::global`] is created on first use and intentionally never
//! dropped. Independent allocators built with [`LinkAllocator::leak`] share
//! that lifecycle.

mod bundle_store;
mod config;
mod link;
mod link_cache;
mod link_chain;

use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::utils::CachePadded;
use tracing::debug;

use crate::error::Result;

use self::bundle_store::BundleStore;
use self::link_chain::LinkChain;

pub use config::{AllocatorConfig, LINKS_PER_BUNDLE, MAX_LINKS_PER_BUNDLE};
pub use link::Link;
pub use link_cache::LinkCache;

static GLOBAL_LINK_ALLOCATOR: OnceLock<LinkAllocator> = OnceLock::new();

/// Owner of all link memory and of the closed sentinel.
pub struct LinkAllocator {
    config: AllocatorConfig,
    closed: Link,
    store: BundleStore,
    links_used: CachePadded<AtomicUsize>,
    links_free: CachePadded<AtomicUsize>,
    links_recycled: CachePadded<AtomicUsize>,
    bundles_carved: AtomicUsize,
}

/// Point-in-time allocator counters.
///
/// Counters are updated with relaxed atomics; under concurrent use the
/// snapshot is approximate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocatorStats {
    /// Links handed out and not yet recycled.
    pub links_used: usize,
    /// Links sitting in caches or in the global store.
    pub links_free: usize,
    /// Bundles carved since the allocator was created.
    pub bundles_carved: usize,
    /// Full bundles currently waiting in the global store.
    pub bundles_in_store: usize,
    /// Links merged from dropped caches that do not yet fill a bundle.
    pub links_in_store_remainder: usize,
    /// Links returned through `free_link` since the allocator was created.
    pub links_recycled: usize,
}

impl LinkAllocator {
    /// Creates an allocator with the given configuration.
    pub fn new(config: AllocatorConfig) -> Result<Self> {
        config.validate()?;

        debug!(
            links_per_bundle = config.links_per_bundle,
            "creating link allocator"
        );

        Ok(LinkAllocator {
            config,
            closed: Link::new(),
            store: BundleStore::new(config.links_per_bundle),
            links_used: CachePadded::new(AtomicUsize::new(0)),
            links_free: CachePadded::new(AtomicUsize::new(0)),
            links_recycled: CachePadded::new(AtomicUsize::new(0)),
            bundles_carved: AtomicUsize::new(0),
        })
    }

    /// Creates an allocator that lives for the rest of the process.
    pub fn leak(config: AllocatorConfig) -> Result<&'static Self> {
        Ok(Box::leak(Box::new(Self::new(config)?)))
    }

    /// The process-wide allocator used by [`LockFreeList::new`](crate::LockFreeList::new).
    pub fn global() -> &'static Self {
        GLOBAL_LINK_ALLOCATOR.get_or_init(|| {
            // The default configuration always validates.
            match Self::new(AllocatorConfig::default()) {
                Ok(allocator) => allocator,
                Err(err) => unreachable!("default allocator config rejected: {err}"),
            }
        })
    }

    /// Creates a cache for the calling thread.
    pub fn cache(&'static self) -> LinkCache {
        LinkCache::new(self)
    }

    /// The sentinel installed as head of a closed list.
    ///
    /// The sentinel is never handed out, never carries a payload and is never
    /// recycled.
    pub fn closed_link(&self) -> NonNull<Link> {
        NonNull::from(&self.closed)
    }

    #[inline]
    pub(crate) fn is_closed_link(&self, link: *mut Link) -> bool {
        ptr::eq(link, &self.closed)
    }

    pub fn links_per_bundle(&self) -> usize {
        self.config.links_per_bundle
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Approximate number of links currently in use.
    pub fn num_used(&self) -> usize {
        self.links_used.load(Ordering::Relaxed)
    }

    /// Approximate number of free links across all caches and the global store.
    pub fn num_free(&self) -> usize {
        self.links_free.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            links_used: self.num_used(),
            links_free: self.num_free(),
            bundles_carved: self.bundles_carved.load(Ordering::Relaxed),
            bundles_in_store: self.store.len(),
            links_in_store_remainder: self.store.remainder_len(),
            links_recycled: self.links_recycled.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn store(&self) -> &BundleStore {
        &self.store
    }

    pub(crate) fn carve_bundle(&self) -> LinkChain {
        let links = self.config.links_per_bundle;
        let chain = LinkChain::carve(links);

        self.links_free.fetch_add(links, Ordering::Relaxed);
        let carved = self.bundles_carved.fetch_add(1, Ordering::Relaxed) + 1;

        debug!(links, bundles_carved = carved, "carved link bundle");
        chain
    }

    #[inline]
    pub(crate) fn on_link_allocated(&self) {
        self.links_used.fetch_add(1, Ordering::Relaxed);
        self.links_free.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn on_link_recycled(&self) {
        self.links_used.fetch_sub(1, Ordering::Relaxed);
        self.links_free.fetch_add(1, Ordering::Relaxed);
        self.links_recycled.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for LinkAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkAllocator")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AllocatorError;

    #[test]
    fn test_global_allocator_is_a_singleton() {
        let first = LinkAllocator::global();
        let second = LinkAllocator::global();

        assert!(ptr::eq(first, second));
        assert_eq!(first.links_per_bundle(), LINKS_PER_BUNDLE);
        assert!(ptr::eq(first.closed_link().as_ptr(), second.closed_link().as_ptr()));
    }

    #[test]
    fn test_each_allocator_has_its_own_sentinel() {
        let a = LinkAllocator::leak(AllocatorConfig::default()).unwrap();
        let b = LinkAllocator::leak(AllocatorConfig::default()).unwrap();

        assert!(a.is_closed_link(a.closed_link().as_ptr()));
        assert!(!a.is_closed_link(b.closed_link().as_ptr()));
        assert!(!a.is_closed_link(ptr::null_mut()));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = LinkAllocator::new(AllocatorConfig::new().with_links_per_bundle(0)).unwrap_err();
        assert_eq!(err, AllocatorError::EmptyBundle);
        assert_eq!(err.to_string(), "links per bundle must be at least 1");
    }

    #[test]
    fn test_fresh_allocator_stats() {
        let allocator = LinkAllocator::new(AllocatorConfig::default()).unwrap();
        assert_eq!(allocator.stats(), AllocatorStats::default());
    }
}
