use std::cell::Cell;
use std::fmt;
use std::ptr::NonNull;

use tracing::trace;

use super::LinkAllocator;
use super::link::Link;
use super::link_chain::LinkChain;

/// A per-thread handle onto a [`LinkAllocator`].
///
/// Every list operation takes the caller's cache. Allocation and recycling go
/// through two local chains and only touch the allocator's global bundle store
/// when the cache runs dry or accumulates a full bundle:
///
/// ```text
///              allocate_link                     free_link
///                    │                               │
///                    ▼                               ▼
///   partial ◄── full ◄── global store ◄── full ◄── partial (== bundle size)
///     (empty)                 ▲
///                             └── carve new bundle when the store is empty
/// ```
///
/// A cache may be moved to another thread but never shared (`Send`, not
/// `Sync`). Dropping it hands its full bundle back to the global store and
/// merges any leftover links into the store's remainder.
pub struct LinkCache {
    allocator: &'static LinkAllocator,
    partial: Cell<LinkChain>,
    full: Cell<LinkChain>,
}

// Safety: the chains are exclusively owned by the cache; `Cell` keeps the cache
// from being shared between threads.
unsafe impl Send for LinkCache {}

impl LinkCache {
    pub(crate) fn new(allocator: &'static LinkAllocator) -> Self {
        LinkCache {
            allocator,
            partial: Cell::new(LinkChain::EMPTY),
            full: Cell::new(LinkChain::EMPTY),
        }
    }

    /// The allocator this cache draws links from.
    pub fn allocator(&self) -> &'static LinkAllocator {
        self.allocator
    }

    /// Hands out a link carrying `item`, holding the list's pin.
    ///
    /// Never fails: when no free link is at hand a new bundle is carved.
    pub fn allocate_link(&self, item: NonNull<()>) -> NonNull<Link> {
        let mut partial = self.partial.take();

        let link = loop {
            // SAFETY: chains held by this cache are exclusively owned by it.
            if let Some(link) = unsafe { partial.pop() } {
                break link;
            }
            partial = self.refill();
        };

        self.partial.set(partial);
        self.allocator.on_link_allocated();

        // SAFETY: link memory lives for the rest of the process.
        unsafe { link.as_ref() }.prepare(item.as_ptr());
        link
    }

    /// Returns a disposed link to this cache.
    ///
    /// # Safety
    ///
    /// - `link` must come from this cache's allocator.
    /// - `link` must be disposed: unreachable from every list, payload cleared,
    ///   and not already sitting in a free chain.
    pub unsafe fn free_link(&self, link: NonNull<Link>) {
        debug_assert!(
            // SAFETY: link memory lives for the rest of the process.
            unsafe { link.as_ref() }.item().is_null(),
            "free_link on a link that still carries a payload"
        );

        let mut partial = self.partial.take();
        // SAFETY: the caller hands over exclusive ownership of the link.
        unsafe { partial.push(link) };

        if partial.len() >= self.allocator.links_per_bundle() {
            let full = self.full.replace(partial);
            if !full.is_empty() {
                trace!(links = full.len(), "handing full link bundle to the global store");
                self.allocator.store().push(full);
            }
            partial = LinkChain::EMPTY;
        }

        self.partial.set(partial);
        self.allocator.on_link_recycled();
    }

    /// Clears a link whose last pin was just released and recycles it.
    ///
    /// # Safety
    ///
    /// - The caller must be the thread that consumed the link's recycling mark.
    pub(crate) unsafe fn dispose_link(&self, link: NonNull<Link>) {
        // SAFETY: link memory lives for the rest of the process.
        unsafe { link.as_ref() }.clear();
        // SAFETY: consuming the mark makes the caller the link's only owner.
        unsafe { self.free_link(link) };
    }

    /// Number of free links currently held by this cache.
    pub fn len(&self) -> usize {
        let partial = self.partial.get();
        let full = self.full.get();
        partial.len() + full.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn refill(&self) -> LinkChain {
        let full = self.full.take();
        if !full.is_empty() {
            return full;
        }

        if let Some(bundle) = self.allocator.store().pop() {
            trace!(links = bundle.len(), "took link bundle from the global store");
            return bundle;
        }

        self.allocator.carve_bundle()
    }
}

impl Drop for LinkCache {
    fn drop(&mut self) {
        let partial = self.partial.take();
        let full = self.full.take();

        trace!(
            partial = partial.len(),
            full = full.len(),
            "returning cached links to the global store"
        );

        // `full` is always a whole bundle; `partial` never is.
        if !full.is_empty() {
            self.allocator.store().push(full);
        }
        if !partial.is_empty() {
            self.allocator.store().merge(partial);
        }
    }
}

impl fmt::Debug for LinkCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkCache")
            .field("partial", &self.partial.get().len())
            .field("full", &self.full.get().len())
            .finish()
    }
}
