use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, Ordering};

// =============================================================================
// LINK LIFECYCLE
// =============================================================================
//
//   carve ──► free chain ──► allocate_link ──► linked ──► unlinked ──► disposed
//                 ▲          (pins += 1)       (head)    (marked,        │
//                 │                                       pins -= 1)     │
//                 └──────────────────── free_link ◄──────────────────────┘
//
// PIN COUNT:
//   The list itself owns one pin on every link it can reach. Readers that
//   obtained the link through a list head add their own pin before touching
//   `next` or `item`, and drop it when done.
//
// RECYCLING:
//   The thread that unlinks a link sets `marked_for_recycling` and drops the
//   list's pin. Whichever thread then takes the pin count to zero swaps the
//   mark back to false and disposes the link. The swap makes disposal happen
//   once even if two threads observe a zero count.
//
// STALE PINS:
//   A reader may pin a link that was unlinked, disposed and even re-allocated
//   after it loaded the head. Link memory is never released, so the stray
//   increment is harmless, and `prepare` adds to the count instead of
//   overwriting it so the stray decrement stays balanced.
//
// =============================================================================

/// A node of a lock-free list.
///
/// Links are carved out of bundles owned by a
/// [`LinkAllocator`](super::LinkAllocator) and live for the rest of the
/// process.
#[derive(Debug)]
pub struct Link {
    next: AtomicPtr<Link>,
    item: AtomicPtr<()>,
    pins: AtomicU32,
    marked_for_recycling: AtomicBool,
}

impl Link {
    pub(crate) const fn new() -> Self {
        Link {
            next: AtomicPtr::new(ptr::null_mut()),
            item: AtomicPtr::new(ptr::null_mut()),
            pins: AtomicU32::new(0),
            marked_for_recycling: AtomicBool::new(false),
        }
    }

    /// Payload carried by this link, null once disposed.
    #[inline]
    pub fn item(&self) -> *mut () {
        self.item.load(Ordering::Acquire)
    }

    /// Current pin count. Diagnostics only.
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pins.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn next(&self) -> *mut Link {
        self.next.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_next(&self, next: *mut Link) {
        self.next.store(next, Ordering::Release)
    }

    /// Readies a free link to carry `item` and takes the list's pin.
    pub(crate) fn prepare(&self, item: *mut ()) {
        debug_assert!(!item.is_null(), "payloads are never null");
        debug_assert!(!self.marked_for_recycling.load(Ordering::Relaxed));

        self.next.store(ptr::null_mut(), Ordering::Relaxed);
        self.item.store(item, Ordering::Release);
        self.pins.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub(crate) fn pin(&self) {
        self.pins.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops one pin.
    ///
    /// Returns `true` if the caller released the last pin of a link marked for
    /// recycling and must now dispose it.
    #[inline]
    pub(crate) fn unpin(&self) -> bool {
        let previous = self.pins.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "link pin count underflow");

        previous == 1 && self.marked_for_recycling.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn mark_for_recycling(&self) {
        let already_marked = self.marked_for_recycling.swap(true, Ordering::AcqRel);
        debug_assert!(!already_marked, "link marked for recycling twice");
    }

    /// Clears the payload and the chain pointer before the link goes back to a
    /// free chain.
    pub(crate) fn clear(&self) {
        self.item.store(ptr::null_mut(), Ordering::Release);
        self.next.store(ptr::null_mut(), Ordering::Relaxed);
    }
}

impl Default for Link {
    fn default() -> Self {
        Self::new()
    }
}
