use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::allocator::{Link, LinkCache};

/// What a reader found at a list head.
pub(crate) enum Head<'c> {
    Empty,
    Closed,
    Pinned(PinnedLink<'c>),
}

/// A pin on a link obtained through a list head.
///
/// While the guard lives the link cannot be recycled, although it may already
/// be unlinked. Dropping the guard releases the pin; if that was the last pin
/// of a link marked for recycling, the link is disposed into the guard's cache.
///
/// This is not a lock: any number of threads may pin the same link, and
/// pinning never waits.
pub(crate) struct PinnedLink<'c> {
    link: NonNull<Link>,
    cache: &'c LinkCache,
}

impl<'c> PinnedLink<'c> {
    /// Pins whatever link `head` points at.
    ///
    /// `closed` is the sentinel of the list owning `head`. The pin is only
    /// kept once a second load of `head` confirms the link is still the head;
    /// otherwise the read raced a pop and is retried.
    pub(crate) fn pin_head(
        head: &AtomicPtr<Link>,
        closed: *mut Link,
        cache: &'c LinkCache,
    ) -> Head<'c> {
        loop {
            let link = head.load(Ordering::Acquire);
            let Some(candidate) = NonNull::new(link) else {
                return Head::Empty;
            };
            if link == closed {
                return Head::Closed;
            }

            // SAFETY: link memory is never released. If the link was recycled
            // after the load, the increment lands on a free or re-used link and
            // is undone below.
            let candidate_ref = unsafe { candidate.as_ref() };
            candidate_ref.pin();

            if head.load(Ordering::Acquire) == link {
                return Head::Pinned(PinnedLink {
                    link: candidate,
                    cache,
                });
            }

            release_pin(candidate, cache);
        }
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut Link {
        self.link.as_ptr()
    }

    #[inline]
    pub(crate) fn link(&self) -> &Link {
        // SAFETY: the pin keeps the link from being recycled.
        unsafe { self.link.as_ref() }
    }

    /// Drops the list's pin on a link this thread just unlinked.
    ///
    /// The guard's own pin keeps the link alive until the guard is dropped.
    pub(crate) fn retire_unlinked(&self) {
        retire(self.link, self.cache);
    }
}

impl Drop for PinnedLink<'_> {
    fn drop(&mut self) {
        release_pin(self.link, self.cache);
    }
}

/// Releases one pin on `link`, disposing it if that was the last pin of a
/// link marked for recycling.
pub(crate) fn release_pin(link: NonNull<Link>, cache: &LinkCache) {
    // SAFETY: link memory is never released.
    if unsafe { link.as_ref() }.unpin() {
        // SAFETY: `unpin` returning true hands us the recycling mark.
        unsafe { cache.dispose_link(link) };
    }
}

/// Marks an unlinked link for recycling and drops the list's pin on it.
///
/// Must be called exactly once per link, by the thread that won the CAS that
/// unlinked it (or that owns a link which was never published).
pub(crate) fn retire(link: NonNull<Link>, cache: &LinkCache) {
    // SAFETY: link memory is never released.
    unsafe { link.as_ref() }.mark_for_recycling();
    release_pin(link, cache);
}
