use std::ptr::{self, NonNull};

use super::link::Link;

/// An intrusive chain of free links threaded through their `next` pointers.
///
/// A chain is owned by exactly one cache or by the global bundle store at a
/// time, so it is plain data with no synchronisation of its own.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LinkChain {
    head: *mut Link,
    len: usize,
}

// Safety: a chain is an exclusively owned run of free links; it only moves
// between threads through the bundle store's mutex.
unsafe impl Send for LinkChain {}

impl LinkChain {
    pub(crate) const EMPTY: LinkChain = LinkChain {
        head: ptr::null_mut(),
        len: 0,
    };

    /// Carves a fresh bundle of `len` links.
    ///
    /// The bundle is leaked: link memory stays valid for the rest of the
    /// process, which is what makes stale pins harmless.
    pub(crate) fn carve(len: usize) -> Self {
        let bundle: &'static [Link] = Box::leak((0..len).map(|_| Link::new()).collect());

        for pair in bundle.windows(2) {
            pair[0].set_next(&pair[1] as *const Link as *mut Link);
        }

        LinkChain {
            head: bundle
                .first()
                .map_or(ptr::null_mut(), |link| link as *const Link as *mut Link),
            len: bundle.len(),
        }
    }

    #[cfg(test)]
    pub(crate) fn head(&self) -> *mut Link {
        self.head
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Pushes a free link onto the chain.
    ///
    /// # Safety
    ///
    /// - `link` must be a disposed link not reachable from any list or chain.
    pub(crate) unsafe fn push(&mut self, link: NonNull<Link>) {
        // SAFETY: caller guarantees the link is valid and exclusively ours.
        unsafe { link.as_ref() }.set_next(self.head);
        self.head = link.as_ptr();
        self.len += 1;
    }

    /// Pops a free link from the chain.
    ///
    /// # Safety
    ///
    /// - The chain must be exclusively owned by the caller.
    pub(crate) unsafe fn pop(&mut self) -> Option<NonNull<Link>> {
        let link = NonNull::new(self.head)?;

        // SAFETY: links in an owned chain are valid and not shared.
        self.head = unsafe { link.as_ref() }.next();
        self.len -= 1;

        Some(link)
    }
}

impl Default for LinkChain {
    fn default() -> Self {
        Self::EMPTY
    }
}
