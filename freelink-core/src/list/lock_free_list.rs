use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, Ordering};

use crossbeam::utils::CachePadded;

use crate::allocator::{Link, LinkAllocator, LinkCache};

use super::link_stack::LinkStack;
use super::pinned_link::{Head, PinnedLink, retire};

///
/// Lock-free LIFO list of payload pointers with pin-count protected recycling.
///
/// Links come from a [`LinkAllocator`]; callers pass their per-thread
/// [`LinkCache`] to every operation that may allocate or recycle a link.
///
// =============================================================================
// HEAD STATES
// =============================================================================
//
//   null          Open-Empty
//   link chain    Open-NonEmpty
//   sentinel      Closed          (allocator.closed_link(), never recycled)
//
// The head is only ever changed by CAS. Bulk operations detach the whole
// chain with a single CAS and then walk it privately.
//
// =============================================================================
// POP
// =============================================================================
//
//   1. pin head H                     (H cannot be recycled from here on)
//   2. next = H.next
//   3. CAS head H -> next
//        ok:   read H.item, mark H, drop the list's pin, unpin on return
//        fail: unpin, retry
//
// ABA: step 3 can only succeed against a stale H if H was popped, recycled
// and pushed again in between. Recycling needs H's pin count to reach zero,
// which our pin from step 1 prevents, so a successful CAS always sees the
// same incarnation of H that step 2 read.
//
// =============================================================================
//
pub struct LockFreeList<T> {
    head: CachePadded<AtomicPtr<Link>>,
    allocator: &'static LinkAllocator,
    _marker: PhantomData<NonNull<T>>,
}

// Safety: the list only hands payload pointers between threads, like a channel
// of `NonNull<T>`; all shared state is accessed atomically.
unsafe impl<T: Send> Send for LockFreeList<T> {}
unsafe impl<T: Send> Sync for LockFreeList<T> {}

/// What to do when a push finds the list closed.
#[derive(Clone, Copy, PartialEq, Eq)]
enum WhenClosed {
    Panic,
    Reject,
    Reopen,
}

enum Pushed {
    Linked,
    Reopened,
    Rejected,
}

enum Popped<T> {
    Item(NonNull<T>),
    Empty,
    Closed,
}

impl<T> LockFreeList<T> {
    /// Creates an empty list backed by the global allocator.
    pub fn new() -> Self {
        Self::with_allocator(LinkAllocator::global())
    }

    /// Creates an empty list backed by `allocator`.
    pub fn with_allocator(allocator: &'static LinkAllocator) -> Self {
        LockFreeList {
            head: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            allocator,
            _marker: PhantomData,
        }
    }

    pub fn allocator(&self) -> &'static LinkAllocator {
        self.allocator
    }

    /// Pushes `item`.
    ///
    /// # Panics
    ///
    /// Panics if the list is closed; use [`push_if_not_closed`](Self::push_if_not_closed)
    /// when that can happen.
    pub fn push(&self, cache: &LinkCache, item: NonNull<T>) {
        self.push_with(cache, item, WhenClosed::Panic);
    }

    /// Pushes `item` unless the list is closed. Returns `false` if closed.
    pub fn push_if_not_closed(&self, cache: &LinkCache, item: NonNull<T>) -> bool {
        !matches!(
            self.push_with(cache, item, WhenClosed::Reject),
            Pushed::Rejected
        )
    }

    /// Pushes `item`, replacing the closed sentinel if the list is closed.
    ///
    /// Returns `true` if this call reopened the list.
    pub fn reopen_if_closed_and_push(&self, cache: &LinkCache, item: NonNull<T>) -> bool {
        matches!(
            self.push_with(cache, item, WhenClosed::Reopen),
            Pushed::Reopened
        )
    }

    /// Pops the most recently pushed item, or `None` if the list is empty.
    ///
    /// # Panics
    ///
    /// Panics if the list is closed; use [`pop_if_not_closed`](Self::pop_if_not_closed)
    /// when that can happen.
    pub fn pop(&self, cache: &LinkCache) -> Option<NonNull<T>> {
        match self.pop_with(cache) {
            Popped::Item(item) => Some(item),
            Popped::Empty => None,
            Popped::Closed => panic!("pop from a closed list; use pop_if_not_closed"),
        }
    }

    /// Pops the most recently pushed item; a closed list has nothing to pop.
    pub fn pop_if_not_closed(&self, cache: &LinkCache) -> Option<NonNull<T>> {
        match self.pop_with(cache) {
            Popped::Item(item) => Some(item),
            Popped::Empty | Popped::Closed => None,
        }
    }

    /// Detaches every item with one CAS and returns them newest first.
    pub fn pop_all(&self, cache: &LinkCache) -> Vec<NonNull<T>> {
        let mut items = Vec::new();
        self.detach_chain(cache, ptr::null_mut(), |item| items.push(item));
        items
    }

    /// Detaches every item and installs the closed sentinel with one CAS.
    ///
    /// An empty list is closed; an already closed list yields nothing.
    pub fn pop_all_and_close(&self, cache: &LinkCache) -> Vec<NonNull<T>> {
        let mut items = Vec::new();
        self.detach_chain(cache, self.closed_link(), |item| items.push(item));
        items
    }

    /// Closes the list if it is empty. Returns `true` if it did.
    pub fn close_if_empty(&self) -> bool {
        self.head
            .compare_exchange(
                ptr::null_mut(),
                self.closed_link(),
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Moves `other`'s chain into this list if this list is empty.
    ///
    /// The mutable borrow guarantees `other` has no concurrent writer while
    /// its chain changes hands. On success `other` is left empty.
    ///
    /// # Panics
    ///
    /// Panics if the lists use different allocators.
    pub fn replace_list_if_empty(&self, other: &mut LockFreeList<T>) -> bool {
        assert!(
            ptr::eq(self.allocator, other.allocator),
            "lists backed by different allocators cannot exchange links"
        );

        let chain = *other.head.get_mut();
        if self
            .head
            .compare_exchange(ptr::null_mut(), chain, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        *other.head.get_mut() = ptr::null_mut();
        true
    }

    /// Advisory unless the caller knows there is no concurrent writer.
    pub fn is_closed(&self) -> bool {
        self.allocator
            .is_closed_link(self.head.load(Ordering::SeqCst))
    }

    /// Advisory unless the caller knows there is no concurrent writer. A
    /// closed list is not empty.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::SeqCst).is_null()
    }

    /// Links of this list, and its sentinel, are only ever recycled into
    /// caches of the list's own allocator.
    #[inline]
    fn assert_own_cache(&self, cache: &LinkCache) {
        assert!(
            ptr::eq(cache.allocator(), self.allocator),
            "link cache belongs to a different allocator"
        );
    }

    #[inline]
    fn closed_link(&self) -> *mut Link {
        self.allocator.closed_link().as_ptr()
    }

    fn push_with(&self, cache: &LinkCache, item: NonNull<T>, when_closed: WhenClosed) -> Pushed {
        self.assert_own_cache(cache);

        let link = cache.allocate_link(item.cast());
        // SAFETY: the link was just allocated and is not published yet.
        let link_ref = unsafe { link.as_ref() };

        loop {
            match PinnedLink::pin_head(&self.head, self.closed_link(), cache) {
                Head::Empty => {
                    if self.try_link(link_ref, ptr::null_mut(), ptr::null_mut()) {
                        return Pushed::Linked;
                    }
                }
                Head::Pinned(head) => {
                    if self.try_link(link_ref, head.as_ptr(), head.as_ptr()) {
                        return Pushed::Linked;
                    }
                }
                Head::Closed => match when_closed {
                    WhenClosed::Panic => {
                        panic!("push onto a closed list; use push_if_not_closed")
                    }
                    WhenClosed::Reject => {
                        retire(link, cache);
                        return Pushed::Rejected;
                    }
                    WhenClosed::Reopen => {
                        let closed = self.closed_link();
                        if self.try_link(link_ref, closed, ptr::null_mut()) {
                            return Pushed::Reopened;
                        }
                    }
                },
            }
        }
    }

    /// Links `link` in front of `next` if the head is still `expected`.
    fn try_link(&self, link: &Link, expected: *mut Link, next: *mut Link) -> bool {
        link.set_next(next);

        let new = link as *const Link as *mut Link;
        if self
            .head
            .compare_exchange_weak(expected, new, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            return true;
        }

        link.set_next(ptr::null_mut());
        false
    }

    fn pop_with(&self, cache: &LinkCache) -> Popped<T> {
        self.assert_own_cache(cache);

        loop {
            let head = match PinnedLink::pin_head(&self.head, self.closed_link(), cache) {
                Head::Empty => return Popped::Empty,
                Head::Closed => return Popped::Closed,
                Head::Pinned(head) => head,
            };

            let next = head.link().next();
            if self
                .head
                .compare_exchange_weak(head.as_ptr(), next, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }

            let item = head.link().item();
            head.retire_unlinked();
            head.link().set_next(ptr::null_mut());

            return match NonNull::new(item.cast::<T>()) {
                Some(item) => Popped::Item(item),
                None => unreachable!("linked list node without a payload"),
            };
        }
    }

    /// Swaps the whole chain for `replacement` with one CAS, then disposes the
    /// detached links, handing each payload to `visit` newest first.
    fn detach_chain(
        &self,
        cache: &LinkCache,
        replacement: *mut Link,
        mut visit: impl FnMut(NonNull<T>),
    ) {
        self.assert_own_cache(cache);

        let closed = self.closed_link();
        let mut chain = self.head.load(Ordering::Acquire);

        loop {
            if chain == closed {
                return;
            }

            match self.head.compare_exchange_weak(
                chain,
                replacement,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => chain = actual,
            }
        }

        // The chain is ours now. Other threads may still hold stale pins on
        // some of its links, which is why each link is retired rather than
        // freed directly.
        while let Some(link) = NonNull::new(chain) {
            // SAFETY: the link is part of the chain we detached and carries
            // the list's pin until `retire` below.
            let link_ref = unsafe { link.as_ref() };
            chain = link_ref.next();

            if let Some(item) = NonNull::new(link_ref.item().cast::<T>()) {
                visit(item);
            }
            retire(link, cache);
        }
    }
}

impl<T> Default for LockFreeList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockFreeList<T> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        if head.is_null() || self.allocator.is_closed_link(head) {
            return;
        }

        // Payloads are opaque and stay with their owners; only the links go
        // back to the allocator.
        let cache = self.allocator.cache();
        self.detach_chain(&cache, ptr::null_mut(), |_| {});
    }
}

impl<T> fmt::Debug for LockFreeList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeList")
            .field("is_empty", &self.is_empty())
            .field("is_closed", &self.is_closed())
            .finish()
    }
}

impl<T: Send> LinkStack<T> for LockFreeList<T> {
    type Local = LinkCache;

    fn local(&self) -> LinkCache {
        self.allocator.cache()
    }

    fn push(&self, local: &LinkCache, item: NonNull<T>) {
        LockFreeList::push(self, local, item)
    }

    fn push_if_not_closed(&self, local: &LinkCache, item: NonNull<T>) -> bool {
        LockFreeList::push_if_not_closed(self, local, item)
    }

    fn reopen_if_closed_and_push(&self, local: &LinkCache, item: NonNull<T>) -> bool {
        LockFreeList::reopen_if_closed_and_push(self, local, item)
    }

    fn pop(&self, local: &LinkCache) -> Option<NonNull<T>> {
        LockFreeList::pop(self, local)
    }

    fn pop_if_not_closed(&self, local: &LinkCache) -> Option<NonNull<T>> {
        LockFreeList::pop_if_not_closed(self, local)
    }

    fn pop_all(&self, local: &LinkCache) -> Vec<NonNull<T>> {
        LockFreeList::pop_all(self, local)
    }

    fn pop_all_and_close(&self, local: &LinkCache) -> Vec<NonNull<T>> {
        LockFreeList::pop_all_and_close(self, local)
    }

    fn close_if_empty(&self) -> bool {
        LockFreeList::close_if_empty(self)
    }

    fn replace_list_if_empty(&self, other: &mut Self) -> bool {
        LockFreeList::replace_list_if_empty(self, other)
    }

    fn is_closed(&self) -> bool {
        LockFreeList::is_closed(self)
    }

    fn is_empty(&self) -> bool {
        LockFreeList::is_empty(self)
    }
}
