//! Epoch-reclaimed implementation of [`LinkStack`].
//!
//! Nodes are ordinary heap allocations retired through the global
//! crossbeam-epoch collector instead of pin-counted links from a bundle
//! allocator. The closed state is a null head carrying [`CLOSED_TAG`], so no
//! sentinel node is needed:
//!
//! ```text
//! head: null, tag 0    Open-Empty
//! head: node, tag 0    Open-NonEmpty
//! head: null, tag 1    Closed
//! ```

use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use crossbeam::utils::CachePadded;
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use freelink_core::LinkStack;

/// Tag stored in the head pointer of a closed list.
pub const CLOSED_TAG: usize = 1;

struct Node<T> {
    item: NonNull<T>,
    next: Atomic<Node<T>>,
}

/// A closable lock-free LIFO list whose nodes are reclaimed by epoch.
pub struct EpochLinkList<T> {
    head: CachePadded<Atomic<Node<T>>>,
}

// Safety: same reasoning as `LockFreeList`; only payload pointers cross
// threads and the head is accessed atomically.
unsafe impl<T: Send> Send for EpochLinkList<T> {}
unsafe impl<T: Send> Sync for EpochLinkList<T> {}

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

impl<T> EpochLinkList<T> {
    pub fn new() -> Self {
        EpochLinkList {
            head: CachePadded::new(Atomic::null()),
        }
    }

    /// Pushes `item`.
    ///
    /// # Panics
    ///
    /// Panics if the list is closed.
    pub fn push(&self, item: NonNull<T>) {
        self.push_with(item, WhenClosed::Panic);
    }

    pub fn push_if_not_closed(&self, item: NonNull<T>) -> bool {
        !matches!(self.push_with(item, WhenClosed::Reject), Pushed::Rejected)
    }

    /// Returns `true` if this call reopened the list.
    pub fn reopen_if_closed_and_push(&self, item: NonNull<T>) -> bool {
        matches!(self.push_with(item, WhenClosed::Reopen), Pushed::Reopened)
    }

    /// # Panics
    ///
    /// Panics if the list is closed.
    pub fn pop(&self) -> Option<NonNull<T>> {
        let guard = epoch::pin();
        match self.pop_with(&guard) {
            Ok(item) => item,
            Err(Closed) => panic!("pop from a closed list; use pop_if_not_closed"),
        }
    }

    pub fn pop_if_not_closed(&self) -> Option<NonNull<T>> {
        let guard = epoch::pin();
        self.pop_with(&guard).unwrap_or(None)
    }

    pub fn pop_all(&self) -> Vec<NonNull<T>> {
        self.detach_chain(Shared::null())
    }

    pub fn pop_all_and_close(&self) -> Vec<NonNull<T>> {
        self.detach_chain(Shared::null().with_tag(CLOSED_TAG))
    }

    pub fn close_if_empty(&self) -> bool {
        let guard = epoch::pin();
        self.head
            .compare_exchange(
                Shared::null(),
                Shared::null().with_tag(CLOSED_TAG),
                Ordering::AcqRel,
                Ordering::Relaxed,
                &guard,
            )
            .is_ok()
    }

    /// Moves `other`'s chain into this list if this list is empty.
    pub fn replace_list_if_empty(&self, other: &mut EpochLinkList<T>) -> bool {
        let guard = epoch::pin();
        let chain = other.head.load(Ordering::Relaxed, &guard);

        if self
            .head
            .compare_exchange(
                Shared::null(),
                chain,
                Ordering::AcqRel,
                Ordering::Relaxed,
                &guard,
            )
            .is_err()
        {
            return false;
        }

        other.head.store(Shared::null(), Ordering::Relaxed);
        true
    }

    pub fn is_closed(&self) -> bool {
        let guard = epoch::pin();
        self.head.load(Ordering::SeqCst, &guard).tag() == CLOSED_TAG
    }

    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        let head = self.head.load(Ordering::SeqCst, &guard);
        head.is_null() && head.tag() != CLOSED_TAG
    }

    fn push_with(&self, item: NonNull<T>, when_closed: WhenClosed) -> Pushed {
        let guard = epoch::pin();
        let mut node = Owned::new(Node {
            item,
            next: Atomic::null(),
        });

        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            let closed = head.tag() == CLOSED_TAG;

            if closed {
                match when_closed {
                    WhenClosed::Panic => panic!("push onto a closed list; use push_if_not_closed"),
                    WhenClosed::Reject => return Pushed::Rejected,
                    WhenClosed::Reopen => node.next.store(Shared::null(), Ordering::Relaxed),
                }
            } else {
                node.next.store(head, Ordering::Relaxed);
            }

            match self.head.compare_exchange(
                head,
                node,
                Ordering::Release,
                Ordering::Relaxed,
                &guard,
            ) {
                Ok(_) if closed => return Pushed::Reopened,
                Ok(_) => return Pushed::Linked,
                Err(err) => node = err.new,
            }
        }
    }

    fn pop_with(&self, guard: &Guard) -> Result<Option<NonNull<T>>, Closed> {
        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            if head.tag() == CLOSED_TAG {
                return Err(Closed);
            }

            // SAFETY: the guard keeps every node reachable at load time alive.
            let Some(node) = (unsafe { head.as_ref() }) else {
                return Ok(None);
            };

            let next = node.next.load(Ordering::Acquire, guard);
            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Relaxed, guard)
                .is_ok()
            {
                let item = node.item;
                // SAFETY: the node is unlinked; readers still inside the epoch
                // keep it alive until they unpin.
                unsafe { guard.defer_destroy(head) };
                return Ok(Some(item));
            }
        }
    }

    fn detach_chain(&self, replacement: Shared<'_, Node<T>>) -> Vec<NonNull<T>> {
        let guard = epoch::pin();
        let mut chain = self.head.load(Ordering::Acquire, &guard);

        loop {
            if chain.tag() == CLOSED_TAG {
                return Vec::new();
            }

            match self.head.compare_exchange(
                chain,
                replacement,
                Ordering::AcqRel,
                Ordering::Acquire,
                &guard,
            ) {
                Ok(_) => break,
                Err(err) => chain = err.current,
            }
        }

        let mut items = Vec::new();
        // SAFETY: the chain is detached; concurrent readers that loaded the
        // old head are protected by their own pins until the deferred destroy.
        while let Some(node) = unsafe { chain.as_ref() } {
            items.push(node.item);
            let next = node.next.load(Ordering::Acquire, &guard);
            unsafe { guard.defer_destroy(chain) };
            chain = next;
        }
        items
    }
}

/// The list was found closed.
struct Closed;

impl<T> Default for EpochLinkList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for EpochLinkList<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no other thread can access the list.
        unsafe {
            let guard = epoch::unprotected();
            let mut node = self.head.load(Ordering::Relaxed, guard);
            while !node.is_null() {
                let next = node.deref().next.load(Ordering::Relaxed, guard);
                drop(node.into_owned());
                node = next;
            }
        }
    }
}

impl<T> fmt::Debug for EpochLinkList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpochLinkList")
            .field("is_empty", &self.is_empty())
            .field("is_closed", &self.is_closed())
            .finish()
    }
}

impl<T: Send> LinkStack<T> for EpochLinkList<T> {
    type Local = ();

    fn local(&self) -> Self::Local {}

    fn push(&self, _local: &(), item: NonNull<T>) {
        EpochLinkList::push(self, item)
    }

    fn push_if_not_closed(&self, _local: &(), item: NonNull<T>) -> bool {
        EpochLinkList::push_if_not_closed(self, item)
    }

    fn reopen_if_closed_and_push(&self, _local: &(), item: NonNull<T>) -> bool {
        EpochLinkList::reopen_if_closed_and_push(self, item)
    }

    fn pop(&self, _local: &()) -> Option<NonNull<T>> {
        EpochLinkList::pop(self)
    }

    fn pop_if_not_closed(&self, _local: &()) -> Option<NonNull<T>> {
        EpochLinkList::pop_if_not_closed(self)
    }

    fn pop_all(&self, _local: &()) -> Vec<NonNull<T>> {
        EpochLinkList::pop_all(self)
    }

    fn pop_all_and_close(&self, _local: &()) -> Vec<NonNull<T>> {
        EpochLinkList::pop_all_and_close(self)
    }

    fn close_if_empty(&self) -> bool {
        EpochLinkList::close_if_empty(self)
    }

    fn replace_list_if_empty(&self, other: &mut Self) -> bool {
        EpochLinkList::replace_list_if_empty(self, other)
    }

    fn is_closed(&self) -> bool {
        EpochLinkList::is_closed(self)
    }

    fn is_empty(&self) -> bool {
        EpochLinkList::is_empty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    fn item(value: usize) -> NonNull<u64> {
        NonNull::new(ptr::without_provenance_mut(value)).unwrap()
    }

    #[test]
    fn test_closed_state_is_a_tagged_null() {
        let list = EpochLinkList::<u64>::new();
        assert!(list.is_empty());
        assert!(list.close_if_empty());
        assert!(list.is_closed());
        assert!(!list.is_empty());

        let guard = epoch::pin();
        let head = list.head.load(Ordering::Relaxed, &guard);
        assert!(head.is_null());
        assert_eq!(head.tag(), CLOSED_TAG);
    }

    #[test]
    fn test_reopen_replaces_tag() {
        let list = EpochLinkList::new();
        assert!(list.close_if_empty());
        assert!(!list.push_if_not_closed(item(1)));
        assert!(list.reopen_if_closed_and_push(item(2)));
        assert!(!list.is_closed());
        assert_eq!(list.pop(), Some(item(2)));
        assert_eq!(list.pop(), None);
    }

    #[test]
    fn test_drop_frees_remaining_nodes() {
        let list = EpochLinkList::new();
        for value in 1..=100 {
            list.push(item(value));
        }
        assert_eq!(list.pop(), Some(item(100)));
        drop(list);
    }
}
