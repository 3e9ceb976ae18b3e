use std::ptr::NonNull;

/// A concurrent LIFO stack of payload pointers with an in-band closed state.
///
/// # States
///
/// ```text
///            push / pop                   close_if_empty
/// Open-NonEmpty ◄──────► Open-Empty ─────────────────────► Closed
///       ▲                                                     │
///       └──────────────── reopen_if_closed_and_push ──────────┘
///
///   pop_all_and_close: Open-* ──► Closed in a single CAS
/// ```
///
/// # Per-thread handle
///
/// Every operation that may allocate or recycle takes the caller's
/// [`Local`](LinkStack::Local) handle, created on the thread that uses it with
/// [`local`](LinkStack::local). Implementations that need no per-thread state
/// use `()`.
///
/// # Contract
///
/// - `push` and `pop` must not be used on a closed stack; both panic if they
///   find it closed. Use the `_if_not_closed` variants when the stack may be
///   closed concurrently.
/// - `is_closed` and `is_empty` are advisory under concurrent modification.
///
pub trait LinkStack<T>: Send + Sync {
    /// Per-thread handle passed to every allocating operation.
    type Local;

    /// Creates a handle for the calling thread.
    fn local(&self) -> Self::Local;

    /// Pushes `item` on an open stack.
    fn push(&self, local: &Self::Local, item: NonNull<T>);

    /// Pushes `item` unless the stack is closed. Returns `false` if closed.
    fn push_if_not_closed(&self, local: &Self::Local, item: NonNull<T>) -> bool;

    /// Pushes `item`, reopening the stack if it was closed.
    ///
    /// Returns `true` if this call reopened the stack.
    fn reopen_if_closed_and_push(&self, local: &Self::Local, item: NonNull<T>) -> bool;

    /// Pops the most recently pushed item of an open stack.
    fn pop(&self, local: &Self::Local) -> Option<NonNull<T>>;

    /// Pops the most recently pushed item, treating a closed stack as empty.
    fn pop_if_not_closed(&self, local: &Self::Local) -> Option<NonNull<T>>;

    /// Atomically takes every item, newest first, leaving the stack empty.
    ///
    /// A closed stack yields nothing and stays closed.
    fn pop_all(&self, local: &Self::Local) -> Vec<NonNull<T>>;

    /// Atomically takes every item, newest first, and closes the stack.
    fn pop_all_and_close(&self, local: &Self::Local) -> Vec<NonNull<T>>;

    /// Closes the stack if it is empty. Returns `true` if it did.
    fn close_if_empty(&self) -> bool;

    /// Moves `other`'s whole chain into this stack if this stack is empty.
    ///
    /// `other` is borrowed mutably, so nobody can modify it during the
    /// hand-off. On success `other` is left empty.
    fn replace_list_if_empty(&self, other: &mut Self) -> bool
    where
        Self: Sized;

    fn is_closed(&self) -> bool;

    /// `true` if the stack is open and holds no item. A closed stack is not
    /// empty.
    fn is_empty(&self) -> bool;
}
