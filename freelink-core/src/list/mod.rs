//! Closable lock-free LIFO lists.

mod link_stack;
mod lock_free_list;
mod pinned_link;

pub use link_stack::LinkStack;
pub use lock_free_list::LockFreeList;
