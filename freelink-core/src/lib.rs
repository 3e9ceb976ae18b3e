//! Lock-free LIFO lists of opaque payload pointers.
//!
//! [`LockFreeList`] is a Treiber-style stack whose nodes ("links") come from a
//! bundle-based [`LinkAllocator`]. Readers protect the head link with a pin
//! count instead of an epoch, and links are recycled by whichever thread drops
//! the last pin of an unlinked link. A list can be closed with a sentinel head
//! so producers learn that nobody will consume what they push.
//!
//! ```
//! use std::ptr::NonNull;
//! use freelink_core::LockFreeList;
//!
//! let list = LockFreeList::<u32>::new();
//! let cache = list.allocator().cache();
//!
//! let mut value = 7;
//! list.push(&cache, NonNull::from(&mut value));
//! assert_eq!(list.pop(&cache), Some(NonNull::from(&mut value)));
//!
//! assert!(list.close_if_empty());
//! assert!(!list.push_if_not_closed(&cache, NonNull::from(&mut value)));
//! ```

pub mod allocator;
pub mod common_tests;
pub mod error;
pub mod list;
pub mod pool;

pub use allocator::{AllocatorConfig, AllocatorStats, LinkAllocator, LinkCache};
pub use error::{AllocatorError, Result};
pub use list::{LinkStack, LockFreeList};
pub use pool::ObjectPool;
