//! Crossbeam-based implementation of the freelink `LinkStack` contract.
//!
//! This crate provides `EpochLinkList`, a closable lock-free LIFO list that
//! reclaims its nodes through crossbeam-epoch instead of pin counts and a
//! bundle allocator. It behaves exactly like `LockFreeList` and serves as a
//! reference point when comparing reclamation schemes.
//!
//! # Usage
//!
//! ```
//! use std::ptr::NonNull;
//! use freelink_crossbeam::EpochLinkList;
//!
//! let list = EpochLinkList::<u32>::new();
//! let mut value = 1;
//! list.push(NonNull::from(&mut value));
//! assert_eq!(list.pop_all_and_close().len(), 1);
//! assert!(list.is_closed());
//! ```

pub mod epoch_link_list;

pub use epoch_link_list::{CLOSED_TAG, EpochLinkList};
