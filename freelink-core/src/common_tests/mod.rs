//! Test suites shared by every [`LinkStack`](crate::LinkStack) implementation.
//!
//! Payloads are opaque to a link stack, so the suites push tokens: non-null
//! pointers whose address encodes a value and which are never dereferenced.


use std::ptr::{self, NonNull};

/// A payload pointer encoding `value`.
pub fn token(value: usize) -> NonNull<u64> {
    match NonNull::new(ptr::without_provenance_mut(value + 1)) {
        Some(token) => token,
        None => unreachable!("token address is never zero"),
    }
}

/// The value encoded by `token`.
pub fn token_value(token: NonNull<u64>) -> usize {
    token.as_ptr().addr() - 1
}

/// Values of `tokens`, in order.
pub fn token_values(tokens: Vec<NonNull<u64>>) -> Vec<usize> {
    tokens.into_iter().map(token_value).collect()
}
