//! Object pool built on [`LockFreeList`].

use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::utils::CachePadded;

use crate::allocator::{LinkAllocator, LinkCache};
use crate::list::LockFreeList;

/// A pool of boxed objects that threads hand back and forth without locking.
///
/// The pool owns every object released into it and drops them when the pool
/// itself is dropped.
pub struct ObjectPool<T> {
    free: LockFreeList<T>,
    created: CachePadded<AtomicUsize>,
    pooled: CachePadded<AtomicUsize>,
}

impl<T: Send> ObjectPool<T> {
    pub fn new() -> Self {
        Self::with_allocator(LinkAllocator::global())
    }

    pub fn with_allocator(allocator: &'static LinkAllocator) -> Self {
        ObjectPool {
            free: LockFreeList::with_allocator(allocator),
            created: CachePadded::new(AtomicUsize::new(0)),
            pooled: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a link cache for the calling thread.
    pub fn cache(&self) -> LinkCache {
        self.free.allocator().cache()
    }

    /// Takes a pooled object, or builds one with `make` when the pool is empty.
    pub fn acquire(&self, cache: &LinkCache, make: impl FnOnce() -> T) -> Box<T> {
        match self.free.pop(cache) {
            Some(object) => {
                self.pooled.fetch_sub(1, Ordering::Relaxed);
                // SAFETY: every pointer in `free` came from `Box::into_raw` in
                // `release` and was popped exactly once.
                unsafe { Box::from_raw(object.as_ptr()) }
            }
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                Box::new(make())
            }
        }
    }

    /// Hands `object` back to the pool.
    pub fn release(&self, cache: &LinkCache, object: Box<T>) {
        self.pooled.fetch_add(1, Ordering::Relaxed);
        self.free
            .push(cache, NonNull::from(Box::leak(object)));
    }

    /// Objects created by this pool and not currently pooled.
    ///
    /// Objects released into the pool that it did not create make this
    /// saturate at zero.
    pub fn num_used(&self) -> usize {
        self.created
            .load(Ordering::Relaxed)
            .saturating_sub(self.pooled.load(Ordering::Relaxed))
    }

    /// Objects waiting in the pool.
    pub fn num_free(&self) -> usize {
        self.pooled.load(Ordering::Relaxed)
    }
}

impl<T: Send> Default for ObjectPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for ObjectPool<T> {
    fn drop(&mut self) {
        let cache = self.free.allocator().cache();
        for object in self.free.pop_all(&cache) {
            // SAFETY: see `acquire`; the pool is the last owner.
            drop(unsafe { Box::from_raw(object.as_ptr()) });
        }
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("created", &self.created.load(Ordering::Relaxed))
            .field("pooled", &self.pooled.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::AllocatorConfig;
    use std::sync::Arc;
    use std::thread;

    fn pool<T: Send>() -> ObjectPool<T> {
        ObjectPool::with_allocator(
            LinkAllocator::leak(AllocatorConfig::new().with_links_per_bundle(16)).unwrap(),
        )
    }

    #[test]
    fn test_acquire_reuses_released_objects() {
        let pool = pool::<Vec<u8>>();
        let cache = pool.cache();

        let mut buffer = pool.acquire(&cache, || Vec::with_capacity(64));
        buffer.extend_from_slice(b"abc");
        let address = &*buffer as *const Vec<u8>;
        pool.release(&cache, buffer);
        assert_eq!(pool.num_free(), 1);
        assert_eq!(pool.num_used(), 0);

        let buffer = pool.acquire(&cache, || unreachable!("pool should not be empty"));
        assert_eq!(&*buffer as *const Vec<u8>, address);
        assert_eq!(buffer.as_slice(), b"abc");
        assert_eq!(pool.num_used(), 1);
        pool.release(&cache, buffer);
    }

    #[test]
    fn test_drop_frees_pooled_objects() {
        let tracker = Arc::new(());
        {
            let pool = pool::<Arc<()>>();
            let cache = pool.cache();
            for _ in 0..5 {
                let object = pool.acquire(&cache, || Arc::clone(&tracker));
                pool.release(&cache, object);
            }
            let objects: Vec<_> = (0..3)
                .map(|_| pool.acquire(&cache, || Arc::clone(&tracker)))
                .collect();
            for object in objects {
                pool.release(&cache, object);
            }
            assert_eq!(Arc::strong_count(&tracker), 4);
        }

        assert_eq!(Arc::strong_count(&tracker), 1);
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let pool = Arc::new(pool::<[u64; 4]>());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    let cache = pool.cache();
                    for i in 0..1000u64 {
                        let mut object = pool.acquire(&cache, || [0; 4]);
                        object[0] = i;
                        pool.release(&cache, object);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.num_used(), 0);
        assert!(pool.num_free() <= 8);
    }
}
