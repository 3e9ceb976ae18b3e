use std::sync::{Arc, Once};
use std::thread;

use freelink_core::common_tests::{token, token_value};
use freelink_core::{AllocatorConfig, AllocatorError, LinkAllocator, LockFreeList, ObjectPool};

static INIT_TRACING: Once = Once::new();

fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init();
    });
}

fn allocator(links_per_bundle: usize) -> &'static LinkAllocator {
    init_tracing();
    LinkAllocator::leak(AllocatorConfig::new().with_links_per_bundle(links_per_bundle)).unwrap()
}

#[test]
fn test_config_bounds() {
    assert_eq!(
        LinkAllocator::new(AllocatorConfig::new().with_links_per_bundle(0)).unwrap_err(),
        AllocatorError::EmptyBundle
    );

    let too_large = freelink_core::allocator::MAX_LINKS_PER_BUNDLE + 1;
    assert_eq!(
        LinkAllocator::new(AllocatorConfig::new().with_links_per_bundle(too_large)).unwrap_err(),
        AllocatorError::BundleTooLarge {
            requested: too_large,
            max: freelink_core::allocator::MAX_LINKS_PER_BUNDLE,
        }
    );

    assert!(LinkAllocator::new(AllocatorConfig::new().with_links_per_bundle(1)).is_ok());
}

#[test]
fn test_single_link_bundles() {
    let allocator = allocator(1);
    let list = LockFreeList::with_allocator(allocator);
    let cache = allocator.cache();

    for value in 0..10 {
        list.push(&cache, token(value));
    }
    assert_eq!(allocator.stats().bundles_carved, 10);

    let drained: Vec<_> = list.pop_all(&cache).into_iter().map(token_value).collect();
    assert_eq!(drained, (0..10).rev().collect::<Vec<_>>());
    assert_eq!(allocator.num_used(), 0);
    assert_eq!(allocator.num_free(), 10);
}

#[test]
fn test_links_migrate_between_threads() {
    let allocator = allocator(16);
    let list = Arc::new(LockFreeList::with_allocator(allocator));
    let items = 10_000;

    // One thread only allocates, the other only recycles.
    let producer = {
        let list = Arc::clone(&list);
        thread::spawn(move || {
            let cache = list.allocator().cache();
            for value in 0..items {
                list.push(&cache, token(value));
            }
        })
    };
    let consumer = {
        let list = Arc::clone(&list);
        thread::spawn(move || {
            let cache = list.allocator().cache();
            let mut popped = 0;
            while popped < items {
                if list.pop(&cache).is_some() {
                    popped += 1;
                } else {
                    thread::yield_now();
                }
            }
        })
    };

    producer.join().unwrap();
    consumer.join().unwrap();

    let stats = allocator.stats();
    assert_eq!(stats.links_used, 0);
    assert_eq!(stats.links_recycled, items);
    // The consumer's full bundles flow back to the producer through the store,
    // so far fewer bundles are carved than links pushed.
    assert!(stats.bundles_carved * 16 <= items + 16 * 4);
    assert_eq!(stats.links_free, stats.bundles_carved * 16);
}

#[test]
fn test_many_short_lived_caches() {
    let allocator = allocator(32);
    let list = Arc::new(LockFreeList::with_allocator(allocator));

    let handles: Vec<_> = (0..16)
        .map(|t| {
            let list = Arc::clone(&list);
            thread::spawn(move || {
                for round in 0..20 {
                    let cache = list.allocator().cache();
                    list.push(&cache, token(t * 100 + round));
                    assert!(list.pop(&cache).is_some());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(list.is_empty());
    assert_eq!(allocator.num_used(), 0);
    assert_eq!(allocator.stats().links_recycled, 16 * 20);
}

#[test]
fn test_object_pool_on_shared_allocator() {
    let allocator = allocator(8);
    let pool = Arc::new(ObjectPool::<String>::with_allocator(allocator));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let cache = pool.cache();
                for i in 0..500 {
                    let mut text = pool.acquire(&cache, String::new);
                    text.clear();
                    text.push_str(&format!("{t}:{i}"));
                    pool.release(&cache, text);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(pool.num_used(), 0);
    assert_eq!(allocator.num_used(), pool.num_free());
}
