//! Benchmark for LockFreeList and its link allocator:
//! - single-threaded push/pop, pop_all drain, producer/consumer and contention
//!
//! Run with: cargo bench --package freelink-core --bench link_list_benchmark

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use mimalloc::MiMalloc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use freelink_core::common_tests::token;
use freelink_core::{AllocatorConfig, LinkAllocator, LockFreeList};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const OPS_PER_THREAD: usize = 10_000;

type TokenList = LockFreeList<u64>;

// ============================================================================
// Helpers
// ============================================================================

fn bench_push_pop(list: &TokenList, count: usize) {
    let cache = list.allocator().cache();
    for i in 0..count {
        list.push(&cache, token(i));
    }
    for _ in 0..count {
        black_box(list.pop(&cache));
    }
}

fn bench_push_drain(list: &TokenList, count: usize) {
    let cache = list.allocator().cache();
    for i in 0..count {
        list.push(&cache, token(i));
    }
    black_box(list.pop_all(&cache));
}

/// Every thread pushes and immediately pops, keeping the list shallow
fn bench_contention(list: Arc<TokenList>, thread_count: usize, ops_per_thread: usize) {
    let mut handles = vec![];

    for t in 0..thread_count {
        let list_clone = Arc::clone(&list);
        let handle = thread::spawn(move || {
            let cache = list_clone.allocator().cache();
            let base = t * ops_per_thread;
            for i in 0..ops_per_thread {
                list_clone.push(&cache, token(base + i));
                black_box(list_clone.pop(&cache));
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

/// Half the threads push, the other half pop until everything is consumed
fn bench_producer_consumer(list: Arc<TokenList>, thread_count: usize, ops_per_thread: usize) {
    let producers = (thread_count / 2).max(1);
    let total = producers * ops_per_thread;
    let consumed = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    for t in 0..producers {
        let list_clone = Arc::clone(&list);
        handles.push(thread::spawn(move || {
            let cache = list_clone.allocator().cache();
            let base = t * ops_per_thread;
            for i in 0..ops_per_thread {
                list_clone.push(&cache, token(base + i));
            }
        }));
    }

    for _ in 0..producers {
        let list_clone = Arc::clone(&list);
        let consumed = Arc::clone(&consumed);
        handles.push(thread::spawn(move || {
            let cache = list_clone.allocator().cache();
            while consumed.load(Ordering::Relaxed) < total {
                if list_clone.pop(&cache).is_some() {
                    consumed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

// ============================================================================
// Benchmark groups
// ============================================================================

fn sequential_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_link_list_benchmark");
    let list = TokenList::new();

    for size in [100, 1000, 10_000] {
        group.bench_with_input(BenchmarkId::new("push_pop", size), &size, |b, &size| {
            b.iter(|| bench_push_pop(&list, black_box(size)))
        });

        group.bench_with_input(BenchmarkId::new("push_pop_all", size), &size, |b, &size| {
            b.iter(|| bench_push_drain(&list, black_box(size)))
        });
    }

    group.finish();
}

fn bundle_size_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("bundle_size_link_list_benchmark");

    for links_per_bundle in [16, 256, 1024, 8192] {
        let allocator = LinkAllocator::leak(
            AllocatorConfig::new().with_links_per_bundle(links_per_bundle),
        )
        .unwrap();

        group.bench_with_input(
            BenchmarkId::new("producer_consumer_4_threads", links_per_bundle),
            &links_per_bundle,
            |b, _| {
                b.iter(|| {
                    let list = Arc::new(TokenList::with_allocator(allocator));
                    bench_producer_consumer(list, black_box(4), black_box(OPS_PER_THREAD))
                })
            },
        );
    }

    group.finish();
}

fn contention_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention_link_list_benchmark");

    for threads in [1, 2, 4, 8, 16] {
        group.bench_with_input(
            BenchmarkId::new("push_pop", threads),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    let list = Arc::new(TokenList::new());
                    bench_contention(list, black_box(threads), black_box(OPS_PER_THREAD))
                })
            },
        );

        group.bench_with_input(
            BenchmarkId::new("producer_consumer", threads),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    let list = Arc::new(TokenList::new());
                    bench_producer_consumer(list, black_box(threads), black_box(OPS_PER_THREAD))
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    sequential_benchmark,
    bundle_size_benchmark,
    contention_benchmark,
);
criterion_main!(benches);
