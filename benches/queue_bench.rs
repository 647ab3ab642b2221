//! Benchmarks for the bounded queue and the worker pool.
//!
//! Benchmarks cover:
//! - Single-threaded push/pop on the queue
//! - Producer/consumer hand-off across threads
//! - End-to-end pool submission throughput

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;
use std::thread;

use taskyard::core::{BoundedBlockingQueue, WaitTimeout, WorkerPool};

// ============================================================================
// Queue Benchmarks
// ============================================================================

fn bench_queue_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_push_pop");

    for size in [16usize, 256, 4096] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let queue = BoundedBlockingQueue::new(size);
            b.iter(|| {
                for i in 0..size {
                    queue.push(black_box(i)).ok();
                }
                while let Some(item) = queue.pop(WaitTimeout::Immediate) {
                    black_box(item);
                }
            });
        });
    }

    group.finish();
}

fn bench_queue_handoff(c: &mut Criterion) {
    const ITEMS: usize = 10_000;
    let mut group = c.benchmark_group("queue_handoff");
    group.throughput(Throughput::Elements(ITEMS as u64));

    for capacity in [1usize, 64, 1024] {
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                b.iter(|| {
                    let queue = Arc::new(BoundedBlockingQueue::new(capacity));
                    let consumer = {
                        let queue = Arc::clone(&queue);
                        thread::spawn(move || {
                            let mut sum = 0usize;
                            for _ in 0..ITEMS {
                                sum += queue.pop(WaitTimeout::Forever).unwrap_or(0);
                            }
                            sum
                        })
                    };
                    for i in 0..ITEMS {
                        queue.push_timeout(i, WaitTimeout::Forever).ok();
                    }
                    black_box(consumer.join().unwrap_or(0))
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Pool Benchmarks
// ============================================================================

fn bench_pool_submit(c: &mut Criterion) {
    const TASKS: usize = 1_000;
    let mut group = c.benchmark_group("pool_submit");
    group.throughput(Throughput::Elements(TASKS as u64));

    for workers in [1usize, 4] {
        let pool = WorkerPool::builder()
            .worker_count(workers)
            .build_started()
            .expect("pool starts");

        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, _| {
            b.iter(|| {
                for i in 0..TASKS {
                    let handle = pool.submit(move || black_box(i) * 2).ok();
                    black_box(handle);
                }
                pool.wait(WaitTimeout::Forever)
            });
        });

        pool.stop();
    }

    group.finish();
}

criterion_group!(benches, bench_queue_push_pop, bench_queue_handoff, bench_pool_submit);
criterion_main!(benches);
