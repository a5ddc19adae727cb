//! Queue store benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use synq_bench::{memory_queue, queue_items};

/// Enqueue into a queue that already holds `size` items.
fn bench_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_enqueue");
    group.sample_size(30);

    for size in [10, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let queue = memory_queue(usize::MAX);
            for item in queue_items(size, 64) {
                queue.enqueue(item);
            }
            let extra = queue_items(1, 64).remove(0);

            b.iter(|| {
                queue.enqueue(black_box(extra.clone()));
            });
        });
    }

    group.finish();
}

/// Priority-ordered snapshot taken at the start of each pass.
fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_snapshot");

    for size in [100, 1000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let queue = memory_queue(size);
            for item in queue_items(size, 64) {
                queue.enqueue(item);
            }

            b.iter(|| {
                let snapshot = queue.snapshot();
                black_box(snapshot);
            });
        });
    }

    group.finish();
}

/// Enqueue into a full queue, which evicts and archives the oldest item.
fn bench_overflow(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_overflow");
    group.sample_size(20);

    group.bench_function("full_1000", |b| {
        let queue = memory_queue(1000);
        for item in queue_items(1000, 64) {
            queue.enqueue(item);
        }
        let mut extra = queue_items(1000, 64).into_iter().cycle();

        b.iter(|| {
            if let Some(item) = extra.next() {
                queue.enqueue(black_box(item));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_enqueue, bench_snapshot, bench_overflow);
criterion_main!(benches);
