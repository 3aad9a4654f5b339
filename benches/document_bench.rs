//! Benchmarks for document edits and operation transform
//!
//! Run with: cargo bench

use collabwrite::ot::{transform, DocumentState, Operation};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn seed_text(len: usize) -> String {
    "lorem ipsum é→ "
        .chars()
        .cycle()
        .take(len)
        .collect()
}

fn bench_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply");

    for size in [100, 1_000, 10_000] {
        let text = seed_text(size);
        let middle = size / 2;

        group.throughput(Throughput::Elements(1));

        group.bench_function(format!("insert_{}", size), |b| {
            b.iter_batched(
                || DocumentState::new(text.as_str(), 0),
                |mut state| state.apply(black_box(&Operation::insert(middle, "x", 0, "bench"))),
                criterion::BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("delete_{}", size), |b| {
            b.iter_batched(
                || DocumentState::new(text.as_str(), 0),
                |mut state| state.apply(black_box(&Operation::delete(middle, 5, 0, "bench"))),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform");

    let insert_old = Operation::insert(10, "abc", 1, "a");
    let insert_new = Operation::insert(4, "z", 2, "b");
    let delete_old = Operation::delete(3, 8, 1, "a");
    let delete_new = Operation::delete(6, 4, 2, "b");

    group.bench_function("insert_insert", |b| {
        b.iter(|| transform(black_box(&insert_old), black_box(&insert_new)))
    });

    group.bench_function("delete_delete_overlap", |b| {
        b.iter(|| transform(black_box(&delete_old), black_box(&delete_new)))
    });

    group.bench_function("insert_delete", |b| {
        b.iter(|| transform(black_box(&insert_old), black_box(&delete_new)))
    });

    group.finish();
}

criterion_group!(benches, bench_apply, bench_transform);
criterion_main!(benches);
