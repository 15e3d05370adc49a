//! Transaction benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use keel_bench::utils::memory_db;
use keel_storage::BlockId;

/// Benchmark a transaction doing logged writes then committing.
fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");

    for writes in [1, 10, 50].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(writes), writes, |b, &writes| {
            let db = memory_db(8);
            let block = BlockId::new("bench.tbl", 0);
            b.iter(|| {
                let mut tx = db.begin().unwrap();
                tx.pin(&block).unwrap();
                for i in 0..writes {
                    tx.set_int(&block, (i % 100) * 4, black_box(i as i32), true).unwrap();
                }
                tx.commit().unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark the same work undone by rollback.
fn bench_rollback(c: &mut Criterion) {
    let mut group = c.benchmark_group("rollback");

    for writes in [1, 10, 50].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(writes), writes, |b, &writes| {
            let db = memory_db(8);
            let block = BlockId::new("bench.tbl", 0);
            b.iter(|| {
                let mut tx = db.begin().unwrap();
                tx.pin(&block).unwrap();
                for i in 0..writes {
                    tx.set_string(&block, (i % 40) * 100, "bench", true).unwrap();
                }
                tx.rollback().unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_commit, bench_rollback);
criterion_main!(benches);
