//! Benchmarks for index construction and query latency.
//!
//! These measure the two operations the host drives in steady state:
//! row inserts (search + prune + backlink) and k-NN queries.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;

use annex::{IndexCursor, IndexDescriptor, IndexParams, StdVfs, Vector};

fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.random_range(-1.0f32..1.0)).collect())
        .collect()
}

fn descriptor(dim: usize) -> IndexDescriptor {
    let mut d = IndexDescriptor::new("bench", dim);
    d.params = IndexParams {
        max_degree: 12,
        search_list: 32,
        alpha: 1.2,
    };
    d
}

fn build_index(dir: &tempfile::TempDir, dim: usize, vectors: &[Vec<f32>]) -> IndexCursor {
    let db = dir.path().join("bench.db").to_string_lossy().into_owned();
    let mut cursor = IndexCursor::open(&StdVfs, &db, &descriptor(dim)).unwrap();
    for (i, v) in vectors.iter().enumerate() {
        cursor
            .insert(&Vector::from_f32(v.clone()).to_blob(), i as u64 + 1)
            .unwrap();
    }
    cursor
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for dim in [16usize, 32, 64].iter() {
        let vectors = random_vectors(129, *dim, 42);
        group.throughput(Throughput::Elements(1));

        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |bench, dim| {
            bench.iter_batched(
                || {
                    let dir = tempfile::tempdir().unwrap();
                    let cursor = build_index(&dir, *dim, &vectors[..128]);
                    (dir, cursor)
                },
                |(_dir, mut cursor)| {
                    let blob = Vector::from_f32(vectors[128].clone()).to_blob();
                    cursor.insert(black_box(&blob), 999).unwrap()
                },
                criterion::BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_top10");

    for dim in [16usize, 32, 64].iter() {
        let vectors = random_vectors(512, *dim, 7);
        let dir = tempfile::tempdir().unwrap();
        let mut cursor = build_index(&dir, *dim, &vectors);
        let query = Vector::from_f32(random_vectors(1, *dim, 99)[0].clone());

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |bench, _| {
            bench.iter(|| cursor.search(black_box(&query), 10).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_insert, bench_search);
criterion_main!(benches);
