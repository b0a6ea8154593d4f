//! Object engine benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stowage_bench::{generate_keys, random_data};
use stowage_core::object::ObjectEngine;
use stowage_core::ObjectConfig;
use tempfile::TempDir;

fn open(dir: &TempDir) -> std::sync::Arc<ObjectEngine> {
    let config = ObjectConfig::new(dir.path()).enable_compaction(false);
    ObjectEngine::open("bench", "files", &config).unwrap()
}

fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("object_put");
    group.sample_size(20);

    for size in [1024usize, 64 * 1024, 1024 * 1024] {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir);
        let data = random_data(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                engine.put(&format!("obj{i}"), black_box(data)).unwrap();
            });
        });
        engine.shutdown();
    }

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("object_get");

    for size in [1024usize, 64 * 1024, 1024 * 1024] {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir);
        let keys = generate_keys("obj", 16);
        for key in &keys {
            engine.put(key, &random_data(size)).unwrap();
        }
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &keys, |b, keys| {
            let mut i = 0;
            b.iter(|| {
                let key = &keys[i % keys.len()];
                i += 1;
                black_box(engine.get(key).unwrap());
            });
        });
        engine.shutdown();
    }

    group.finish();
}

fn bench_reopen(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    {
        let engine = open(&dir);
        for key in generate_keys("obj", 1000) {
            engine.put(&key, &random_data(256)).unwrap();
        }
        engine.shutdown();
    }

    c.bench_function("object_reopen_1000", |b| {
        b.iter(|| {
            let engine = open(&dir);
            black_box(engine.count());
            engine.shutdown();
        });
    });
}

criterion_group!(benches, bench_put, bench_get, bench_reopen);
criterion_main!(benches);
