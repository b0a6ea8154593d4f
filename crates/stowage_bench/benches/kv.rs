//! Key-value engine benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stowage_bench::{generate_keys, sample_record};
use stowage_codec::Value;
use stowage_core::kv::{DerivedOp, KvEngine, NumOp};
use stowage_core::KvConfig;

fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("kv_set");

    for count in [100usize, 1000, 10_000] {
        let keys = generate_keys("user:", count);
        let value = sample_record();
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &keys, |b, keys| {
            b.iter(|| {
                let engine = KvEngine::new(KvConfig::new().disable_ttl(true));
                for key in keys {
                    engine.set(key, value.clone(), 0);
                }
                black_box(engine.count());
            });
        });
    }

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let engine = KvEngine::new(KvConfig::new().disable_ttl(true));
    let keys = generate_keys("user:", 10_000);
    for key in &keys {
        engine.set(key, sample_record(), 0);
    }

    c.bench_function("kv_get_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            let key = &keys[i % keys.len()];
            i += 1;
            black_box(engine.get(black_box(key)));
        });
    });

    c.bench_function("kv_get_miss", |b| {
        b.iter(|| black_box(engine.get(black_box("absent"))));
    });

    c.bench_function("kv_keys_10k", |b| {
        b.iter(|| black_box(engine.keys()));
    });
}

fn bench_increment(c: &mut Criterion) {
    let engine = KvEngine::new(KvConfig::new().disable_ttl(true));
    engine.set("counter", Value::Integer(0), 0);

    c.bench_function("kv_increment", |b| {
        b.iter(|| {
            let op = DerivedOp::Numeric(NumOp::Increment, Value::Integer(1));
            black_box(engine.apply(black_box("counter"), op).unwrap());
        });
    });
}

criterion_group!(benches, bench_set, bench_get, bench_increment);
criterion_main!(benches);
