//! Codex value codec benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stowage_bench::{nested_value, random_data, sample_record};
use stowage_codec::{decode_value, encode_value, Value};

fn bench_encode_simple(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for (name, value) in [
        ("empty", Value::Empty),
        ("integer", Value::Integer(42)),
        ("string_short", Value::from("hello")),
        ("string_long", Value::from("x".repeat(1000))),
        ("record", sample_record()),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| black_box(encode_value(black_box(&value)).unwrap()));
        });
    }

    group.finish();
}

fn bench_encode_binary(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_binary");

    for size in [64usize, 1024, 16 * 1024, 256 * 1024] {
        let value = Value::Binary(random_data(size));
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &value, |b, value| {
            b.iter(|| black_box(encode_value(black_box(value)).unwrap()));
        });
    }

    group.finish();
}

fn bench_nested(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested");

    for (depth, width) in [(2usize, 4usize), (3, 5), (4, 6)] {
        let value = nested_value(depth, width);
        let encoded = encode_value(&value).unwrap();
        let id = format!("d{depth}_w{width}");
        group.throughput(Throughput::Bytes(encoded.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode", &id), &value, |b, value| {
            b.iter(|| black_box(encode_value(black_box(value)).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decode", &id), &encoded, |b, bytes| {
            b.iter(|| black_box(decode_value(black_box(bytes)).unwrap()));
        });
    }

    group.finish();
}

fn bench_decode_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_list");

    for len in [10usize, 100, 1000] {
        let value = Value::List((0..len as i64).map(Value::Integer).collect());
        let encoded = encode_value(&value).unwrap();
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &encoded, |b, bytes| {
            b.iter(|| black_box(decode_value(black_box(bytes)).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_encode_simple,
    bench_encode_binary,
    bench_nested,
    bench_decode_list
);
criterion_main!(benches);
