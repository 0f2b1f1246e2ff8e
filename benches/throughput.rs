//! Throughput Benchmark for emberkv
//!
//! This benchmark measures the storage engine, the eviction policies and
//! the RESP codec under various workloads.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use emberkv::protocol::{parse_request, RespValue};
use emberkv::storage::{CountMinSketch, EvictionPolicy, StorageConfig, StorageEngine};
use std::time::Duration;

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let mut engine = StorageEngine::new();

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i % 500_000));
            black_box(engine.set(key, Bytes::from_static(b"small_value")).unwrap());
            i += 1;
        });
    });

    group.bench_function("set_medium", |b| {
        let mut i = 0u64;
        let value = Bytes::from("x".repeat(1024)); // 1KB value
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i % 500_000));
            black_box(engine.set(key, value.clone()).unwrap());
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let mut engine = StorageEngine::new();

    // Pre-populate with data
    for i in 0..100_000 {
        let key = Bytes::from(format!("key:{}", i));
        let value = Bytes::from(format!("value:{}", i));
        engine.set(key, value).unwrap();
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(engine.get(key.as_bytes()));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(engine.get(key.as_bytes()));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark inserts into a full key-space, one eviction step per insert
fn bench_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction");
    group.throughput(Throughput::Elements(1));

    for policy in [
        EvictionPolicy::AllkeysRandom,
        EvictionPolicy::AllkeysLru,
        EvictionPolicy::AllkeysLfu,
    ] {
        let config = StorageConfig {
            max_keys: 10_000,
            eviction_policy: policy,
            ..StorageConfig::default()
        };
        let mut engine = StorageEngine::with_seed(config, 42);
        for i in 0..10_000 {
            engine
                .set(Bytes::from(format!("warm:{}", i)), Bytes::from_static(b"v"))
                .unwrap();
        }

        group.bench_with_input(BenchmarkId::new("insert_full", policy), &policy, |b, _| {
            let mut i = 0u64;
            b.iter(|| {
                let key = Bytes::from(format!("new:{}", i));
                black_box(engine.set(key, Bytes::from_static(b"v")).unwrap());
                i += 1;
            });
        });
    }

    group.finish();
}

/// Benchmark expiry operations
fn bench_expiry(c: &mut Criterion) {
    let mut group = c.benchmark_group("expiry");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_with_ttl", |b| {
        let mut engine = StorageEngine::new();
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i % 500_000));
            black_box(
                engine
                    .set_with_ttl(key, Bytes::from_static(b"value"), Duration::from_secs(3600))
                    .unwrap(),
            );
            i += 1;
        });
    });

    group.bench_function("sweep_nothing_expired", |b| {
        let mut engine = StorageEngine::new();
        for i in 0..100_000 {
            engine
                .set_with_ttl(
                    Bytes::from(format!("ttl:{}", i)),
                    Bytes::from_static(b"value"),
                    Duration::from_secs(3600),
                )
                .unwrap();
        }
        b.iter(|| black_box(engine.sweep_expired()));
    });

    group.finish();
}

/// Benchmark KEYS pattern matching
fn bench_keys(c: &mut Criterion) {
    let mut engine = StorageEngine::new();

    // Pre-populate with various key patterns
    for i in 0..1_000 {
        for prefix in ["user", "session", "cache"] {
            engine
                .set(Bytes::from(format!("{}:{}", prefix, i)), Bytes::from_static(b"data"))
                .unwrap();
        }
    }

    let mut group = c.benchmark_group("keys");

    group.bench_function("keys_pattern", |b| {
        b.iter(|| black_box(engine.keys("user:*")));
    });

    group.bench_function("keys_all", |b| {
        b.iter(|| black_box(engine.keys("*")));
    });

    group.finish();
}

/// Benchmark the RESP codec
fn bench_protocol(c: &mut Criterion) {
    let mut group = c.benchmark_group("protocol");
    group.throughput(Throughput::Elements(1));

    let set = b"*3\r\n$3\r\nSET\r\n$8\r\nuser:123\r\n$11\r\nhello world\r\n";
    group.bench_function("parse_set", |b| {
        b.iter(|| black_box(parse_request(black_box(set)).unwrap()));
    });

    let reply = RespValue::array(vec![
        RespValue::bulk_string(Bytes::from_static(b"user:1")),
        RespValue::bulk_string(Bytes::from_static(b"user:2")),
        RespValue::integer(42),
        RespValue::null(),
    ]);
    group.bench_function("serialize_array", |b| {
        let mut buf = Vec::with_capacity(128);
        b.iter(|| {
            buf.clear();
            reply.serialize_into(&mut buf);
            black_box(buf.len());
        });
    });

    group.finish();
}

/// Benchmark the frequency sketch
fn bench_sketch(c: &mut Criterion) {
    let mut sketch = CountMinSketch::with_error(0.001, 0.01);

    let mut group = c.benchmark_group("sketch");
    group.throughput(Throughput::Elements(1));

    group.bench_function("increment", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 10_000);
            black_box(sketch.increment_by(key.as_bytes(), 1));
            i += 1;
        });
    });

    group.bench_function("count", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 10_000);
            black_box(sketch.count(key.as_bytes()));
            i += 1;
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_eviction,
    bench_expiry,
    bench_keys,
    bench_protocol,
    bench_sketch,
);

criterion_main!(benches);
