//! Record hashing benchmarks.

use auditor_bench::random_event;
use auditor_codec::to_canonical_cbor;
use auditor_core::{compute_hash, verify_chain, AuditEvent, Record, Schema};
use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn schema() -> Schema<AuditEvent> {
    AuditEvent::schema().build().unwrap()
}

/// A chain of `len` linked events.
fn chain(schema: &Schema<AuditEvent>, len: usize) -> Vec<AuditEvent> {
    let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let mut previous = String::new();
    (0..len)
        .map(|i| {
            let mut event = random_event("acme", 64).at(start + Duration::seconds(i as i64));
            event.previous_hash = previous.clone();
            event.hash = compute_hash(schema, &event).unwrap();
            previous = event.hash.clone();
            event
        })
        .collect()
}

/// Benchmark the canonical encoding of the hash input.
fn bench_hash_input(c: &mut Criterion) {
    let schema = schema();
    let mut group = c.benchmark_group("hash_input");

    for payload in [16, 256, 4096].iter() {
        group.throughput(Throughput::Bytes(*payload as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(payload),
            payload,
            |b, &payload| {
                let event = random_event("acme", payload).at(Utc::now());
                b.iter(|| {
                    let input = schema.hash_input(black_box(&event));
                    black_box(to_canonical_cbor(&input).unwrap());
                });
            },
        );
    }
    group.finish();
}

/// Benchmark computing a record hash.
fn bench_compute_hash(c: &mut Criterion) {
    let schema = schema();
    let mut group = c.benchmark_group("compute_hash");

    for payload in [16, 256, 4096].iter() {
        group.throughput(Throughput::Bytes(*payload as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(payload),
            payload,
            |b, &payload| {
                let event = random_event("acme", payload).at(Utc::now());
                b.iter(|| black_box(compute_hash(&schema, black_box(&event)).unwrap()));
            },
        );
    }
    group.finish();
}

/// Benchmark verifying a whole chain.
fn bench_verify_chain(c: &mut Criterion) {
    let schema = schema();
    let mut group = c.benchmark_group("verify_chain");

    for len in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), len, |b, &len| {
            let records = chain(&schema, len);
            b.iter(|| {
                let report = verify_chain(&schema, black_box(&records)).unwrap();
                assert!(report.is_valid());
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_hash_input,
    bench_compute_hash,
    bench_verify_chain
);
criterion_main!(benches);
