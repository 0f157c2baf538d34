//! Coordinator address list parsing benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use madrone_client::{AddressSet, MAX_ADDRESSES};

/// Build a comma-separated endpoint list of the given length.
fn endpoint_list(count: usize) -> String {
    (0..count)
        .map(|i| format!("coord-{i}.cluster.local:{}", 11810 + (i % 100)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Benchmark parsing well-formed lists of increasing length.
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("address_parse");

    for count in [1usize, 8, 64, 128].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let raw = endpoint_list(count);
            let mut addresses = AddressSet::new(MAX_ADDRESSES);

            b.iter(|| {
                addresses.parse(black_box(&raw)).unwrap();
                black_box(addresses.len());
            });
        });
    }
    group.finish();
}

/// Benchmark parsing a list longer than the cap, which stops early.
fn bench_parse_capped(c: &mut Criterion) {
    let mut group = c.benchmark_group("address_parse_capped");
    group.throughput(Throughput::Elements(MAX_ADDRESSES as u64));

    group.bench_function("256_into_128", |b| {
        let raw = endpoint_list(256);
        let mut addresses = AddressSet::new(MAX_ADDRESSES);

        b.iter(|| {
            addresses.parse(black_box(&raw)).unwrap();
            black_box(addresses.len());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_parse, bench_parse_capped);
criterion_main!(benches);
