//! Session-layer operation benchmarks over the in-memory cluster.

use bson::{doc, Document};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use madrone_client::{ClientConfig, QueryOptions, SessionRegistry};
use madrone_driver::{MemoryDriver, Op, StatusCode};
use rand::Rng;

fn ready_registry() -> SessionRegistry {
    SessionRegistry::new(MemoryDriver::new(), ClientConfig::default())
}

/// Benchmark single-document inserts through the full session stack.
fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    group.bench_function("single", |b| {
        let registry = ready_registry();
        let session = registry.get_or_create(1, false, true).unwrap();
        let table = session.create_collection("bench", "rows").unwrap();
        let payload = "x".repeat(64);
        let mut rng = rand::thread_rng();

        b.iter(|| {
            let row = doc! { "k": rng.gen::<i64>(), "payload": payload.as_str() };
            table.insert(black_box(&row)).unwrap();
        });
    });
    group.finish();
}

/// Benchmark chunked batch inserts. Rows carry fixed ids and replace their
/// predecessors, so the collection stays the same size across iterations.
fn bench_bulk_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_insert");

    for batch in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &batch| {
            let registry = ready_registry();
            let session = registry.get_or_create(1, false, true).unwrap();
            let table = session.create_collection("bench", "rows").unwrap();
            let rows: Vec<Document> = (0..batch)
                .map(|i| doc! { "_id": i as i64, "payload": "y" })
                .collect();

            b.iter(|| table.bulk_insert(black_box(&rows), true).unwrap());
        });
    }
    group.finish();
}

/// Benchmark point lookups against growing collections.
fn bench_query_one(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_one");

    for rows in [100usize, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(rows), rows, |b, &rows| {
            let registry = ready_registry();
            let session = registry.get_or_create(1, false, true).unwrap();
            let table = session.create_collection("bench", "rows").unwrap();
            let seed: Vec<Document> = (0..rows)
                .map(|i| doc! { "_id": i as i64, "i": i as i64 })
                .collect();
            table.bulk_insert(&seed, false).unwrap();
            let target = (rows / 2) as i64;

            b.iter(|| {
                let row = table
                    .query_one(black_box(&doc! { "i": target }), &QueryOptions::new())
                    .unwrap();
                black_box(row);
            });
        });
    }
    group.finish();
}

/// Benchmark the reconnect-and-re-resolve path by severing the link before
/// every operation.
fn bench_reconnect(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconnect");

    group.bench_function("count_after_link_loss", |b| {
        let driver = MemoryDriver::new();
        let cluster = driver.cluster();
        let registry = SessionRegistry::new(driver, ClientConfig::default());
        let session = registry.get_or_create(1, false, true).unwrap();
        let table = session.create_collection("bench", "rows").unwrap();
        table.insert(&doc! { "i": 1 }).unwrap();

        b.iter(|| {
            cluster.fail_next(Op::Count, StatusCode::ConnectionLost, 1);
            black_box(table.count(&Document::new()).unwrap());
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_insert,
    bench_bulk_insert,
    bench_query_one,
    bench_reconnect,
);

criterion_main!(benches);
