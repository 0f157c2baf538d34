//! Collection statistics aggregation benchmarks.

use bson::{doc, Document};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use madrone_client::StatisticsBuilder;

/// One node's storage detail document.
fn node_detail(page_size: i64, data_pages: i64) -> Document {
    doc! {
        "Details": [{
            "PageSize": page_size,
            "TotalDataPages": data_pages,
            "TotalIndexPages": data_pages / 8,
            "TotalDataFreeSpace": data_pages * 100,
            "TotalRecords": data_pages * 40,
        }]
    }
}

/// Benchmark folding detail documents from growing node counts.
fn bench_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("statistics_fold");

    for nodes in [1usize, 4, 16, 64].iter() {
        group.throughput(Throughput::Elements(*nodes as u64));
        group.bench_with_input(BenchmarkId::from_parameter(nodes), nodes, |b, &nodes| {
            // Mixed page sizes exercise the normalization path.
            let details: Vec<Document> = (0..nodes)
                .map(|i| node_detail(if i % 2 == 0 { 4096 } else { 8192 }, 100 + i as i64))
                .collect();

            b.iter(|| {
                let mut builder = StatisticsBuilder::new();
                for node in &details {
                    builder.absorb(black_box(node)).unwrap();
                }
                black_box(builder.finish());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fold);
criterion_main!(benches);
