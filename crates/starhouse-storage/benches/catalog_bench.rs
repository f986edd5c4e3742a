//! Catalog Performance Benchmarks
//!
//! Measures the build and query paths on a synthetic sky.
//!
//! ## What We Benchmark
//!
//! ### 1. Row Group Encoding (`bench_partition_write`)
//! - Encodes one Parquet partition file from sorted rows, in memory
//! - Compares the three codecs
//!
//! ### 2. Full Build (`bench_build`)
//! - Admission, chunk sort, run spill, k-way merge and manifest, end to end
//! - Different input sizes
//!
//! ### 3. Scan (`bench_scan`)
//! - `all()` over a built catalog
//!
//! ### 4. Lookup (`bench_get`)
//! - `get(hip = ..)` with and without useful row-group statistics
//!
//! ### 5. Cone Search (`bench_cone`)
//! - Small and large radii over a healpix-sorted catalog
//!
//! ## Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench -p starhouse-storage
//!
//! # Run a specific benchmark
//! cargo bench -p starhouse-storage --bench catalog_bench build
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use starhouse_core::{Codec, Record, Star, Value};
use starhouse_storage::partition::{stored_columns, PartitionFileWriter, WriteOptions};
use starhouse_storage::{AcceptAll, BuildConfig, Catalog, NoopObserver, Predicate, Row};
use tempfile::TempDir;

fn synthetic_sky(n: u64) -> Vec<Record> {
    let mut state: u64 = 42;
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 11) as f64 / (1u64 << 53) as f64
    };
    (0..n)
        .map(|i| {
            Record::new()
                .with("hip", i)
                .with("ra", next() * 359.9)
                .with("dec", (2.0 * next() - 1.0).asin().to_degrees())
                .with("magnitude", next() * 12.0 - 1.5)
                .with("constellation_id", ["ori", "cma", "lyr", "cyg"][(i % 4) as usize])
                .with("epoch_year", 1991)
        })
        .collect()
}

fn config(root: &std::path::Path, sorting: &[&str], codec: Codec) -> BuildConfig {
    BuildConfig::builder()
        .output_path(root)
        .chunk_size(50_000)
        .schema(Star::schema())
        .partition_columns(Vec::<String>::new())
        .sorting_columns(sorting.iter().copied())
        .compression(codec)
        .row_group_size(4_096)
        .resolution(10)
        .build()
        .unwrap()
}

fn bench_partition_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_write");
    let schema = Star::schema();
    let columns = stored_columns(&schema);

    let rows: Vec<Row> = synthetic_sky(10_000)
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let mut values = vec![Value::Int(i as i64 + 1), Value::Int(i as i64)];
            values.extend(schema.conform(record).unwrap());
            Row::new(values)
        })
        .collect();

    for codec in [Codec::None, Codec::Lz4, Codec::Snappy] {
        group.throughput(Throughput::Elements(rows.len() as u64));
        group.bench_with_input(BenchmarkId::new(codec.name(), rows.len()), &rows, |b, rows| {
            b.iter(|| {
                let options = WriteOptions {
                    codec,
                    row_group_size: 4_096,
                    key_columns: vec![1, 0],
                    build_id: "bench".to_string(),
                };
                let mut writer =
                    PartitionFileWriter::new(Vec::new(), columns.clone(), &options).unwrap();
                for chunk in rows.chunks(4_096) {
                    writer.write_row_group(chunk).unwrap();
                }
                black_box(writer.finish().unwrap());
            });
        });
    }

    group.finish();
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(10);

    for count in [10_000u64, 100_000] {
        let records = synthetic_sky(count);
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::new("lz4", count), &records, |b, records| {
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                let config = config(&dir.path().join("catalog"), &["magnitude"], Codec::Lz4);
                black_box(
                    Catalog::build(&config, records.iter().cloned(), &AcceptAll, &NoopObserver)
                        .unwrap(),
                );
            });
        });
    }

    group.finish();
}

fn built_catalog(count: u64, sorting: &[&str]) -> (TempDir, Catalog) {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), sorting, Codec::Lz4);
    Catalog::build(&config, synthetic_sky(count), &AcceptAll, &NoopObserver).unwrap();
    let catalog = Catalog::open_any(dir.path()).unwrap();
    (dir, catalog)
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    let (_dir, catalog) = built_catalog(100_000, &["magnitude"]);

    group.throughput(Throughput::Elements(catalog.count()));
    group.bench_function("all", |b| {
        b.iter(|| {
            let n = catalog.all().unwrap().filter(|r| r.is_ok()).count();
            black_box(n);
        });
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");

    // hip is not a sort column: every row group must be checked
    let (_unsorted, catalog) = built_catalog(100_000, &["magnitude"]);
    group.bench_function("hip_unsorted", |b| {
        b.iter(|| black_box(catalog.get(&Predicate::eq("hip", 77_777)).unwrap()));
    });

    // hip leads the sort: statistics prune all but one group
    let (_sorted, catalog) = built_catalog(100_000, &["hip"]);
    group.bench_function("hip_sorted", |b| {
        b.iter(|| black_box(catalog.get(&Predicate::eq("hip", 77_777)).unwrap()));
    });

    group.finish();
}

fn bench_cone(c: &mut Criterion) {
    let mut group = c.benchmark_group("cone");
    let (_dir, catalog) = built_catalog(100_000, &[]);

    for radius in [1.0, 5.0, 45.0] {
        group.bench_with_input(BenchmarkId::from_parameter(radius), &radius, |b, &radius| {
            b.iter(|| black_box(catalog.cone(83.8, -5.4, radius).unwrap().len()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_partition_write,
    bench_build,
    bench_scan,
    bench_get,
    bench_cone
);
criterion_main!(benches);
