//! Throughput Benchmark for Stockroom
//!
//! This benchmark measures the line codec, the store and full command
//! dispatch under various workloads.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;
use stockroom::auth::{Argon2Hasher, HashParams};
use stockroom::commands::CommandHandler;
use stockroom::model::Product;
use stockroom::protocol::{join_batch, parse_request, split_fields, split_records};
use stockroom::storage::{Database, PoolConfig, StorePool};
use tokio::runtime::Runtime;

fn product_record(i: u64) -> String {
    format!("SKU-{i}|Acme|Widget {i}|A small widget|{}|9.99|/img/{i}.png", i % 50)
}

fn product(i: u64) -> Product {
    let record = product_record(i);
    let fields: Vec<&str> = record.split('|').collect();
    Product::from_fields(&fields).unwrap()
}

/// Benchmark request decoding
fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Elements(1));

    let line = format!("ADD_PRODUCT::{}", product_record(1));
    group.bench_function("parse_request", |b| {
        b.iter(|| black_box(parse_request(black_box(&line)).unwrap()));
    });

    let record = product_record(1);
    group.bench_function("split_fields", |b| {
        b.iter(|| black_box(split_fields(black_box(&record), 7).unwrap()));
    });

    let batch = join_batch((0..100).map(product_record));
    group.bench_function("split_records_100", |b| {
        b.iter(|| black_box(split_records(black_box(&batch)).unwrap()));
    });

    group.finish();
}

/// Benchmark direct store operations
fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");
    group.throughput(Throughput::Elements(1));

    group.bench_function("insert_product", |b| {
        let db = Database::new();
        let mut i = 0u64;
        b.iter(|| {
            db.insert_product(product(i)).unwrap();
            i += 1;
        });
    });

    let db = Database::new();
    for i in 0..1_000 {
        db.insert_product(product(i)).unwrap();
    }

    group.bench_function("list_products_1000", |b| {
        b.iter(|| black_box(db.list_products().unwrap()));
    });

    group.finish();
}

/// Benchmark concurrent access
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let db = Arc::new(Database::new());
            let handles: Vec<_> = (0..4u64)
                .map(|t| {
                    let db = Arc::clone(&db);
                    thread::spawn(move || {
                        for i in 0..1_000 {
                            db.insert_product(product(t * 1_000_000 + i)).unwrap();
                            if i % 100 == 0 {
                                black_box(db.list_products().unwrap());
                            }
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(db.stats());
        });
    });

    group.finish();
}

/// Benchmark full dispatch through the pool
fn bench_dispatch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let handler = rt.block_on(async {
        let pool = StorePool::new(Arc::new(Database::new()), PoolConfig::default())
            .await
            .unwrap();
        let hasher = Argon2Hasher::new(HashParams {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();
        let handler = CommandHandler::new(pool, Arc::new(hasher));
        for i in 0..100 {
            handler
                .execute(&format!("ADD_PRODUCT::{}", product_record(i)))
                .await;
        }
        handler
    });

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_all_products_100", |b| {
        b.iter(|| black_box(rt.block_on(handler.execute("GET_ALL_PRODUCTS::"))));
    });

    group.bench_function("unknown_command", |b| {
        b.iter(|| black_box(rt.block_on(handler.execute("FOO::bar"))));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_codec,
    bench_store,
    bench_concurrent,
    bench_dispatch,
);

criterion_main!(benches);
