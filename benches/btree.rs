//! B+-tree throughput: sequential inserts, point lookups and range scans
//! across pool sizes and tree orders.

use std::ops::Bound;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use leafdb::record::{Column, ColumnType, Key, TableSchema, Value};
use leafdb::{BPlusTree, BufferPool, SpaceId, SpaceManager};
use tempfile::TempDir;

const SPACE: SpaceId = SpaceId(1);

fn schema() -> TableSchema {
    TableSchema::new(
        "bench",
        vec![
            Column::new("id", ColumnType::Int).primary_key(),
            Column::new("data", ColumnType::Varchar(32)),
        ],
    )
}

fn row(id: i32) -> Vec<Value> {
    vec![Value::Int(id), Value::Str(format!("data_{id}"))]
}

fn build_tree(rows: i32, order: u16, capacity: usize) -> (BPlusTree, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let spaces = Arc::new(SpaceManager::new(dir.path()).unwrap());
    spaces.open_space(SPACE).unwrap();
    let pool = Arc::new(BufferPool::new(spaces, capacity));
    let mut tree = BPlusTree::create(pool, SPACE, schema(), order).unwrap();
    for id in 0..rows {
        tree.insert(&row(id)).unwrap();
    }
    (tree, dir)
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_sequential");
    group.sample_size(10);

    for order in [4u16, 32, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(order), &order, |b, &order| {
            b.iter(|| build_tree(black_box(5_000), order, 256));
        });
    }
    group.finish();
}

fn bench_point_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("point_lookup");

    for capacity in [16usize, 1024] {
        let (tree, _dir) = build_tree(20_000, 64, capacity);
        group.bench_with_input(BenchmarkId::new("pool", capacity), &capacity, |b, _| {
            let mut id = 0;
            b.iter(|| {
                id = (id + 7_919) % 20_000;
                let found = tree.search(&Key::from(black_box(id))).unwrap();
                assert!(found.is_some());
            });
        });
    }
    group.finish();
}

fn bench_range_scan(c: &mut Criterion) {
    let (tree, _dir) = build_tree(20_000, 64, 1024);
    let lo = Key::from(5_000);
    let hi = Key::from(6_000);

    c.bench_function("range_scan_1000", |b| {
        b.iter(|| {
            let rows = tree
                .scan(Bound::Included(black_box(&lo)), Bound::Excluded(black_box(&hi)))
                .unwrap();
            assert_eq!(rows.len(), 1_000);
        });
    });
}

criterion_group!(benches, bench_insert, bench_point_lookup, bench_range_scan);
criterion_main!(benches);
