//! Criterion benchmarks for the affinitydb execution pipeline.
//!
//! Run with: `cargo bench --bench performance`
//!
//! Results are saved to `target/criterion/` with HTML reports.

use affinitydb::boolean::to_cnf;
use affinitydb::ir::{BinaryOperator, Expr};
use affinitydb::storage::ColumnHeader;
use affinitydb::{AffinityDb, ColumnAffinity};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn seeded(rows: usize) -> AffinityDb {
    let mut db = AffinityDb::new();
    db.execute("CREATE TABLE t1(id INTEGER PRIMARY KEY, val INTEGER, label TEXT)")
        .unwrap();
    for i in 0..rows {
        let sql = format!("INSERT INTO t1(val, label) VALUES ({}, 'row{}')", i % 100, i);
        db.execute(&sql).unwrap();
    }
    db
}

fn bench_bulk_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_insert");
    for size in [100, 1000, 10000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| seeded(black_box(size)));
        });
    }
    group.finish();
}

fn bench_select_where(c: &mut Criterion) {
    let mut db = seeded(10000);
    c.bench_function("select_where", |b| {
        b.iter(|| db.execute(black_box("SELECT * FROM t1 WHERE val = 50")).unwrap());
    });
}

fn bench_affinity_comparison(c: &mut Criterion) {
    let mut db = seeded(10000);
    c.bench_function("select_where_text_literal", |b| {
        b.iter(|| db.execute(black_box("SELECT id FROM t1 WHERE val = '50'")).unwrap());
    });
}

fn bench_group_by(c: &mut Criterion) {
    let mut db = seeded(10000);
    c.bench_function("group_by_sum", |b| {
        b.iter(|| {
            db.execute(black_box("SELECT val, SUM(id), COUNT(*) FROM t1 GROUP BY val"))
                .unwrap()
        });
    });
}

fn bench_order_by(c: &mut Criterion) {
    let mut db = seeded(10000);
    c.bench_function("order_by", |b| {
        b.iter(|| db.execute(black_box("SELECT * FROM t1 ORDER BY val DESC, id")).unwrap());
    });
}

fn bench_equi_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("equi_join");
    for size in [100, 500] {
        let mut db = seeded(size);
        db.execute("CREATE TABLE t2(val INTEGER, name TEXT)").unwrap();
        for i in 0..100 {
            db.execute(&format!("INSERT INTO t2 VALUES ({}, 'n{}')", i, i))
                .unwrap();
        }
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                db.execute(black_box(
                    "SELECT t1.id, t2.name FROM t1, t2 WHERE t1.val = t2.val AND t1.id < 50",
                ))
                .unwrap()
            });
        });
    }
    group.finish();
}

fn bench_cnf(c: &mut Criterion) {
    let column = |i: usize| {
        Expr::column(0, ColumnHeader::new(i, "t", &format!("c{}", i), ColumnAffinity::Integer))
    };
    // (c0 AND c1) OR (c2 AND c3) OR ... over eight pairs.
    let expr = (0..8)
        .map(|i| Expr::binary(BinaryOperator::And, column(2 * i), column(2 * i + 1)))
        .reduce(|acc, term| Expr::binary(BinaryOperator::Or, acc, term))
        .unwrap();
    c.bench_function("to_cnf_8_pairs", |b| b.iter(|| to_cnf(black_box(expr.clone()))));
}

criterion_group!(
    benches,
    bench_bulk_insert,
    bench_select_where,
    bench_affinity_comparison,
    bench_group_by,
    bench_order_by,
    bench_equi_join,
    bench_cnf
);
criterion_main!(benches);
