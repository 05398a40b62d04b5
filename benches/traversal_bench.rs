use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use dagstore::db::GraphSchema;
use dagstore::{Dag, GuardOptions, NodeId, PathOptions, SqliteStore};

/// `layers` rows of `width` nodes, each node linked to `fanout` nodes of the
/// next row. Returns the graph and its rows.
fn layered_dag(layers: usize, width: usize, fanout: usize) -> (Dag<SqliteStore>, Vec<Vec<NodeId>>) {
    let dag = Dag::in_memory(GraphSchema::default()).expect("in-memory graph");
    let rows: Vec<Vec<NodeId>> = (0..layers)
        .map(|_| (0..width).map(|_| dag.add_node().expect("node")).collect())
        .collect();
    for pair in rows.windows(2) {
        for (i, parent) in pair[0].iter().enumerate() {
            for k in 0..fanout {
                let child = pair[1][(i + k) % width];
                dag.add_child(*parent, child, GuardOptions::unchecked())
                    .expect("edge");
            }
        }
    }
    (dag, rows)
}

fn bench_closures(c: &mut Criterion) {
    let mut group = c.benchmark_group("closures");
    for (layers, width) in [(6usize, 8usize), (10, 16)] {
        let (dag, rows) = layered_dag(layers, width, 2);
        let top = rows[0][0];
        let bottom = rows[layers - 1][0];
        let label = format!("{layers}x{width}");

        group.bench_with_input(BenchmarkId::new("descendants", &label), &top, |b, node| {
            b.iter(|| black_box(dag.descendants(*node, None).expect("descendants")));
        });
        group.bench_with_input(BenchmarkId::new("ancestors", &label), &bottom, |b, node| {
            b.iter(|| black_box(dag.ancestors(*node, None).expect("ancestors")));
        });
    }
    group.finish();
}

fn bench_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("paths");
    let (dag, rows) = layered_dag(6, 4, 2);
    let (start, end) = (rows[0][0], rows[5][0]);
    let options = PathOptions::default();

    group.bench_function("shortest_path", |b| {
        b.iter(|| black_box(dag.path(start, end, &options).expect("path")));
    });
    group.bench_function("guarded_insert_check", |b| {
        b.iter(|| black_box(dag.is_ancestor_of(end, start).expect("ancestry")));
    });
    group.finish();
}

fn bench_graphwide(c: &mut Criterion) {
    let mut group = c.benchmark_group("graphwide");
    let (dag, _) = layered_dag(10, 16, 2);
    group.bench_function("topological_sort", |b| {
        b.iter(|| black_box(dag.topological_sort().expect("topo")));
    });
    group.bench_function("redundant_edges", |b| {
        b.iter(|| black_box(dag.redundant_edges().expect("reduction")));
    });
    group.bench_function("graph_stats", |b| {
        b.iter(|| black_box(dag.graph_stats().expect("stats")));
    });
    group.finish();
}

criterion_group!(benches, bench_closures, bench_paths, bench_graphwide);
criterion_main!(benches);
