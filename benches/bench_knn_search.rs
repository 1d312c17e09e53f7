#[path = "shared.rs"]
mod shared;
use shared::*;

use criterion::{criterion_group, Criterion};
use ikd::geometry::Point3D;
use std::hint::black_box;
use tracing::info;

fn benchmark_knn_search(_c: &mut Criterion) {
    info!("Setting up benchmark: knn_search");
    let mut tree = bench_tree();
    tree.build(generate_cloud(BENCH_CLOUD_SIZE, 42));
    let target = Point3D::new(3.5, -4.5, 3.5, None);
    let mut cc = configure_criterion();
    cc.bench_function("knn_10k", |b| {
        b.iter(|| {
            let mut nearest = Vec::new();
            tree.knn(&target, BENCH_KNN_SIZE, &mut nearest);
            black_box(nearest.len())
        })
    });
}

criterion_group!(benches, benchmark_knn_search);
