#[path = "shared.rs"]
mod shared;
use shared::*;

use criterion::{criterion_group, Criterion};
use ikd::geometry::Aabb;
use std::hint::black_box;
use tracing::info;

fn benchmark_range_delete(_c: &mut Criterion) {
    info!("Setting up benchmark: range_delete");
    let mut base = bench_tree();
    base.build(generate_cloud(BENCH_CLOUD_SIZE, 42));
    let region = Aabb::new([-10.0, -10.0, -10.0], [10.0, 10.0, 10.0]);
    let mut cc = configure_criterion();
    cc.bench_function("range_delete_10k", |b| {
        b.iter(|| {
            let mut tree = base.clone();
            tree.delete_boxes(std::slice::from_ref(&region));
            black_box(tree.valid_count())
        })
    });
}

criterion_group!(benches, benchmark_range_delete);
