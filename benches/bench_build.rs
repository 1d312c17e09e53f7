#[path = "shared.rs"]
mod shared;
use shared::*;

use criterion::{criterion_group, Criterion};
use std::hint::black_box;
use tracing::info;

fn benchmark_build(_c: &mut Criterion) {
    info!("Setting up benchmark: build");
    let points = generate_cloud(BENCH_CLOUD_SIZE, 42);
    let mut cc = configure_criterion();
    cc.bench_function("build_10k", |b| {
        b.iter(|| {
            let mut tree = bench_tree();
            tree.build(points.clone());
            black_box(tree.valid_count())
        })
    });
}

criterion_group!(benches, benchmark_build);
