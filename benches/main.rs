use criterion::criterion_main;

mod bench_build;
mod bench_knn_search;
mod bench_range_delete;

// Main entry point for running the benchmarks
criterion_main!(
    bench_build::benches,
    bench_insert::benches,
    bench_knn_search::benches,
    bench_range_delete::benches
);
