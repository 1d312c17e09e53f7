#![allow(dead_code)]

//! Shared utilities for benchmarks in Ikd.
//!
//! This module provides common constants, a deterministic point-cloud generator, and helper
//! functions used in the benchmarks: benchmark parameters (cloud size, batch size, kNN size)
//! and tree construction with the default criteria.

use criterion::Criterion;
use ikd::geometry::Point3D;
use ikd::ikd_tree::IkdTree;

//
// Benchmark Parameters
//
pub const BENCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
pub const BENCH_CLOUD_SIZE: usize = 10_000;
pub const BENCH_BATCH_SIZE: usize = 100;
pub const BENCH_KNN_SIZE: usize = 5;

//
// Data Generation
//
pub fn generate_cloud(count: usize, seed: u64) -> Vec<Point3D<i32>> {
    let mut state = seed | 1;
    let mut points = Vec::with_capacity(count);
    for idx in 0..count {
        let mut coords = [0.0; 3];
        for coord in &mut coords {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            *coord = -50.0 + 100.0 * ((state >> 11) as f64 / (1u64 << 53) as f64);
        }
        points.push(Point3D::new(
            coords[0],
            coords[1],
            coords[2],
            Some(idx as i32),
        ));
    }
    points
}

pub fn bench_tree() -> IkdTree<Point3D<i32>> {
    IkdTree::new(0.5, 0.7, 0.2, 10).expect("default benchmark parameters are valid")
}

// Configure Criterion with a timeout for benchmarks
pub fn configure_criterion() -> Criterion {
    Criterion::default().measurement_time(BENCH_TIMEOUT)
}
