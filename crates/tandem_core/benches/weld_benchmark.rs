//! # Topology Mapper Benchmark
//!
//! Welding runs once per soft-body registration; scattering runs every frame
//! for every soft body. The second one is the hot path.

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tandem_core::topology::{scatter, weld};

/// Grid of `n x n` quads, each with its own four corners (every interior
/// position is duplicated, like a mesh with per-face UVs).
fn faceted_grid(n: usize) -> (Vec<f32>, Vec<u32>) {
    let mut positions = Vec::with_capacity(n * n * 12);
    let mut indices = Vec::with_capacity(n * n * 6);
    for y in 0..n {
        for x in 0..n {
            let base = (positions.len() / 3) as u32;
            for (dx, dy) in [(0, 0), (1, 0), (1, 1), (0, 1)] {
                positions.extend_from_slice(&[(x + dx) as f32 * 0.1, (y + dy) as f32 * 0.1, 0.0]);
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
    }
    (positions, indices)
}

fn bench_weld(c: &mut Criterion) {
    let (positions, indices) = faceted_grid(128);

    c.bench_function("weld_faceted_grid_128", |b| {
        b.iter(|| black_box(weld(&positions, None, &indices).map(|t| t.vertex_count())));
    });
}

fn bench_scatter(c: &mut Criterion) {
    let (positions, indices) = faceted_grid(128);
    let welded = weld(&positions, None, &indices).expect("grid welds");
    let mut visual = vec![0.0f32; positions.len()];

    c.bench_function("scatter_faceted_grid_128", |b| {
        b.iter(|| {
            scatter(&welded.vertices, &welded.scatter, &mut visual);
            black_box(visual[0])
        });
    });
}

criterion_group!(benches, bench_weld, bench_scatter);
criterion_main!(benches);
