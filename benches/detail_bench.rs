use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use mesh_detail::prelude::*;

fn hedged() -> Detail {
    Detail::with_config(DetailConfig {
        topology: TopologyOptions::with_hedges(),
        ..Default::default()
    })
    .expect("valid config")
}

/// `n * n` quads over an `(n + 1)^2` lattice.
fn grid(mut d: Detail, n: usize) -> Detail {
    let p0 = d.append_points((n + 1) * (n + 1));
    let at = |i: usize, j: usize| p0.add(j * (n + 1) + i);
    let mut points = Vec::with_capacity(n * n * 4);
    for j in 0..n {
        for i in 0..n {
            points.extend([at(i, j), at(i + 1, j), at(i + 1, j + 1), at(i, j + 1)]);
        }
    }
    d.append_primitives_with_points(PrimitiveTypeId::POLYGON, &vec![4; n * n], &points)
        .expect("grid block");
    d
}

fn bench_block_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_append");
    for &n in &[32usize, 128] {
        group.bench_with_input(BenchmarkId::new("plain", n), &n, |b, &n| {
            b.iter(|| black_box(grid(Detail::new(), n)));
        });
        group.bench_with_input(BenchmarkId::new("hedged", n), &n, |b, &n| {
            b.iter(|| black_box(grid(hedged(), n)));
        });
    }
    group.finish();
}

fn bench_defragment(c: &mut Criterion) {
    let mut group = c.benchmark_group("defragment");
    for &n in &[64usize, 256] {
        let mut base = grid(Detail::new(), n);
        // every other row of quads
        for j in (0..n).step_by(2) {
            let start = Offset::new(j * n);
            base.destroy_primitive_offsets(OffsetRange::with_len(start, n), true);
        }
        group.bench_with_input(BenchmarkId::new("all_classes", n), &n, |b, _| {
            b.iter_batched(
                || base.clone(),
                |mut d| {
                    d.defragment_all();
                    black_box(d)
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_hedge_wiring(c: &mut Criterion) {
    let n = 64usize;
    let base = grid(hedged(), n);
    let vertices: Vec<Offset> = base
        .index_map(ElementClass::Vertex)
        .iter_offsets()
        .step_by(7)
        .collect();
    let spare = (n + 1) * (n + 1) - 1;

    let mut group = c.benchmark_group("hedge_wiring");
    group.bench_function("search", |b| {
        b.iter_batched(
            || base.clone(),
            |mut d| {
                for &v in &vertices {
                    d.wire_vertex_point(v, Offset::new(spare));
                }
                black_box(d)
            },
            BatchSize::LargeInput,
        );
    });
    group.bench_function("ignore_hedges", |b| {
        b.iter_batched(
            || base.clone(),
            |mut d| {
                for &v in &vertices {
                    d.wire_vertex_point_and_ignore_hedges(v, Offset::new(spare));
                }
                black_box(d)
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_block_append, bench_defragment, bench_hedge_wiring);
criterion_main!(benches);
