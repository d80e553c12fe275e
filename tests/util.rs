#![allow(dead_code)]
use mesh_detail::prelude::*;
use rand::SeedableRng;
use rand::rngs::SmallRng;

pub fn o(i: usize) -> Offset {
    Offset::new(i)
}

pub fn rng() -> SmallRng {
    SmallRng::seed_from_u64(0xDEADBEEF)
}

pub fn hedged() -> Detail {
    Detail::with_config(DetailConfig {
        topology: TopologyOptions::with_hedges(),
        ..Default::default()
    })
    .unwrap()
}

/// `nx * ny` quads over an `(nx + 1) * (ny + 1)` point lattice, row major.
/// Returns the first primitive.
pub fn quad_grid(d: &mut Detail, nx: usize, ny: usize) -> Offset {
    let p0 = d.append_points((nx + 1) * (ny + 1));
    let at = |i: usize, j: usize| p0.add(j * (nx + 1) + i);
    let mut points = Vec::with_capacity(nx * ny * 4);
    for j in 0..ny {
        for i in 0..nx {
            points.extend([at(i, j), at(i + 1, j), at(i + 1, j + 1), at(i, j + 1)]);
        }
    }
    d.append_primitives_with_points(PrimitiveTypeId::POLYGON, &vec![4; nx * ny], &points)
        .unwrap()
}

/// Every active offset of `class` in index order.
pub fn indexed(d: &Detail, class: ElementClass) -> Vec<Offset> {
    d.index_map(class).iter_indexed().collect()
}

/// Assert vec is a permutation of another vec (order-agnostic).
pub fn assert_permutation<T: Ord + Copy + std::fmt::Debug>(got: &[T], want: &[T]) {
    let mut a = got.to_vec();
    a.sort_unstable();
    let mut b = want.to_vec();
    b.sort_unstable();
    assert_eq!(a, b, "not a permutation\n got={:?}\nwant={:?}", got, want);
}
