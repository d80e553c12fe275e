mod util;
use util::*;

use mesh_detail::prelude::*;

/// Checks every hedge of the detail: one primary per class, and every
/// member joins the same unordered point pair.
fn assert_classes(d: &Detail) {
    for h in d.index_map(ElementClass::Vertex).iter_offsets() {
        let Some((a, b)) = d.hedge_points(h) else {
            continue;
        };
        let class = d.hedge_class(h);
        assert!(!class.is_empty(), "hedge {h} is not linked");
        assert_eq!(class.iter().filter(|&&m| d.is_primary_hedge(m)).count(), 1);
        for &m in &class {
            let (c, e) = d.hedge_points(m).unwrap();
            assert!((c, e) == (a, b) || (c, e) == (b, a));
            assert_eq!(d.hedge_to_primary_hedge(m), d.hedge_to_primary_hedge(h));
        }
    }
}

#[test]
fn grid_interior_edges_pair_up() {
    let mut d = hedged();
    quad_grid(&mut d, 3, 3);
    assert_classes(&d);
    let mut sizes = [0usize; 3];
    for h in d.index_map(ElementClass::Vertex).iter_offsets() {
        if d.is_primary_hedge(h) {
            sizes[d.hedge_class(h).len()] += 1;
        }
    }
    // 3x3 quads: 12 boundary edges, 12 interior edges.
    assert_eq!(sizes[1], 12);
    assert_eq!(sizes[2], 12);
    d.validate_invariants().unwrap();
}

#[test]
fn next_and_prev_walk_the_ring() {
    let mut d = hedged();
    d.append_points(4);
    // three triangles sharing the edge (0, 1)
    for apex in 2..4 {
        d.append_primitive_with_points(PrimitiveTypeId::POLYGON, &[o(0), o(1), o(apex)])
            .unwrap();
    }
    d.append_primitive_with_points(PrimitiveTypeId::POLYGON, &[o(1), o(0), o(3)])
        .unwrap();
    let h = d.find_hedge(o(0), o(1));
    let class = d.hedge_class(h);
    assert_eq!(class.len(), 3);
    for &m in &class {
        assert_eq!(d.hedge_to_prev_hedge(d.hedge_to_next_hedge(m)), m);
    }
    assert_classes(&d);
}

#[test]
fn destroying_the_primary_promotes_another_member() {
    let mut d = hedged();
    quad_grid(&mut d, 2, 1);
    let h = d.find_hedge(o(1), o(4));
    let primary = d.hedge_to_primary_hedge(h);
    let owner = d.vertex_primitive(primary);
    d.destroy_primitive(owner, false);
    let survivor = d.find_hedge(o(1), o(4));
    assert!(survivor.is_valid());
    assert!(d.is_primary_hedge(survivor));
    assert_eq!(d.hedge_class(survivor), vec![survivor]);
    d.validate_invariants().unwrap();
}

#[test]
fn rewiring_moves_hedges_between_classes() {
    let mut d = hedged();
    d.append_points(5);
    d.append_primitive_with_points(PrimitiveTypeId::POLYGON, &[o(0), o(1), o(2)])
        .unwrap();
    let b = d
        .append_primitive_with_points(PrimitiveTypeId::POLYGON, &[o(2), o(1), o(3)])
        .unwrap();
    assert_eq!(d.hedge_class(d.find_hedge(o(1), o(2))).len(), 2);

    // Move b's corner from point 2 to point 4: the shared edge splits.
    let corner = d.primitive_vertices(b).get(0);
    d.wire_vertex_point(corner, o(4));
    assert_eq!(d.hedge_class(d.find_hedge(o(1), o(2))).len(), 1);
    assert_eq!(d.hedge_class(d.find_hedge(o(4), o(1))).len(), 1);
    assert_classes(&d);

    // And back again: the edge is shared once more.
    d.wire_vertex_point(corner, o(2));
    assert_eq!(d.hedge_class(d.find_hedge(o(1), o(2))).len(), 2);
    d.validate_invariants().unwrap();
}

#[test]
fn relink_with_known_classes() {
    let mut d = hedged();
    d.append_points(4);
    let a = d
        .append_primitive_with_points(PrimitiveTypeId::POLYGON, &[o(0), o(1), o(2)])
        .unwrap();
    let b = d
        .append_primitive_with_points(PrimitiveTypeId::POLYGON, &[o(3), o(1), o(0)])
        .unwrap();
    // b's first vertex moves from 3 to 2; its incident hedges now match
    // a's edges (1, 2) and (2, 0) in reverse.
    let v = d.primitive_vertices(b).get(0);
    let into_prev = d.find_hedge(o(0), o(2));
    let into = d.find_hedge(o(1), o(2));
    assert!(into_prev.is_valid() && into.is_valid());
    d.wire_vertex_point_and_relink_hedges(v, o(2), into_prev, into);
    assert_eq!(d.hedge_class(d.primitive_vertices(a).get(1)).len(), 2);
    assert_eq!(d.hedge_class(d.primitive_vertices(a).get(2)).len(), 2);
    d.validate_invariants().unwrap();
}

#[test]
fn hedges_can_be_enabled_later() {
    let mut d = Detail::new();
    quad_grid(&mut d, 2, 2);
    assert!(!d.topology().tracks_hedges());
    d.enable_hedge_tracking();
    assert!(d.topology().tracks_hedges());
    assert_classes(&d);
    d.validate_invariants().unwrap();
}

#[test]
fn open_polylines_have_no_closing_hedge() {
    let mut d = hedged();
    d.append_points(3);
    let line = d
        .append_primitive_with_points(PrimitiveTypeId::POLYLINE, &[o(0), o(1), o(2)])
        .unwrap();
    let last = d.primitive_vertices(line).get(2);
    assert!(d.hedge_points(last).is_none());
    assert!(d.hedge_class(last).is_empty());
    d.set_primitive_closed(line, true);
    assert_eq!(d.hedge_points(last), Some((o(2), o(0))));
    d.validate_invariants().unwrap();
}
