mod util;
use util::*;

use mesh_detail::prelude::*;

#[test]
fn point_block_destroy_defragment_scenario() {
    let mut d = Detail::new();
    let start = d.append_points(4);
    assert_eq!(start, o(0));
    let map = d.index_map(ElementClass::Point);
    for i in 0..4 {
        assert_eq!(map.index_from_offset(o(i)), Index::new(i));
    }

    d.destroy_point_offsets(OffsetRange::with_len(o(1), 1), DestroyMode::LeavePrimitives, false);
    let map = d.index_map(ElementClass::Point);
    assert_eq!(map.iter_offsets().collect::<Vec<_>>(), vec![o(0), o(2), o(3)]);
    assert_eq!(map.index_from_offset(o(2)), Index::new(2));

    assert!(d.defragment(ElementClass::Point, &DefragmentOptions::default()));
    let map = d.index_map(ElementClass::Point);
    assert_eq!(map.offset_size(), 3);
    for i in 0..3 {
        assert_eq!(map.index_from_offset(o(i)), Index::new(i));
    }
    d.validate_invariants().unwrap();
}

#[test]
fn attributes_follow_their_elements() {
    let mut d = Detail::new();
    quad_grid(&mut d, 3, 1);
    {
        let tag = d.attributes_mut(ElementClass::Point).add("tag", 0usize).unwrap();
        for i in 0..8 {
            tag.set(o(i), i * 10);
        }
    }
    // The first quad owns points 0, 1, 5, 4; only 0 and 4 become unused.
    assert!(d.destroy_primitive(o(0), true));
    assert_eq!(d.point_count(), 6);
    d.defragment_all();
    let tag = d.attributes(ElementClass::Point).get::<usize>("tag").unwrap();
    assert_eq!(tag.as_slice(), &[10, 20, 30, 50, 60, 70]);
    for prim in indexed(&d, ElementClass::Primitive) {
        for p in d.primitive_points(prim) {
            assert!(d.is_active(ElementClass::Point, p));
        }
    }
    d.validate_invariants().unwrap();
}

#[test]
fn cascade_destroys_destroy_self_primitive() {
    let mut d = Detail::new();
    let p = d.append_points(1);
    let sphere = d
        .append_primitive_with_points(PrimitiveTypeId::SPHERE, &[p])
        .unwrap();
    assert!(d.destroy_point(p, DestroyMode::LeavePrimitives));
    assert!(!d.is_active(ElementClass::Primitive, sphere));
    assert_eq!(d.vertex_count(), 0);
    assert!(!d.contains_primitive_type(PrimitiveTypeId::SPHERE));
    d.validate_invariants().unwrap();
}

#[test]
fn cascade_keeps_point_of_refusing_primitive() {
    let mut d = Detail::new();
    let p = d.append_points(4);
    let tet = d
        .append_primitive_with_points(
            PrimitiveTypeId::TETRAHEDRON,
            &[p, p.add(1), p.add(2), p.add(3)],
        )
        .unwrap();
    assert_eq!(
        d.destroy_point_offsets(OffsetRange::with_len(p, 4), DestroyMode::LeavePrimitives, false),
        0
    );
    assert_eq!(d.primitive_points(tet).len(), 4);
    assert_eq!(d.point_count(), 4);
}

#[test]
fn destroying_vacant_offsets_changes_nothing() {
    let mut d = Detail::new();
    quad_grid(&mut d, 2, 2);
    d.destroy_primitive(o(1), false);
    let ids = (
        d.index_map(ElementClass::Primitive).data_id(),
        d.primitives().data_id(),
    );
    let meta = d.meta_cache_count();
    assert!(!d.destroy_primitive(o(1), false));
    assert_eq!(d.destroy_primitive_offsets(OffsetRange::with_len(o(1), 1), true), 0);
    assert_eq!(
        ids,
        (
            d.index_map(ElementClass::Primitive).data_id(),
            d.primitives().data_id()
        )
    );
    assert_eq!(d.meta_cache_count(), meta);
}

#[test]
fn chain_round_trip_after_rewiring() {
    let mut d = Detail::new();
    quad_grid(&mut d, 2, 1);
    // Point 1 is shared by both quads.
    let on_one = d.point_vertices(o(1));
    assert_eq!(on_one.len(), 2);
    let v = on_one[0];
    d.wire_vertex_point(v, o(0));
    assert_eq!(d.vertex_point(v), o(0));
    assert!(!d.point_vertices(o(1)).contains(&v));
    assert!(d.point_vertices(o(0)).contains(&v));
    assert!(d.destroy_vertex_offset(v));
    assert!(!d.point_vertices(o(0)).contains(&v));
    d.validate_invariants().unwrap();
}

#[test]
fn reorder_then_defragment_keeps_order() {
    let mut d = Detail::new();
    d.append_points(5);
    d.reorder(ElementClass::Point, &[o(4), o(3), o(2), o(1), o(0)])
        .unwrap();
    assert!(d.reorder(ElementClass::Point, &[o(0)]).is_err());
    d.destroy_unused_points(Some(OffsetRange::with_len(o(2), 1)));
    d.defragment(ElementClass::Point, &DefragmentOptions::default());
    // old 4, 3, 1, 0 keep their reversed relative order as 3, 2, 1, 0
    assert_eq!(indexed(&d, ElementClass::Point), vec![o(3), o(2), o(1), o(0)]);
}

#[test]
fn links_widen_as_classes_grow() {
    let mut d = Detail::new();
    d.append_points(10);
    let before = d.topology().point_ref().unwrap().width();
    d.append_points(70_000);
    let after = d.topology().point_ref().unwrap().width();
    assert_eq!(before, LinkWidth::W16);
    assert_eq!(after, LinkWidth::W32);
    d.validate_invariants().unwrap();
}

#[test]
fn one_large_primitive_block_widens_before_wiring() {
    let mut d = Detail::new();
    d.append_primitives(PrimitiveTypeId::POLYGON, 4).unwrap();
    assert_eq!(d.topology().primitive_ref().unwrap().width(), LinkWidth::W16);
    let n = 40_000;
    let (prim, vtx) = d
        .append_primitives_and_vertices(PrimitiveTypeId::POLYGON, n, 1)
        .unwrap();
    assert_eq!(d.topology().primitive_ref().unwrap().width(), LinkWidth::W32);
    assert_eq!(d.vertex_primitive(vtx), prim);
    assert_eq!(d.vertex_primitive(vtx.add(n - 1)), prim.add(n - 1));
    assert_eq!(prim.add(n - 1), o(n + 3));
    d.validate_invariants().unwrap();
}

#[test]
fn groups_resize_and_remap_with_their_class() {
    let mut d = Detail::new();
    quad_grid(&mut d, 4, 1);
    let g = d.create_group(ElementClass::Primitive, "odd").unwrap();
    g.set(o(1), true);
    g.set(o(3), true);
    d.destroy_primitive(o(0), false);
    d.defragment(ElementClass::Primitive, &DefragmentOptions::default());
    let g = d.groups(ElementClass::Primitive).get("odd").unwrap();
    assert_eq!(g.iter().collect::<Vec<_>>(), vec![o(0), o(2)]);
    assert_eq!(g.entries(), 2);
    assert_eq!(g.len_offsets(), 3);
}

#[test]
fn hardened_view_is_cached_until_change() {
    let mut d = Detail::new();
    quad_grid(&mut d, 2, 2);
    assert!(!d.primitives().is_hardened());
    let first = d.primitives().hardened_primitive(o(0)).unwrap().clone();
    assert!(d.primitives().is_hardened());
    assert_eq!(first.vertices.len(), 4);
    assert!(first.closed);
    d.set_primitive_closed(o(0), false);
    assert!(!d.primitives().is_hardened());
    assert!(!d.primitives().hardened_primitive(o(0)).unwrap().closed);
}
