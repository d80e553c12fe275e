mod util;
use util::*;

use mesh_detail::prelude::*;

fn all_primitive_points(d: &Detail) -> Vec<Vec<Offset>> {
    indexed(d, ElementClass::Primitive)
        .into_iter()
        .map(|prim| d.primitive_points(prim))
        .collect()
}

#[test]
fn merged_grids_keep_separate_hedge_classes() {
    let mut dst = hedged();
    quad_grid(&mut dst, 2, 2);
    let mut src = hedged();
    quad_grid(&mut src, 2, 2);

    let ranges = dst.merge(&src).unwrap();
    assert_eq!(ranges.points, OffsetRange::with_len(o(9), 9));
    assert_eq!(ranges.primitives.len(), 4);
    assert_eq!(dst.primitive_count(), 8);

    for h in dst.index_map(ElementClass::Vertex).iter_offsets() {
        let class = dst.hedge_class(h);
        assert!((1..=2).contains(&class.len()));
        // members never straddle the two copies
        let from_src = ranges.vertices.contains(h);
        assert!(class.iter().all(|&m| ranges.vertices.contains(m) == from_src));
    }
    dst.validate_invariants().unwrap();
}

#[test]
fn merge_compacts_holes_and_carries_groups_and_orphans() {
    let mut src = Detail::new();
    src.append_points(5);
    {
        let sel = src.create_group(ElementClass::Point, "sel").unwrap();
        sel.set(o(2), true);
        sel.set(o(4), true);
    }
    assert!(src.destroy_point(o(1), DestroyMode::LeavePrimitives));
    let orphan = src.append_vertices(1);
    src.wire_vertex_point(orphan, o(3));
    src.append_primitive_with_points(PrimitiveTypeId::POLYLINE, &[o(4), o(0)])
        .unwrap();

    let mut dst = Detail::new();
    dst.append_points(1);
    let ranges = dst.merge(&src).unwrap();

    // src points 0, 2, 3, 4 land on 1..5
    assert_eq!(ranges.points, OffsetRange::with_len(o(1), 4));
    let sel = dst.groups(ElementClass::Point).get("sel").unwrap();
    assert_eq!(sel.iter().collect::<Vec<_>>(), vec![o(2), o(4)]);

    let prim = ranges.primitives.start;
    assert_eq!(dst.primitive_points(prim), vec![o(4), o(1)]);
    assert!(!dst.is_primitive_closed(prim));

    // vertices of primitives come first, orphans after
    assert_eq!(ranges.vertices.len(), 3);
    let merged_orphan = ranges.vertices.start.add(2);
    assert_eq!(dst.vertex_point(merged_orphan), o(3));
    assert!(!dst.vertex_primitive(merged_orphan).is_valid());
    dst.validate_invariants().unwrap();
}

#[test]
fn merge_into_itself_doubles_the_detail() {
    let mut d = hedged();
    quad_grid(&mut d, 1, 1);
    d.attributes_mut(ElementClass::Primitive)
        .add("mat", 3u16)
        .unwrap();
    let copy = d.clone();
    d.merge(&copy).unwrap();
    assert_eq!(d.point_count(), 8);
    assert_eq!(d.primitive_count(), 2);
    let mat = d.attributes(ElementClass::Primitive).get::<u16>("mat").unwrap();
    assert_eq!(mat.as_slice(), &[3, 3]);
    d.validate_invariants().unwrap();
}

#[test]
fn replace_undoes_local_edits() {
    let mut src = hedged();
    quad_grid(&mut src, 2, 2);
    src.attributes_mut(ElementClass::Point)
        .add("w", 0.5f32)
        .unwrap();

    let mut dst = src.clone();
    dst.destroy_primitive(o(0), true);
    dst.append_points(3);
    dst.attributes_mut(ElementClass::Point)
        .get_mut::<f32>("w")
        .unwrap()
        .set(o(8), 2.0);
    let ids_before = dst.index_map(ElementClass::Point).data_id();

    let stats = dst.replace(&src);
    assert!(stats.copied > 0);
    assert_eq!(all_primitive_points(&dst), all_primitive_points(&src));
    assert_eq!(dst.point_count(), src.point_count());
    let w = dst.attributes(ElementClass::Point).get::<f32>("w").unwrap();
    assert!(w.as_slice().iter().all(|&x| x == 0.5));
    assert!(dst.index_map(ElementClass::Point).data_id() >= ids_before);
    for h in dst.index_map(ElementClass::Vertex).iter_offsets() {
        assert_eq!(dst.hedge_class(h).len(), src.hedge_class(h).len());
    }
    dst.validate_invariants().unwrap();
}

#[test]
fn replace_adopts_the_source_topology_options() {
    let mut src = hedged();
    quad_grid(&mut src, 1, 2);
    let mut dst = Detail::new();
    dst.append_points(2);
    dst.replace(&src);
    assert!(dst.topology().tracks_hedges());
    assert!(dst.topology().tracks_point_vertices());
    assert_eq!(dst.find_hedge(o(2), o(3)), src.find_hedge(o(2), o(3)));
    dst.validate_invariants().unwrap();

    // And back: a plain source drops the hedges again.
    let plain = Detail::new();
    dst.replace(&plain);
    assert!(!dst.topology().tracks_hedges());
    assert_eq!(dst.point_count(), 0);
    dst.validate_invariants().unwrap();
}

#[test]
fn replace_copies_groups_written_concurrently() {
    let mut src = Detail::new();
    src.append_points(8);
    src.create_group(ElementClass::Point, "sel").unwrap().set(o(1), true);
    let mut dst = src.clone();

    let sel = src.groups(ElementClass::Point).get("sel").unwrap();
    std::thread::scope(|s| {
        s.spawn(|| sel.set_concurrent(o(3), true));
        s.spawn(|| sel.set_concurrent(o(6), true));
    });
    sel.invalidate_entries();

    let stats = dst.replace(&src);
    assert!(stats.copied >= 1);
    let copied = dst.groups(ElementClass::Point).get("sel").unwrap();
    assert_eq!(copied.iter().collect::<Vec<_>>(), vec![o(1), o(3), o(6)]);
    assert_eq!(copied.entries(), 3);

    // Nothing changed since: a second replace shares the group.
    let again = dst.replace(&src);
    assert_eq!(again.copied, 0);
}
