//! Half-edge equivalence classes.
//!
//! A hedge is named by its tail vertex: the boundary edge of a primitive
//! from that vertex to the next one. Two hedges are equivalent when they
//! join the same unordered pair of points. Each class is kept as a circular
//! list through `hedge_next`, with exactly one primary member.
//!
//! The shape of a primitive (which vertex follows which, whether it wraps
//! around) lives in the primitive store, so the class maintenance here asks
//! a [`PrimitiveBoundary`] for it.

use crate::mesh_error::MeshDetailError;
use crate::topology::index_map::OffsetRemap;
use crate::topology::link::LinkArray;
use crate::topology::links::{TopologyLinks, Touched};
use crate::topology::offset::Offset;

/// Boundary traversal of primitives, as far as hedges are concerned.
pub trait PrimitiveBoundary {
    /// Head vertex of the hedge whose tail is `vtx` in `prim`, or `INVALID`
    /// when `vtx` starts no hedge (last vertex of an open primitive, or a
    /// primitive type without hedges).
    fn hedge_head(&self, prim: Offset, vtx: Offset) -> Offset;

    /// Tail vertex of the hedge ending at `vtx` in `prim`, or `INVALID`.
    fn hedge_tail_into(&self, prim: Offset, vtx: Offset) -> Offset;
}

/// Boundary of a detail with no hedge-carrying primitives.
#[cfg(test)]
pub(crate) struct NoBoundary;

#[cfg(test)]
impl PrimitiveBoundary for NoBoundary {
    fn hedge_head(&self, _prim: Offset, _vtx: Offset) -> Offset {
        Offset::INVALID
    }

    fn hedge_tail_into(&self, _prim: Offset, _vtx: Offset) -> Offset {
        Offset::INVALID
    }
}

/// Class rings plus the primary flag, both owned by vertex.
#[derive(Clone, Debug)]
pub(crate) struct HedgeLinks {
    pub(crate) next: LinkArray,
    primary: Vec<bool>,
}

impl HedgeLinks {
    pub(crate) fn new(next: LinkArray) -> Self {
        let primary = vec![false; next.len()];
        HedgeLinks { next, primary }
    }

    #[inline]
    fn is_linked(&self, h: Offset) -> bool {
        self.next.get(h).is_valid()
    }

    #[inline]
    fn is_primary(&self, h: Offset) -> bool {
        h.valid()
            .and_then(|h| self.primary.get(h.get()).copied())
            .unwrap_or(false)
    }

    fn set_primary(&mut self, h: Offset, value: bool) {
        if let Some(slot) = h.valid().and_then(|h| self.primary.get_mut(h.get())) {
            *slot = value;
        }
    }

    /// Member whose successor is `h`.
    fn prev_of(&self, h: Offset) -> Offset {
        let mut cur = h;
        loop {
            let n = self.next.get(cur);
            if n == h || !n.is_valid() {
                return cur;
            }
            cur = n;
        }
    }

    /// Inserts `h` after `member`, or as a singleton primary class when
    /// `member` is invalid or not linked itself.
    pub(crate) fn link_after(&mut self, h: Offset, member: Offset) {
        if self.is_linked(h) {
            return;
        }
        if member.is_valid() && member != h && self.is_linked(member) {
            let after = self.next.get(member);
            self.next.set(h, after);
            self.next.set(member, h);
            self.set_primary(h, false);
        } else {
            self.next.set(h, h);
            self.set_primary(h, true);
        }
    }

    /// Removes `h` from its class, promoting its successor when `h` was the
    /// primary. Returns whether anything changed.
    pub(crate) fn unlink(&mut self, h: Offset) -> bool {
        let n = self.next.get(h);
        if !n.is_valid() {
            return false;
        }
        if n != h {
            let prev = self.prev_of(h);
            self.next.set(prev, n);
            if self.is_primary(h) {
                self.set_primary(n, true);
            }
        }
        self.next.set(h, Offset::INVALID);
        self.set_primary(h, false);
        true
    }

    pub(crate) fn assign_from(&mut self, src: &HedgeLinks) {
        self.next.replace_from(&src.next);
        self.primary.clone_from(&src.primary);
    }

    /// Follows the vertex class size; `next` is resized with the other links.
    pub(crate) fn resize_flags(&mut self, len: usize) {
        self.primary.resize(len, false);
    }

    pub(crate) fn compact_flags(&mut self, remap: &OffsetRemap) {
        remap.apply_to_vec(&mut self.primary, false);
    }

    /// Every ring closes and holds exactly one primary.
    pub(crate) fn validate_rings(&self) -> Result<(), MeshDetailError> {
        let mut seen = vec![false; self.next.len()];
        for (h, n) in self.next.iter() {
            if !n.is_valid() {
                if self.is_primary(h) {
                    return Err(MeshDetailError::InvalidHedgeClass {
                        vertex: h,
                        reason: "unlinked hedge marked primary",
                    });
                }
                continue;
            }
            if seen[h.get()] {
                continue;
            }
            let mut primaries = 0usize;
            let mut cur = h;
            loop {
                if !cur.is_valid() || cur.get() >= seen.len() || seen[cur.get()] {
                    return Err(MeshDetailError::InvalidHedgeClass {
                        vertex: h,
                        reason: "class ring does not close",
                    });
                }
                seen[cur.get()] = true;
                primaries += usize::from(self.is_primary(cur));
                cur = self.next.get(cur);
                if cur == h {
                    break;
                }
            }
            if primaries != 1 {
                return Err(MeshDetailError::InvalidHedgeClass {
                    vertex: h,
                    reason: "class must have exactly one primary",
                });
            }
        }
        Ok(())
    }
}

impl TopologyLinks {
    /// Point pair `(tail, head)` of hedge `h`, or `None` when `h` is not the
    /// tail of a hedge.
    pub fn hedge_points<B: PrimitiveBoundary + ?Sized>(
        &self,
        h: Offset,
        boundary: &B,
    ) -> Option<(Offset, Offset)> {
        let head = boundary.hedge_head(self.vertex_primitive(h), h);
        head.valid()
            .map(|head| (self.vertex_point(h), self.vertex_point(head)))
    }

    /// The hedges that touch `v`: the one ending at `v` and the one starting
    /// at it. Both are `None` without hedge tracking.
    pub(crate) fn incident_hedges<B: PrimitiveBoundary + ?Sized>(
        &self,
        v: Offset,
        boundary: &B,
    ) -> [Option<Offset>; 2] {
        if !self.tracks_hedges() {
            return [None, None];
        }
        let prim = self.vertex_primitive(v);
        let into = boundary.hedge_tail_into(prim, v).valid();
        let own = boundary.hedge_head(prim, v).valid().map(|_| v);
        match (into, own) {
            (Some(a), Some(b)) if a == b => [Some(a), None],
            pair => [pair.0, pair.1],
        }
    }

    /// A linked hedge equivalent to `h` other than `h` itself, found by
    /// scanning the vertices of `h`'s tail point.
    pub fn find_hedge_class_member<B: PrimitiveBoundary + ?Sized>(
        &self,
        h: Offset,
        boundary: &B,
    ) -> Offset {
        let Some(hedges) = self.hedges.as_ref() else {
            return Offset::INVALID;
        };
        let Some((a, b)) = self.hedge_points(h, boundary) else {
            return Offset::INVALID;
        };
        if !a.is_valid() || !b.is_valid() {
            return Offset::INVALID;
        }
        for u in self.point_vertices(a) {
            if u == h {
                continue;
            }
            let prim = self.vertex_primitive(u);
            // hedge u -> head lies on (a, ?)
            let head = boundary.hedge_head(prim, u);
            if head.is_valid() && self.vertex_point(head) == b && hedges.is_linked(u) {
                return u;
            }
            // hedge tail -> u lies on (?, a)
            let tail = boundary.hedge_tail_into(prim, u);
            if tail.is_valid()
                && tail != h
                && self.vertex_point(tail) == b
                && hedges.is_linked(tail)
            {
                return tail;
            }
        }
        Offset::INVALID
    }

    /// Links `h` into the class of its point pair, creating the class when
    /// no equivalent hedge exists. No-op when `h` starts no hedge.
    pub fn link_hedge<B: PrimitiveBoundary + ?Sized>(&mut self, h: Offset, boundary: &B) {
        if !self.tracks_hedges() || self.hedge_points(h, boundary).is_none() {
            return;
        }
        let member = self.find_hedge_class_member(h, boundary);
        self.link_hedge_into(h, member);
    }

    /// Links `h` right after `member` (`INVALID` for a new class).
    pub fn link_hedge_into(&mut self, h: Offset, member: Offset) {
        if let Some(hedges) = self.hedges.as_mut() {
            hedges.link_after(h, member);
        }
    }

    /// Removes `h` from its class. Unlinking the only member of a class is
    /// allowed and leaves no class behind.
    pub fn unlink_hedge(&mut self, h: Offset) {
        if let Some(hedges) = self.hedges.as_mut() {
            hedges.unlink(h);
        }
    }

    /// Links every hedge of a primitive's vertices with one data-id bump.
    pub fn link_primitive_hedges<B: PrimitiveBoundary + ?Sized>(
        &mut self,
        vertices: &[Offset],
        boundary: &B,
    ) {
        if !self.tracks_hedges() {
            return;
        }
        for &v in vertices {
            self.link_hedge(v, boundary);
        }
        self.bump(Touched {
            hedge: true,
            ..Touched::default()
        });
    }

    /// Unlinks every hedge of a primitive's vertices with one data-id bump.
    pub fn unlink_primitive_hedges(&mut self, vertices: &[Offset]) {
        let Some(hedges) = self.hedges.as_mut() else {
            return;
        };
        let mut changed = false;
        for &v in vertices {
            changed |= hedges.unlink(v);
        }
        if changed {
            self.bump(Touched {
                hedge: true,
                ..Touched::default()
            });
        }
    }

    /// Whether `h` is the primary of its class.
    pub fn is_primary_hedge(&self, h: Offset) -> bool {
        self.hedges.as_ref().is_some_and(|x| x.is_primary(h))
    }

    /// Whether `h` is currently a member of some class.
    pub fn is_linked_hedge(&self, h: Offset) -> bool {
        self.hedges.as_ref().is_some_and(|x| x.is_linked(h))
    }

    /// Next member of `h`'s class (`h` itself for a singleton).
    pub fn hedge_to_next_hedge(&self, h: Offset) -> Offset {
        self.hedges
            .as_ref()
            .map_or(Offset::INVALID, |x| x.next.get(h))
    }

    /// Previous member of `h`'s class. Walks the ring.
    pub fn hedge_to_prev_hedge(&self, h: Offset) -> Offset {
        match self.hedges.as_ref() {
            Some(x) if x.is_linked(h) => x.prev_of(h),
            _ => Offset::INVALID,
        }
    }

    /// Primary member of `h`'s class. Walks the ring.
    pub fn hedge_to_primary_hedge(&self, h: Offset) -> Offset {
        let Some(x) = self.hedges.as_ref().filter(|x| x.is_linked(h)) else {
            return Offset::INVALID;
        };
        let mut cur = h;
        loop {
            if x.is_primary(cur) {
                return cur;
            }
            cur = x.next.get(cur);
            if cur == h || !cur.is_valid() {
                return Offset::INVALID;
            }
        }
    }

    /// Every member of `h`'s class starting at `h`.
    pub fn hedge_class(&self, h: Offset) -> Vec<Offset> {
        let mut out = Vec::new();
        let Some(x) = self.hedges.as_ref().filter(|x| x.is_linked(h)) else {
            return out;
        };
        let mut cur = h;
        loop {
            out.push(cur);
            cur = x.next.get(cur);
            if cur == h || !cur.is_valid() {
                return out;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkWidthPolicy;
    use crate::debug_invariants::DebugInvariants;
    use crate::topology::offset::ElementClass;

    /// Closed polygons given as consecutive vertex runs.
    struct Rings(Vec<(usize, usize)>);

    impl Rings {
        fn span(&self, prim: Offset) -> (usize, usize) {
            self.0[prim.get()]
        }
    }

    impl PrimitiveBoundary for Rings {
        fn hedge_head(&self, prim: Offset, vtx: Offset) -> Offset {
            if !prim.is_valid() {
                return Offset::INVALID;
            }
            let (start, n) = self.span(prim);
            let i = vtx.get() - start;
            Offset::new(start + (i + 1) % n)
        }

        fn hedge_tail_into(&self, prim: Offset, vtx: Offset) -> Offset {
            if !prim.is_valid() {
                return Offset::INVALID;
            }
            let (start, n) = self.span(prim);
            let i = vtx.get() - start;
            Offset::new(start + (i + n - 1) % n)
        }
    }

    fn o(i: usize) -> Offset {
        Offset::new(i)
    }

    /// Two triangles sharing the edge between points 1 and 2:
    /// prim 0 = points (0, 1, 2) on vertices 0..3,
    /// prim 1 = points (2, 1, 3) on vertices 3..6.
    fn two_triangles() -> (TopologyLinks, Rings) {
        let rings = Rings(vec![(0, 3), (3, 3)]);
        let mut t = TopologyLinks::new(LinkWidthPolicy::default());
        t.resize_class(ElementClass::Point, 4);
        t.resize_class(ElementClass::Vertex, 6);
        t.resize_class(ElementClass::Primitive, 2);
        for (v, p) in [(0, 0), (1, 1), (2, 2), (3, 2), (4, 1), (5, 3)] {
            t.set_vertex_point_raw(o(v), o(p));
            t.set_vertex_primitive_raw(o(v), o(v / 3));
        }
        t.make_hedge_ref(&rings);
        (t, rings)
    }

    #[test]
    fn shared_edge_forms_one_class() {
        let (t, _) = two_triangles();
        // hedge 1 (1 -> 2) and hedge 3 (2 -> 1) are equivalent
        assert_eq!(t.hedge_class(o(1)).len(), 2);
        assert_eq!(t.hedge_to_next_hedge(o(1)), o(3));
        assert_eq!(t.hedge_to_prev_hedge(o(1)), o(3));
        assert_eq!(t.is_primary_hedge(o(1)) as u8 + t.is_primary_hedge(o(3)) as u8, 1);
        // border hedges are singletons and primary
        assert_eq!(t.hedge_to_next_hedge(o(0)), o(0));
        assert!(t.is_primary_hedge(o(0)));
        t.validate_invariants().unwrap();
    }

    #[test]
    fn unlinking_primary_promotes_successor() {
        let (mut t, _) = two_triangles();
        let primary = t.hedge_to_primary_hedge(o(3));
        let other = if primary == o(1) { o(3) } else { o(1) };
        t.unlink_hedge(primary);
        assert!(t.is_primary_hedge(other));
        assert_eq!(t.hedge_to_next_hedge(other), other);
        assert!(!t.is_linked_hedge(primary));
        t.validate_invariants().unwrap();
    }

    #[test]
    fn unlinking_singleton_is_allowed() {
        let (mut t, _) = two_triangles();
        t.unlink_hedge(o(0));
        assert_eq!(t.hedge_to_next_hedge(o(0)), Offset::INVALID);
        t.unlink_hedge(o(0));
        t.validate_invariants().unwrap();
    }

    #[test]
    fn rewiring_splits_and_joins_classes() {
        let (mut t, rings) = two_triangles();
        t.resize_class(ElementClass::Point, 5);
        // move vertex 4 off point 1: the shared edge splits
        t.wire_vertex_point(o(4), o(4), &rings);
        assert_eq!(t.hedge_class(o(1)), vec![o(1)]);
        assert_eq!(t.hedge_class(o(3)), vec![o(3)]);
        t.validate_invariants().unwrap();
        // and back: they join again
        t.wire_vertex_point(o(4), o(1), &rings);
        assert_eq!(t.hedge_class(o(1)).len(), 2);
        t.validate_invariants().unwrap();
    }

    #[test]
    fn relink_with_known_members() {
        let (mut t, rings) = two_triangles();
        t.resize_class(ElementClass::Point, 5);
        t.wire_vertex_point_and_relink_hedges(o(4), o(4), Offset::INVALID, Offset::INVALID, &rings);
        assert_eq!(t.hedge_class(o(3)), vec![o(3)]);
        assert_eq!(t.hedge_class(o(4)), vec![o(4)]);
        t.validate_invariants().unwrap();
    }

    #[test]
    fn hedge_points_follow_ring() {
        let (t, rings) = two_triangles();
        assert_eq!(t.hedge_points(o(2), &rings), Some((o(2), o(0))));
        assert_eq!(t.hedge_points(o(5), &rings), Some((o(3), o(2))));
    }
}
