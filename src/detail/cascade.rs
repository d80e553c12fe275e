//! Point destruction with dereference cascade.
//!
//! Destroying a point that vertices still reference asks every primitive
//! using it what removing the point would do (see
//! [`PrimitiveTypeDef::dereference_point`]). The answers are gathered into a
//! [`CascadePlan`] before anything is touched, so a point whose destruction
//! is refused leaves every primitive exactly as it was.
//!
//! [`PrimitiveTypeDef::dereference_point`]: crate::primitive::PrimitiveTypeDef::dereference_point

use hashbrown::{HashMap, HashSet};

use super::Detail;
use crate::primitive::kind::DereferenceResult;
use crate::topology::offset::{ElementClass, Offset};

/// What happens to primitives referencing a destroyed point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DestroyMode {
    /// Keep primitives that can simply drop the point; refuse to destroy a
    /// point whose removal would make a primitive degenerate or that a
    /// primitive cannot give up.
    LeavePrimitives,
    /// Destroy primitives that would become degenerate; refuse points a
    /// primitive cannot give up.
    DestroyDegenerate,
    /// Always destroy the point; destroy every primitive that cannot keep
    /// working without it.
    DestroyDegenerateIncompatible,
}

/// Outcome of planning a batch of point destructions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CascadePlan {
    /// Points that will be destroyed, in request order.
    pub points: Vec<Offset>,
    /// Points left alive because a primitive refused.
    pub blocked: Vec<Offset>,
    /// Primitives destroyed along with the points.
    pub destroy_primitives: Vec<Offset>,
    /// `(primitive, point)` pairs: the primitive survives and drops its
    /// vertices on the point.
    pub detach: Vec<(Offset, Offset)>,
}

impl CascadePlan {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.blocked.is_empty()
    }
}

fn blocks(mode: DestroyMode, r: DereferenceResult) -> bool {
    match mode {
        DestroyMode::LeavePrimitives => {
            matches!(r, DereferenceResult::Fail | DereferenceResult::Degenerate)
        }
        DestroyMode::DestroyDegenerate => r == DereferenceResult::Fail,
        DestroyMode::DestroyDegenerateIncompatible => false,
    }
}

impl Detail {
    /// Works out what destroying `points` under `mode` would do, without
    /// changing anything.
    ///
    /// Points are considered in order; each decision sees the primitives as
    /// the earlier decisions of the batch would have left them.
    pub fn plan_point_destruction(
        &self,
        points: impl IntoIterator<Item = Offset>,
        mode: DestroyMode,
    ) -> CascadePlan {
        let mut plan = CascadePlan::default();
        let mut projected: HashMap<Offset, Vec<Offset>> = HashMap::new();
        let mut destroyed: HashSet<Offset> = HashSet::new();
        let mut seen: HashSet<Offset> = HashSet::new();

        for p in points {
            if !self.is_active(ElementClass::Point, p) || !seen.insert(p) {
                continue;
            }
            let mut decisions = Vec::new();
            for prim in self.point_primitives(p) {
                if destroyed.contains(&prim) {
                    continue;
                }
                let Some(def) = self.primitives.type_def(prim) else {
                    continue;
                };
                let pts = projected
                    .entry(prim)
                    .or_insert_with(|| self.primitive_points(prim));
                decisions.push((prim, def.dereference_point(pts, p)));
            }
            if let Some(&(prim, r)) = decisions.iter().find(|(_, r)| blocks(mode, *r)) {
                log::trace!("point {p} kept: primitive {prim} answered {r:?} under {mode:?}");
                plan.blocked.push(p);
                continue;
            }
            for (prim, r) in decisions {
                if r == DereferenceResult::Ok {
                    if let Some(pts) = projected.get_mut(&prim) {
                        pts.retain(|&q| q != p);
                    }
                    plan.detach.push((prim, p));
                } else {
                    log::trace!("primitive {prim} destroyed with point {p} ({r:?})");
                    projected.remove(&prim);
                    destroyed.insert(prim);
                    plan.destroy_primitives.push(prim);
                }
            }
            plan.points.push(p);
        }
        plan.detach.retain(|(prim, _)| !destroyed.contains(prim));
        plan
    }

    /// Carries out a plan made by [`plan_point_destruction`] on this same,
    /// unchanged detail. Returns the number of points destroyed.
    ///
    /// [`plan_point_destruction`]: Self::plan_point_destruction
    pub(crate) fn apply_cascade(&mut self, plan: &CascadePlan) -> usize {
        for &(prim, p) in &plan.detach {
            let on_point: Vec<Offset> = self
                .primitive_vertices(prim)
                .iter()
                .filter(|&v| self.vertex_point(v) == p)
                .collect();
            for v in on_point {
                self.destroy_vertex_offset(v);
            }
        }
        self.destroy_primitive_list(&plan.destroy_primitives, false);
        let mut count = 0;
        for &p in &plan.points {
            // Vertices owned by no primitive.
            for v in self.point_vertices(p) {
                self.destroy_vertex_offset(v);
            }
            self.kill_point(p);
            count += 1;
        }
        if count > 0 {
            self.meta_cache_count += 1;
            log::debug!(
                "destroyed {count} points ({} kept, {} primitives removed)",
                plan.blocked.len(),
                plan.destroy_primitives.len()
            );
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_invariants::DebugInvariants;
    use crate::primitive::kind::PrimitiveTypeId;

    fn o(i: usize) -> Offset {
        Offset::new(i)
    }

    /// Triangle (0, 1, 2) and quad (1, 2, 3, 4).
    fn tri_and_quad() -> (Detail, Offset, Offset) {
        let mut d = Detail::new();
        d.append_points(5);
        let tri = d
            .append_primitive_with_points(PrimitiveTypeId::POLYGON, &[o(0), o(1), o(2)])
            .unwrap();
        let quad = d
            .append_primitive_with_points(PrimitiveTypeId::POLYGON, &[o(1), o(2), o(3), o(4)])
            .unwrap();
        (d, tri, quad)
    }

    #[test]
    fn leave_primitives_refuses_degenerating_point() {
        let (mut d, tri, quad) = tri_and_quad();
        let plan = d.plan_point_destruction([o(1)], DestroyMode::LeavePrimitives);
        assert_eq!(plan.blocked, vec![o(1)]);
        assert!(plan.points.is_empty());
        let before = d.primitive_points(quad);
        assert!(!d.destroy_point(o(1), DestroyMode::LeavePrimitives));
        assert_eq!(d.primitive_points(quad), before);
        assert_eq!(d.primitive_points(tri).len(), 3);
        d.validate_invariants().unwrap();
    }

    #[test]
    fn leave_primitives_detaches_from_large_polygon() {
        let (mut d, _, quad) = tri_and_quad();
        assert!(d.destroy_point(o(4), DestroyMode::LeavePrimitives));
        assert_eq!(d.primitive_points(quad), vec![o(1), o(2), o(3)]);
        assert!(!d.is_active(ElementClass::Point, o(4)));
        d.validate_invariants().unwrap();
    }

    #[test]
    fn destroy_degenerate_removes_triangle_keeps_quad() {
        let (mut d, tri, quad) = tri_and_quad();
        assert!(d.destroy_point(o(1), DestroyMode::DestroyDegenerate));
        assert!(!d.is_active(ElementClass::Primitive, tri));
        assert_eq!(d.primitive_points(quad), vec![o(2), o(3), o(4)]);
        // vertices of the destroyed triangle are gone too
        assert_eq!(d.vertex_count(), 3);
        d.validate_invariants().unwrap();
    }

    #[test]
    fn batch_sees_earlier_decisions() {
        let (d, tri, quad) = tri_and_quad();
        // Dropping 3 leaves the quad a triangle; dropping 4 then degenerates it.
        let plan = d.plan_point_destruction([o(3), o(4)], DestroyMode::DestroyDegenerate);
        assert_eq!(plan.points, vec![o(3), o(4)]);
        assert_eq!(plan.destroy_primitives, vec![quad]);
        assert!(plan.detach.is_empty());
        assert!(!plan.destroy_primitives.contains(&tri));
    }

    #[test]
    fn fixed_types_block_unless_incompatible_mode() {
        let mut d = Detail::new();
        d.append_points(4);
        let tet = d
            .append_primitive_with_points(
                PrimitiveTypeId::TETRAHEDRON,
                &[o(0), o(1), o(2), o(3)],
            )
            .unwrap();
        assert!(!d.destroy_point(o(0), DestroyMode::DestroyDegenerate));
        assert!(d.is_active(ElementClass::Primitive, tet));
        assert!(d.destroy_point(o(0), DestroyMode::DestroyDegenerateIncompatible));
        assert!(!d.is_active(ElementClass::Primitive, tet));
        assert_eq!(d.vertex_count(), 0);
        d.validate_invariants().unwrap();
    }

    #[test]
    fn orphan_vertices_go_with_their_point() {
        let mut d = Detail::new();
        let p = d.append_points(1);
        let v = d.append_vertices(2);
        d.wire_vertex_point(v, p);
        d.wire_vertex_point(v.add(1), p);
        assert!(d.destroy_point(p, DestroyMode::LeavePrimitives));
        assert_eq!(d.vertex_count(), 0);
        d.validate_invariants().unwrap();
    }

    #[test]
    fn guaranteed_unreferenced_points_skip_planning() {
        let mut d = Detail::new();
        let p = d.append_points(3);
        let n = d.destroy_point_offsets(
            crate::topology::offset::OffsetRange::with_len(p, 3),
            DestroyMode::LeavePrimitives,
            true,
        );
        assert_eq!(n, 3);
        assert_eq!(d.point_count(), 0);
    }
}
