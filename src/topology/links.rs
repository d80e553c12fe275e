//! TopologyLinks: the element-to-element relationships of a detail.
//!
//! | link               | owner     | target    | meaning                                   |
//! |--------------------|-----------|-----------|-------------------------------------------|
//! | `vertex_point`     | vertex    | point     | point a vertex is wired to                |
//! | `vertex_primitive` | vertex    | primitive | primitive owning a vertex                 |
//! | `point_vertex`     | point     | vertex    | first vertex of the point's chain         |
//! | `vertex_next`      | vertex    | vertex    | next vertex on the same point (circular)  |
//! | `vertex_prev`      | vertex    | vertex    | previous vertex on the same point         |
//! | `hedge_next`       | vertex    | vertex    | next hedge of the equivalence class       |
//!
//! Every link is materialized lazily; accessors for a link that was never
//! requested return `None`, and using one anyway is a contract violation.
//! Per-element writes do not touch data ids on their own: each public
//! mutation bumps every link it changed exactly once.

use crate::config::LinkWidthPolicy;
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshDetailError;
use crate::topology::hedge::{HedgeLinks, PrimitiveBoundary};
use crate::topology::index_map::OffsetRemap;
use crate::topology::link::{LinkArray, LinkWidth};
use crate::topology::offset::{ElementClass, Offset};

/// Which links a mutation touched, so each gets one data-id bump.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Touched {
    pub point: bool,
    pub primitive: bool,
    pub chain: bool,
    pub hedge: bool,
}

impl Touched {
    pub(crate) fn all() -> Self {
        Touched {
            point: true,
            primitive: true,
            chain: true,
            hedge: true,
        }
    }
}

/// The set of topology links of one detail.
#[derive(Clone, Debug)]
pub struct TopologyLinks {
    policy: LinkWidthPolicy,
    /// Offset sizes of point, vertex, primitive (indexed by `ElementClass::slot`).
    sizes: [usize; 3],
    vertex_point: Option<LinkArray>,
    vertex_primitive: Option<LinkArray>,
    point_vertex: Option<LinkArray>,
    vertex_next: Option<LinkArray>,
    vertex_prev: Option<LinkArray>,
    pub(crate) hedges: Option<HedgeLinks>,
}

impl TopologyLinks {
    pub fn new(policy: LinkWidthPolicy) -> Self {
        TopologyLinks {
            policy,
            sizes: [0; 3],
            vertex_point: None,
            vertex_primitive: None,
            point_vertex: None,
            vertex_next: None,
            vertex_prev: None,
            hedges: None,
        }
    }

    pub fn policy(&self) -> &LinkWidthPolicy {
        &self.policy
    }

    #[inline]
    fn size(&self, class: ElementClass) -> usize {
        match class {
            ElementClass::Global => 1,
            c => self.sizes[c.slot()],
        }
    }

    fn new_link(&self, name: &'static str, owner: ElementClass, target: ElementClass) -> LinkArray {
        let width = LinkWidth::choose(
            self.policy.min_width,
            self.size(target) as i64 - 1,
            &self.policy,
        );
        LinkArray::new(name, owner, target, self.size(owner), width)
    }

    // ----- materialization -----

    /// Materializes the vertex → point link.
    pub fn make_point_ref(&mut self) -> &mut LinkArray {
        let link = match self.vertex_point.take() {
            Some(l) => l,
            None => self.new_link("vertex_point", ElementClass::Vertex, ElementClass::Point),
        };
        self.vertex_point.insert(link)
    }

    /// Materializes the vertex → primitive link.
    pub fn make_primitive_ref(&mut self) -> &mut LinkArray {
        let link = match self.vertex_primitive.take() {
            Some(l) => l,
            None => self.new_link(
                "vertex_primitive",
                ElementClass::Vertex,
                ElementClass::Primitive,
            ),
        };
        self.vertex_primitive.insert(link)
    }

    /// Materializes the point → vertex chain and threads every wired vertex
    /// into it. Requires the vertex → point link.
    pub fn make_vertex_ref(&mut self) {
        if self.point_vertex.is_some() {
            return;
        }
        self.make_point_ref();
        self.point_vertex =
            Some(self.new_link("point_vertex", ElementClass::Point, ElementClass::Vertex));
        self.vertex_next =
            Some(self.new_link("vertex_next", ElementClass::Vertex, ElementClass::Vertex));
        self.vertex_prev =
            Some(self.new_link("vertex_prev", ElementClass::Vertex, ElementClass::Vertex));
        let wired: Vec<(Offset, Offset)> = self
            .point_ref()
            .map(|l| l.iter().filter(|(_, p)| p.is_valid()).collect())
            .unwrap_or_default();
        for (v, p) in wired {
            self.chain_insert(p, v);
        }
    }

    /// Materializes half-edge tracking (and the chain it searches) and links
    /// every hedge currently described by `boundary`.
    pub fn make_hedge_ref<B: PrimitiveBoundary + ?Sized>(&mut self, boundary: &B) {
        if self.hedges.is_some() {
            return;
        }
        self.make_vertex_ref();
        self.make_primitive_ref();
        let next = self.new_link("hedge_next", ElementClass::Vertex, ElementClass::Vertex);
        self.hedges = Some(HedgeLinks::new(next));
        let vertices: Vec<Offset> = self
            .point_ref()
            .map(|l| l.iter().filter(|(_, p)| p.is_valid()).map(|(v, _)| v).collect())
            .unwrap_or_default();
        for v in vertices {
            self.link_hedge(v, boundary);
        }
    }

    /// Drops the point → vertex chain (and hedges, which depend on it).
    pub fn destroy_vertex_ref(&mut self) {
        self.hedges = None;
        self.point_vertex = None;
        self.vertex_next = None;
        self.vertex_prev = None;
    }

    pub fn destroy_hedge_ref(&mut self) {
        self.hedges = None;
    }

    // ----- link handles; `None` when never materialized -----

    pub fn point_ref(&self) -> Option<&LinkArray> {
        self.vertex_point.as_ref()
    }

    pub fn primitive_ref(&self) -> Option<&LinkArray> {
        self.vertex_primitive.as_ref()
    }

    pub fn vertex_ref(&self) -> Option<&LinkArray> {
        self.point_vertex.as_ref()
    }

    pub fn vertex_next_ref(&self) -> Option<&LinkArray> {
        self.vertex_next.as_ref()
    }

    pub fn vertex_prev_ref(&self) -> Option<&LinkArray> {
        self.vertex_prev.as_ref()
    }

    pub fn hedge_next_ref(&self) -> Option<&LinkArray> {
        self.hedges.as_ref().map(|h| &h.next)
    }

    #[inline]
    pub fn tracks_point_vertices(&self) -> bool {
        self.point_vertex.is_some()
    }

    #[inline]
    pub fn tracks_hedges(&self) -> bool {
        self.hedges.is_some()
    }

    /// Every materialized link.
    pub fn links(&self) -> impl Iterator<Item = &LinkArray> {
        [
            self.vertex_point.as_ref(),
            self.vertex_primitive.as_ref(),
            self.point_vertex.as_ref(),
            self.vertex_next.as_ref(),
            self.vertex_prev.as_ref(),
            self.hedges.as_ref().map(|h| &h.next),
        ]
        .into_iter()
        .flatten()
    }

    fn links_mut(&mut self) -> impl Iterator<Item = &mut LinkArray> {
        [
            self.vertex_point.as_mut(),
            self.vertex_primitive.as_mut(),
            self.point_vertex.as_mut(),
            self.vertex_next.as_mut(),
            self.vertex_prev.as_mut(),
            self.hedges.as_mut().map(|h| &mut h.next),
        ]
        .into_iter()
        .flatten()
    }

    /// Materialized link by name.
    pub fn link(&self, name: &str) -> Option<&LinkArray> {
        self.links().find(|l| l.name() == name)
    }

    pub(crate) fn link_mut(&mut self, name: &str) -> Option<&mut LinkArray> {
        self.links_mut().find(|l| l.name() == name)
    }

    // ----- queries -----

    #[inline]
    pub fn vertex_point(&self, v: Offset) -> Offset {
        self.vertex_point
            .as_ref()
            .map_or(Offset::INVALID, |l| l.get(v))
    }

    #[inline]
    pub fn vertex_primitive(&self, v: Offset) -> Offset {
        self.vertex_primitive
            .as_ref()
            .map_or(Offset::INVALID, |l| l.get(v))
    }

    /// First vertex wired to `p`; `INVALID` without point → vertex tracking.
    #[inline]
    pub fn point_vertex(&self, p: Offset) -> Offset {
        self.point_vertex
            .as_ref()
            .map_or(Offset::INVALID, |l| l.get(p))
    }

    /// Next vertex sharing `v`'s point, `INVALID` after the last one.
    pub fn vertex_to_next_vertex(&self, v: Offset) -> Offset {
        let Some(next) = self.vertex_next.as_ref() else {
            return Offset::INVALID;
        };
        let n = next.get(v);
        if n == self.point_vertex(self.vertex_point(v)) {
            Offset::INVALID
        } else {
            n
        }
    }

    /// Previous vertex sharing `v`'s point, `INVALID` for the first one.
    pub fn vertex_to_prev_vertex(&self, v: Offset) -> Offset {
        let Some(prev) = self.vertex_prev.as_ref() else {
            return Offset::INVALID;
        };
        if v == self.point_vertex(self.vertex_point(v)) {
            Offset::INVALID
        } else {
            prev.get(v)
        }
    }

    /// Vertices wired to `p`, in chain order.
    pub fn point_vertices(&self, p: Offset) -> PointVertexIter<'_> {
        PointVertexIter {
            links: self,
            head: self.point_vertex(p),
            cur: self.point_vertex(p),
        }
    }

    /// Number of vertices wired to `p`.
    pub fn point_vertex_count(&self, p: Offset) -> usize {
        self.point_vertices(p).count()
    }

    // ----- chain maintenance -----

    fn chain_insert(&mut self, p: Offset, v: Offset) {
        let (Some(head_l), Some(next), Some(prev)) = (
            self.point_vertex.as_mut(),
            self.vertex_next.as_mut(),
            self.vertex_prev.as_mut(),
        ) else {
            return;
        };
        let head = head_l.get(p);
        if !head.is_valid() {
            head_l.set(p, v);
            next.set(v, v);
            prev.set(v, v);
        } else {
            let tail = prev.get(head);
            next.set(tail, v);
            prev.set(v, tail);
            next.set(v, head);
            prev.set(head, v);
        }
    }

    fn chain_remove(&mut self, p: Offset, v: Offset) {
        let (Some(head_l), Some(next), Some(prev)) = (
            self.point_vertex.as_mut(),
            self.vertex_next.as_mut(),
            self.vertex_prev.as_mut(),
        ) else {
            return;
        };
        let n = next.get(v);
        if !n.is_valid() {
            return;
        }
        let pr = prev.get(v);
        if n == v {
            head_l.set(p, Offset::INVALID);
        } else {
            next.set(pr, n);
            prev.set(n, pr);
            if head_l.get(p) == v {
                head_l.set(p, n);
            }
        }
        next.set(v, Offset::INVALID);
        prev.set(v, Offset::INVALID);
    }

    pub(crate) fn bump(&mut self, touched: Touched) {
        if touched.point {
            if let Some(l) = self.vertex_point.as_mut() {
                l.bump_data_id();
            }
        }
        if touched.primitive {
            if let Some(l) = self.vertex_primitive.as_mut() {
                l.bump_data_id();
            }
        }
        if touched.chain {
            for l in [
                self.point_vertex.as_mut(),
                self.vertex_next.as_mut(),
                self.vertex_prev.as_mut(),
            ]
            .into_iter()
            .flatten()
            {
                l.bump_data_id();
            }
        }
        if touched.hedge {
            if let Some(h) = self.hedges.as_mut() {
                h.next.bump_data_id();
            }
        }
    }

    // ----- wiring -----

    /// Rewires `v` to `p` without versioning and without hedge work.
    pub(crate) fn set_vertex_point_raw(&mut self, v: Offset, p: Offset) -> bool {
        let old = self.vertex_point(v);
        if old == p {
            return false;
        }
        if old.is_valid() {
            self.chain_remove(old, v);
        }
        self.make_point_ref().set(v, p);
        if p.is_valid() {
            self.chain_insert(p, v);
        }
        true
    }

    /// Wires `v` to `p`, relinking the two hedges incident to `v` into their
    /// new equivalence classes by searching the vertices of the old and new
    /// points.
    pub fn wire_vertex_point<B: PrimitiveBoundary + ?Sized>(
        &mut self,
        v: Offset,
        p: Offset,
        boundary: &B,
    ) {
        if self.vertex_point(v) == p {
            return;
        }
        if !p.is_valid() {
            log::warn!("vertex {v} wired to an invalid point");
        }
        let incident = self.incident_hedges(v, boundary);
        for h in incident.into_iter().flatten() {
            self.unlink_hedge(h);
        }
        self.set_vertex_point_raw(v, p);
        for h in incident.into_iter().flatten() {
            self.link_hedge(h, boundary);
        }
        self.bump(Touched {
            point: true,
            chain: self.tracks_point_vertices(),
            hedge: self.tracks_hedges(),
            ..Touched::default()
        });
    }

    /// Constant-time variant of [`wire_vertex_point`](Self::wire_vertex_point):
    /// the caller names a member of the class each incident hedge joins
    /// (`INVALID` for a new singleton class). `into_prev_class` receives the
    /// hedge ending at `v`; `into_class` the hedge starting at `v`.
    pub fn wire_vertex_point_and_relink_hedges<B: PrimitiveBoundary + ?Sized>(
        &mut self,
        v: Offset,
        p: Offset,
        into_prev_class: Offset,
        into_class: Offset,
        boundary: &B,
    ) {
        let [prev_h, own_h] = self.incident_hedges(v, boundary);
        for h in [prev_h, own_h].into_iter().flatten() {
            self.unlink_hedge(h);
        }
        self.set_vertex_point_raw(v, p);
        if let Some(h) = prev_h {
            self.link_hedge_into(h, into_prev_class);
        }
        if let Some(h) = own_h {
            self.link_hedge_into(h, into_class);
        }
        self.bump(Touched {
            point: true,
            chain: self.tracks_point_vertices(),
            hedge: self.tracks_hedges(),
            ..Touched::default()
        });
    }

    /// Wires `v` to `p` leaving hedge classes untouched.
    ///
    /// Only correct when the rewiring does not change which hedges are
    /// equivalent, e.g. moving every vertex of one point onto another point
    /// that no other vertex uses.
    pub fn wire_vertex_point_and_ignore_hedges(&mut self, v: Offset, p: Offset) {
        if self.set_vertex_point_raw(v, p) {
            self.bump(Touched {
                point: true,
                chain: self.tracks_point_vertices(),
                ..Touched::default()
            });
        }
    }

    /// Sets the owning primitive of `v` without versioning.
    pub(crate) fn set_vertex_primitive_raw(&mut self, v: Offset, prim: Offset) {
        self.make_primitive_ref().set(v, prim);
    }

    /// Sets the owning primitive of `v`.
    pub fn set_vertex_primitive(&mut self, v: Offset, prim: Offset) {
        if self.vertex_primitive(v) != prim {
            self.set_vertex_primitive_raw(v, prim);
            self.bump(Touched {
                primitive: true,
                ..Touched::default()
            });
        }
    }

    // ----- deletion -----

    /// Detaches `v` from its point chain and hedge class and clears its links.
    pub fn del_vertex(&mut self, v: Offset) {
        let p = self.vertex_point(v);
        let mut touched = Touched::default();
        if let Some(h) = self.hedges.as_mut() {
            touched.hedge = h.unlink(v);
        }
        if p.is_valid() {
            self.chain_remove(p, v);
            touched.chain = self.tracks_point_vertices();
            touched.point = true;
            if let Some(l) = self.vertex_point.as_mut() {
                l.set(v, Offset::INVALID);
            }
        }
        if self.vertex_primitive(v).is_valid() {
            if let Some(l) = self.vertex_primitive.as_mut() {
                l.set(v, Offset::INVALID);
            }
            touched.primitive = true;
        }
        self.bump(touched);
    }

    /// Clears the chain head of `p`. The point must have no vertices left.
    pub fn del_point(&mut self, p: Offset) {
        debug_assert!(
            !self.point_vertex(p).is_valid(),
            "point {p} deleted while vertices still reference it"
        );
        if let Some(l) = self.point_vertex.as_mut() {
            if l.get(p).is_valid() {
                l.set(p, Offset::INVALID);
                l.bump_data_id();
            }
        }
    }

    // ----- class shape changes -----

    /// Follows a class growing or shrinking to `size` offsets.
    pub fn resize_class(&mut self, class: ElementClass, size: usize) {
        if class == ElementClass::Global {
            return;
        }
        self.sizes[class.slot()] = size;
        for l in self.links_mut() {
            if l.owner() == class {
                l.resize(size);
            }
        }
        if class == ElementClass::Vertex {
            if let Some(h) = self.hedges.as_mut() {
                h.resize_flags(size);
            }
        }
    }

    /// Re-encodes every link whose target class crossed a width watermark.
    /// Call after block operations, not per element.
    pub fn check_storage_change(&mut self) -> bool {
        let sizes = self.sizes;
        let policy = self.policy;
        let mut changed = false;
        for l in self.links_mut() {
            let target = match l.target() {
                ElementClass::Global => 1,
                c => sizes[c.slot()],
            };
            changed |= l.check_width(target, &policy);
        }
        changed
    }

    /// Compacts the slots of every link owned by `class`.
    pub fn defragment_elements(&mut self, class: ElementClass, remap: &OffsetRemap) -> bool {
        let mut changed = false;
        for l in self.links_mut() {
            if l.owner() == class {
                changed |= l.compact_owner(remap);
            }
        }
        if class == ElementClass::Vertex {
            if let Some(h) = self.hedges.as_mut() {
                h.compact_flags(remap);
            }
        }
        if class != ElementClass::Global {
            self.sizes[class.slot()] = remap.new_size();
        }
        changed
    }

    /// Rewrites the values of every link targeting `class`.
    pub fn defragment_links(&mut self, class: ElementClass, remap: &OffsetRemap) -> bool {
        let mut changed = false;
        for l in self.links_mut() {
            if l.target() == class {
                changed |= l.remap_values(remap);
            }
        }
        changed
    }

    /// Copies every link whose data id differs from `src`'s and drops links
    /// `src` does not have. Returns `(copied, skipped)`.
    pub(crate) fn replace_from(&mut self, src: &TopologyLinks) -> (usize, usize) {
        fn one(dst: &mut Option<LinkArray>, src: &Option<LinkArray>) -> Option<bool> {
            match (dst.as_mut(), src) {
                (_, None) => {
                    *dst = None;
                    None
                }
                (Some(d), Some(s)) if d.data_id() == s.data_id() => Some(false),
                (Some(d), Some(s)) => {
                    d.replace_from(s);
                    Some(true)
                }
                (None, Some(s)) => {
                    *dst = Some(s.clone());
                    Some(true)
                }
            }
        }
        self.policy = src.policy;
        self.sizes = src.sizes;
        let mut results = vec![
            one(&mut self.vertex_point, &src.vertex_point),
            one(&mut self.vertex_primitive, &src.vertex_primitive),
            one(&mut self.point_vertex, &src.point_vertex),
            one(&mut self.vertex_next, &src.vertex_next),
            one(&mut self.vertex_prev, &src.vertex_prev),
        ];
        results.push(match (self.hedges.as_mut(), src.hedges.as_ref()) {
            (_, None) => {
                self.hedges = None;
                None
            }
            (Some(d), Some(s)) if d.next.data_id() == s.next.data_id() => Some(false),
            (Some(d), Some(s)) => {
                d.assign_from(s);
                Some(true)
            }
            (None, Some(s)) => {
                self.hedges = Some(s.clone());
                Some(true)
            }
        });
        let copied = results.iter().filter(|r| **r == Some(true)).count();
        let skipped = results.iter().filter(|r| **r == Some(false)).count();
        (copied, skipped)
    }

    /// Drops every value, keeping which links are materialized.
    pub fn clear(&mut self) {
        self.sizes = [0; 3];
        for l in self.links_mut() {
            l.resize(0);
            l.bump_data_id();
        }
        if let Some(h) = self.hedges.as_mut() {
            h.resize_flags(0);
        }
    }
}

/// Iterator over the vertices of one point.
pub struct PointVertexIter<'a> {
    links: &'a TopologyLinks,
    head: Offset,
    cur: Offset,
}

impl Iterator for PointVertexIter<'_> {
    type Item = Offset;

    fn next(&mut self) -> Option<Offset> {
        let cur = self.cur.valid()?;
        let next = self
            .links
            .vertex_next
            .as_ref()
            .map_or(Offset::INVALID, |l| l.get(cur));
        self.cur = if next == self.head {
            Offset::INVALID
        } else {
            next
        };
        Some(cur)
    }
}

impl DebugInvariants for TopologyLinks {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "TopologyLinks invalid");
    }

    fn validate_invariants(&self) -> Result<(), MeshDetailError> {
        for l in self.links() {
            let expected = self.size(l.owner());
            if l.len() != expected {
                return Err(MeshDetailError::SizeMismatch {
                    what: format!("link `{}`", l.name()),
                    expected,
                    found: l.len(),
                });
            }
            let max = l.max_value();
            if max > l.width().max_value() {
                return Err(MeshDetailError::LinkWidthOverflow {
                    link: l.name(),
                    value: max,
                });
            }
        }
        if let (Some(head), Some(next), Some(prev)) =
            (&self.point_vertex, &self.vertex_next, &self.vertex_prev)
        {
            for (p, h) in head.iter().filter(|(_, h)| h.is_valid()) {
                let mut cur = h;
                let mut steps = 0usize;
                loop {
                    if self.vertex_point(cur) != p || prev.get(next.get(cur)) != cur {
                        return Err(MeshDetailError::BrokenVertexChain { point: p, vertex: cur });
                    }
                    cur = next.get(cur);
                    steps += 1;
                    if cur == h {
                        break;
                    }
                    if steps > next.len() {
                        return Err(MeshDetailError::BrokenVertexChain { point: p, vertex: cur });
                    }
                }
            }
        }
        if let Some(h) = &self.hedges {
            h.validate_rings()?;
        }
        Ok(())
    }
}
