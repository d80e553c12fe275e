//! The detail: aggregate root of one mesh.
//!
//! A [`Detail`] owns one [`IndexMap`] per element class, the
//! [`TopologyLinks`], the [`PrimitiveStore`], and the per-class attribute and
//! group dictionaries, and keeps them in step through every structural
//! operation: block appends, wiring, destruction with cascade,
//! defragmentation, replace and merge.
//!
//! Structural operations report through `bool`, counts, or
//! `Offset::INVALID`. Only misuse that can be detected before anything is
//! touched (unknown primitive type, wrong vertex count for a fixed type,
//! dangling point) comes back as `Err`.

mod cascade;
mod defragment;
mod marker;
mod replace;
mod validate;

pub use cascade::{CascadePlan, DestroyMode};
pub use marker::{ElementMarker, MarkedRanges};
pub use replace::ReplaceStats;

use std::sync::Arc;

use itertools::Itertools;

use crate::config::DetailConfig;
use crate::data::attributes::AttributeDict;
use crate::data::group::{ElementGroup, GroupDict};
use crate::data::storage::OffsetStorage;
use crate::mesh_error::MeshDetailError;
use crate::primitive::kind::{PrimitiveTypeDef, PrimitiveTypeId, PrimitiveTypeRegistry};
use crate::primitive::store::{BlockVertices, PrimitiveStore, VertexListRef};
use crate::primitive::tracker::PrimitiveTracker;
use crate::topology::cache::InvalidateCache;
use crate::topology::hedge::PrimitiveBoundary;
use crate::topology::index_map::IndexMap;
use crate::topology::links::{TopologyLinks, Touched};
use crate::topology::offset::{ElementClass, Offset, OffsetRange};

/// Vertex counts of a primitive block.
#[derive(Clone, Copy, Debug)]
enum BlockCounts<'a> {
    Uniform(usize),
    Each(&'a [usize]),
}

impl BlockCounts<'_> {
    fn get(&self, i: usize) -> usize {
        match self {
            BlockCounts::Uniform(n) => *n,
            BlockCounts::Each(c) => c[i],
        }
    }

    fn vertices(&self, start: Offset) -> BlockVertices<'_> {
        match *self {
            BlockCounts::Uniform(per_primitive) => BlockVertices::Uniform {
                start,
                per_primitive,
            },
            BlockCounts::Each(counts) => BlockVertices::Counts { start, counts },
        }
    }
}

/// In-memory mesh: points, vertices, primitives, and one global record.
#[derive(Clone, Debug)]
pub struct Detail {
    config: DetailConfig,
    registry: Arc<PrimitiveTypeRegistry>,
    index_maps: [IndexMap; 4],
    topology: TopologyLinks,
    primitives: PrimitiveStore,
    attributes: [AttributeDict; 4],
    groups: [GroupDict; 4],
    meta_cache_count: u64,
}

impl Default for Detail {
    fn default() -> Self {
        Self::new()
    }
}

impl Detail {
    /// Empty detail with the default configuration and built-in types.
    pub fn new() -> Self {
        Self::build(
            DetailConfig::default(),
            Arc::new(PrimitiveTypeRegistry::with_builtins()),
        )
    }

    pub fn with_config(config: DetailConfig) -> Result<Self, MeshDetailError> {
        Self::with_registry(config, Arc::new(PrimitiveTypeRegistry::with_builtins()))
    }

    pub fn with_registry(
        config: DetailConfig,
        registry: Arc<PrimitiveTypeRegistry>,
    ) -> Result<Self, MeshDetailError> {
        config.validate()?;
        Ok(Self::build(config, registry))
    }

    fn build(config: DetailConfig, registry: Arc<PrimitiveTypeRegistry>) -> Self {
        let topo = config.effective_topology();
        let primitives = PrimitiveStore::new(Arc::clone(&registry), &config.primitives);
        let mut topology = TopologyLinks::new(config.link_width);
        topology.make_point_ref();
        topology.make_primitive_ref();
        if topo.track_point_vertices {
            topology.make_vertex_ref();
        }
        if topo.track_hedges {
            topology.make_hedge_ref(&primitives);
        }
        let mut detail = Detail {
            config,
            registry,
            index_maps: ElementClass::ALL.map(IndexMap::new),
            topology,
            primitives,
            attributes: ElementClass::ALL.map(AttributeDict::new),
            groups: ElementClass::ALL.map(GroupDict::new),
            meta_cache_count: 0,
        };
        detail.grow(ElementClass::Global, 1);
        detail
    }

    // ----- accessors -----

    pub fn config(&self) -> &DetailConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PrimitiveTypeRegistry> {
        &self.registry
    }

    #[inline]
    pub fn index_map(&self, class: ElementClass) -> &IndexMap {
        &self.index_maps[class.slot()]
    }

    #[inline]
    pub fn topology(&self) -> &TopologyLinks {
        &self.topology
    }

    #[inline]
    pub fn primitives(&self) -> &PrimitiveStore {
        &self.primitives
    }

    pub fn tracker(&self) -> &PrimitiveTracker {
        self.primitives.tracker()
    }

    pub fn attributes(&self, class: ElementClass) -> &AttributeDict {
        &self.attributes[class.slot()]
    }

    pub fn attributes_mut(&mut self, class: ElementClass) -> &mut AttributeDict {
        &mut self.attributes[class.slot()]
    }

    pub fn groups(&self, class: ElementClass) -> &GroupDict {
        &self.groups[class.slot()]
    }

    pub fn groups_mut(&mut self, class: ElementClass) -> &mut GroupDict {
        &mut self.groups[class.slot()]
    }

    /// New empty group sized to `class`.
    pub fn create_group(
        &mut self,
        class: ElementClass,
        name: &str,
    ) -> Result<&mut ElementGroup, MeshDetailError> {
        let size = self.index_map(class).offset_size();
        self.groups[class.slot()].create(name, size)
    }

    pub fn point_count(&self) -> usize {
        self.index_map(ElementClass::Point).len()
    }

    pub fn vertex_count(&self) -> usize {
        self.index_map(ElementClass::Vertex).len()
    }

    pub fn primitive_count(&self) -> usize {
        self.index_map(ElementClass::Primitive).len()
    }

    #[inline]
    pub fn is_active(&self, class: ElementClass, off: Offset) -> bool {
        self.index_map(class).is_active(off)
    }

    /// Detail-wide change counter, advanced by every structural change.
    pub fn meta_cache_count(&self) -> u64 {
        self.meta_cache_count
    }

    pub fn contains_primitive_type(&self, id: PrimitiveTypeId) -> bool {
        self.tracker().contains(id)
    }

    /// Sets the traversal order of `class`; see [`IndexMap::reorder`].
    pub fn reorder(&mut self, class: ElementClass, order: &[Offset]) -> Result<(), MeshDetailError> {
        self.index_maps[class.slot()].reorder(order)?;
        self.meta_cache_count += 1;
        Ok(())
    }

    // ----- growth -----

    /// Reserves `n` offsets of `class` and sizes every dependent structure.
    fn grow(&mut self, class: ElementClass, n: usize) -> Offset {
        let slot = class.slot();
        let start = self.index_maps[slot].add_element_block(n);
        if !start.is_valid() {
            return start;
        }
        let size = self.index_maps[slot].offset_size();
        self.topology.resize_class(class, size);
        if class == ElementClass::Primitive {
            self.primitives.resize(size);
        }
        let attrs = &mut self.attributes[slot];
        attrs.resize(size);
        attrs.construct_range(start, n);
        for g in self.groups[slot].iter_mut() {
            g.resize(size);
        }
        start
    }

    fn finish_block(&mut self) {
        self.topology.check_storage_change();
        self.meta_cache_count += 1;
    }

    /// Appends `n` points; returns the first offset (`INVALID` for `n == 0`).
    pub fn append_points(&mut self, n: usize) -> Offset {
        let start = self.grow(ElementClass::Point, n);
        if start.is_valid() {
            self.finish_block();
        }
        start
    }

    /// Appends `n` unwired vertices owned by no primitive.
    pub fn append_vertices(&mut self, n: usize) -> Offset {
        let start = self.grow(ElementClass::Vertex, n);
        if start.is_valid() {
            self.finish_block();
        }
        start
    }

    fn append_primitive_block(
        &mut self,
        type_id: PrimitiveTypeId,
        n: usize,
        counts: BlockCounts<'_>,
    ) -> Result<(Offset, Offset), MeshDetailError> {
        self.primitives
            .check_block(type_id, n, &counts.vertices(Offset::new(0)))?;
        if n == 0 {
            return Ok((Offset::INVALID, Offset::INVALID));
        }
        let total = (0..n).map(|i| counts.get(i)).sum();
        let vtx = self.grow(ElementClass::Vertex, total);
        let prim = self.grow(ElementClass::Primitive, n);
        // links must be wide enough before the new offsets are written
        self.topology.check_storage_change();
        self.primitives
            .create_block(type_id, prim, n, counts.vertices(vtx))?;
        let mut v = vtx;
        for i in 0..n {
            let c = counts.get(i);
            for k in 0..c {
                self.topology.set_vertex_primitive_raw(v.add(k), prim.add(i));
            }
            if c > 0 {
                v = v.add(c);
            }
        }
        if total > 0 {
            self.topology.bump(Touched {
                primitive: true,
                ..Touched::default()
            });
            if self.topology.tracks_hedges() {
                let vertices: Vec<Offset> = (0..total).map(|i| vtx.add(i)).collect();
                self.topology
                    .link_primitive_hedges(&vertices, &self.primitives);
            }
        }
        self.finish_block();
        Ok((prim, vtx))
    }

    /// Appends `n` primitives without vertices.
    pub fn append_primitives(
        &mut self,
        type_id: PrimitiveTypeId,
        n: usize,
    ) -> Result<Offset, MeshDetailError> {
        self.append_primitive_block(type_id, n, BlockCounts::Uniform(0))
            .map(|(prim, _)| prim)
    }

    /// Appends `n` primitives owning `per_primitive` fresh, unwired vertices
    /// each. Returns the first primitive and the first vertex.
    pub fn append_primitives_and_vertices(
        &mut self,
        type_id: PrimitiveTypeId,
        n: usize,
        per_primitive: usize,
    ) -> Result<(Offset, Offset), MeshDetailError> {
        self.append_primitive_block(type_id, n, BlockCounts::Uniform(per_primitive))
    }

    /// Like [`append_primitives_and_vertices`](Self::append_primitives_and_vertices)
    /// with a vertex count per primitive.
    pub fn append_primitives_with_counts(
        &mut self,
        type_id: PrimitiveTypeId,
        counts: &[usize],
    ) -> Result<(Offset, Offset), MeshDetailError> {
        self.append_primitive_block(type_id, counts.len(), BlockCounts::Each(counts))
    }

    /// Appends one primitive whose vertices are wired to `points`, hedges
    /// included.
    pub fn append_primitive_with_points(
        &mut self,
        type_id: PrimitiveTypeId,
        points: &[Offset],
    ) -> Result<Offset, MeshDetailError> {
        self.append_primitives_with_points(type_id, &[points.len()], points)
    }

    /// Appends `counts.len()` primitives; primitive `i` gets `counts[i]`
    /// vertices wired to the next entries of `points`.
    pub fn append_primitives_with_points(
        &mut self,
        type_id: PrimitiveTypeId,
        counts: &[usize],
        points: &[Offset],
    ) -> Result<Offset, MeshDetailError> {
        let total: usize = counts.iter().sum();
        if total != points.len() {
            return Err(MeshDetailError::SizeMismatch {
                what: "points of a primitive block".into(),
                expected: total,
                found: points.len(),
            });
        }
        if let Some(&p) = points.iter().find(|&&p| !self.is_active(ElementClass::Point, p)) {
            return Err(MeshDetailError::DanglingVertexPoint {
                vertex: Offset::INVALID,
                point: p,
            });
        }
        let (prim, vtx) =
            self.append_primitive_block(type_id, counts.len(), BlockCounts::Each(counts))?;
        if total == 0 {
            return Ok(prim);
        }
        let vertices: Vec<Offset> = (0..total).map(|i| vtx.add(i)).collect();
        self.topology.unlink_primitive_hedges(&vertices);
        for (i, &p) in points.iter().enumerate() {
            self.topology.set_vertex_point_raw(vtx.add(i), p);
        }
        self.topology.bump(Touched {
            point: true,
            chain: self.topology.tracks_point_vertices(),
            ..Touched::default()
        });
        self.topology
            .link_primitive_hedges(&vertices, &self.primitives);
        Ok(prim)
    }

    // ----- wiring -----

    fn check_active(&self, class: ElementClass, off: Offset, op: &str) -> bool {
        let ok = self.is_active(class, off);
        if !ok {
            debug_assert!(false, "{op}: {class} {off} is not active");
            log::warn!("{op}: {class} {off} is not active; ignored");
        }
        ok
    }

    /// Wires `v` to `p`, relinking hedges by search.
    pub fn wire_vertex_point(&mut self, v: Offset, p: Offset) {
        if !self.check_active(ElementClass::Vertex, v, "wire_vertex_point") {
            return;
        }
        self.topology.wire_vertex_point(v, p, &self.primitives);
        self.meta_cache_count += 1;
    }

    /// Wires `v` to `p` joining hedge classes the caller already knows.
    pub fn wire_vertex_point_and_relink_hedges(
        &mut self,
        v: Offset,
        p: Offset,
        into_prev_class: Offset,
        into_class: Offset,
    ) {
        if !self.check_active(ElementClass::Vertex, v, "wire_vertex_point_and_relink_hedges") {
            return;
        }
        self.topology.wire_vertex_point_and_relink_hedges(
            v,
            p,
            into_prev_class,
            into_class,
            &self.primitives,
        );
        self.meta_cache_count += 1;
    }

    /// Wires `v` to `p` leaving hedges alone; see
    /// [`TopologyLinks::wire_vertex_point_and_ignore_hedges`].
    pub fn wire_vertex_point_and_ignore_hedges(&mut self, v: Offset, p: Offset) {
        if !self.check_active(ElementClass::Vertex, v, "wire_vertex_point_and_ignore_hedges") {
            return;
        }
        self.topology.wire_vertex_point_and_ignore_hedges(v, p);
        self.meta_cache_count += 1;
    }

    /// Starts keeping the point → vertex chain if it was not kept yet.
    pub fn enable_point_vertex_tracking(&mut self) {
        if !self.topology.tracks_point_vertices() {
            self.topology.make_vertex_ref();
            self.meta_cache_count += 1;
        }
    }

    /// Starts keeping hedge classes if they were not kept yet.
    pub fn enable_hedge_tracking(&mut self) {
        if !self.topology.tracks_hedges() {
            self.topology.make_hedge_ref(&self.primitives);
            self.meta_cache_count += 1;
        }
    }

    // ----- queries -----

    pub fn vertex_point(&self, v: Offset) -> Offset {
        self.topology.vertex_point(v)
    }

    pub fn vertex_primitive(&self, v: Offset) -> Offset {
        self.topology.vertex_primitive(v)
    }

    /// Vertices wired to `p`: the chain when kept, a scan otherwise.
    pub fn point_vertices(&self, p: Offset) -> Vec<Offset> {
        if self.topology.tracks_point_vertices() {
            return self.topology.point_vertices(p).collect();
        }
        self.index_map(ElementClass::Vertex)
            .iter_offsets()
            .filter(|&v| self.topology.vertex_point(v) == p)
            .collect()
    }

    /// Primitives with at least one vertex on `p`, ascending.
    pub fn point_primitives(&self, p: Offset) -> Vec<Offset> {
        self.point_vertices(p)
            .into_iter()
            .map(|v| self.topology.vertex_primitive(v))
            .filter(|prim| prim.is_valid())
            .sorted()
            .dedup()
            .collect()
    }

    /// Whether no vertex references `p`.
    pub fn point_is_unused(&self, p: Offset) -> bool {
        if self.topology.tracks_point_vertices() {
            !self.topology.point_vertex(p).is_valid()
        } else {
            self.point_vertices(p).is_empty()
        }
    }

    pub fn primitive_type(&self, prim: Offset) -> Option<PrimitiveTypeId> {
        self.primitives.type_id(prim)
    }

    pub fn primitive_type_def(&self, prim: Offset) -> Option<&PrimitiveTypeDef> {
        self.primitives.type_def(prim)
    }

    pub fn primitive_vertices(&self, prim: Offset) -> VertexListRef<'_> {
        self.primitives.vertex_list(prim)
    }

    /// Points of `prim`'s vertices, in vertex order.
    pub fn primitive_points(&self, prim: Offset) -> Vec<Offset> {
        self.primitives
            .vertex_list(prim)
            .iter()
            .map(|v| self.topology.vertex_point(v))
            .collect()
    }

    pub fn is_primitive_closed(&self, prim: Offset) -> bool {
        self.primitives.is_closed(prim)
    }

    pub fn is_primary_hedge(&self, h: Offset) -> bool {
        self.topology.is_primary_hedge(h)
    }

    pub fn hedge_to_next_hedge(&self, h: Offset) -> Offset {
        self.topology.hedge_to_next_hedge(h)
    }

    pub fn hedge_to_prev_hedge(&self, h: Offset) -> Offset {
        self.topology.hedge_to_prev_hedge(h)
    }

    pub fn hedge_to_primary_hedge(&self, h: Offset) -> Offset {
        self.topology.hedge_to_primary_hedge(h)
    }

    /// Point pair `(tail, head)` of hedge `h`.
    pub fn hedge_points(&self, h: Offset) -> Option<(Offset, Offset)> {
        self.topology.hedge_points(h, &self.primitives)
    }

    pub fn hedge_class(&self, h: Offset) -> Vec<Offset> {
        self.topology.hedge_class(h)
    }

    /// A hedge joining points `a` and `b` in either direction.
    pub fn find_hedge(&self, a: Offset, b: Offset) -> Offset {
        for v in self.point_vertices(a) {
            if self.hedge_points(v).is_some_and(|(_, head)| head == b) {
                return v;
            }
            let prim = self.vertex_primitive(v);
            let tail = self.primitives.hedge_tail_into(prim, v);
            if tail.is_valid() && self.vertex_point(tail) == b {
                return tail;
            }
        }
        Offset::INVALID
    }

    // ----- primitive editing -----

    /// Runs `f` with `prim`'s hedges unlinked and relinks them afterwards.
    fn edit_primitive<R>(&mut self, prim: Offset, f: impl FnOnce(&mut Self) -> R) -> R {
        let before = self.primitives.vertex_list(prim).to_vec();
        self.topology.unlink_primitive_hedges(&before);
        let r = f(self);
        let after = self.primitives.vertex_list(prim).to_vec();
        self.topology
            .link_primitive_hedges(&after, &self.primitives);
        self.meta_cache_count += 1;
        r
    }

    fn accepts_new_vertices(&self, prim: Offset, op: &str) -> bool {
        if !self.check_active(ElementClass::Primitive, prim, op) {
            return false;
        }
        !self
            .primitives
            .type_def(prim)
            .is_some_and(PrimitiveTypeDef::is_fixed_vertex_count)
    }

    /// Adds a vertex on `point` at the end of `prim`. Returns the vertex,
    /// or `INVALID` when the primitive has a fixed vertex count.
    pub fn append_vertex_to_primitive(&mut self, prim: Offset, point: Offset) -> Offset {
        let at = self.primitives.vertex_count(prim);
        self.insert_vertex_into_primitive(prim, at, point)
    }

    /// Adds a vertex on `point` at position `i` of `prim`.
    pub fn insert_vertex_into_primitive(&mut self, prim: Offset, i: usize, point: Offset) -> Offset {
        if !self.accepts_new_vertices(prim, "insert_vertex_into_primitive")
            || !self.check_active(ElementClass::Point, point, "insert_vertex_into_primitive")
        {
            return Offset::INVALID;
        }
        let v = self.grow(ElementClass::Vertex, 1);
        self.finish_block();
        self.topology.set_vertex_primitive(v, prim);
        self.edit_primitive(prim, |d| {
            d.primitives.insert_vertex(prim, i, v);
            d.topology.wire_vertex_point_and_ignore_hedges(v, point);
        });
        v
    }

    /// Removes and destroys the vertex at position `i` of `prim`.
    pub fn remove_vertex_from_primitive(&mut self, prim: Offset, i: usize) -> bool {
        if !self.accepts_new_vertices(prim, "remove_vertex_from_primitive") {
            return false;
        }
        let v = self.primitives.vertex_list(prim).get(i);
        v.is_valid() && self.destroy_vertex_offset(v)
    }

    pub fn set_primitive_closed(&mut self, prim: Offset, closed: bool) -> bool {
        if self.primitives.is_closed(prim) == closed
            || !self.check_active(ElementClass::Primitive, prim, "set_primitive_closed")
        {
            return false;
        }
        self.edit_primitive(prim, |d| d.primitives.set_closed(prim, closed))
    }

    pub fn set_primitive_type(
        &mut self,
        prim: Offset,
        type_id: PrimitiveTypeId,
    ) -> Result<bool, MeshDetailError> {
        if !self.check_active(ElementClass::Primitive, prim, "set_primitive_type") {
            return Ok(false);
        }
        self.edit_primitive(prim, |d| d.primitives.set_type(prim, type_id))
    }

    // ----- destruction -----

    fn kill_vertex(&mut self, v: Offset) {
        let slot = ElementClass::Vertex.slot();
        self.topology.del_vertex(v);
        self.attributes[slot].destruct(v);
        for g in self.groups[slot].iter_mut() {
            g.destruct(v);
        }
        self.index_maps[slot].destroy_offset(v);
    }

    fn kill_point(&mut self, p: Offset) {
        let slot = ElementClass::Point.slot();
        self.topology.del_point(p);
        self.attributes[slot].destruct(p);
        for g in self.groups[slot].iter_mut() {
            g.destruct(p);
        }
        self.index_maps[slot].destroy_offset(p);
    }

    /// Destroys one vertex, removing it from its primitive first. A
    /// primitive of a fixed-count type cannot lose a vertex and is destroyed
    /// with all of its vertices instead. Returns `false` for a vacant offset.
    pub fn destroy_vertex_offset(&mut self, v: Offset) -> bool {
        if !self.is_active(ElementClass::Vertex, v) {
            return false;
        }
        let prim = self.topology.vertex_primitive(v);
        let fixed = self
            .primitives
            .type_def(prim)
            .is_some_and(PrimitiveTypeDef::is_fixed_vertex_count);
        if fixed {
            return self.destroy_primitive_list(&[prim], false) == 1;
        }
        if self.primitives.contains(prim) {
            self.edit_primitive(prim, |d| d.primitives.forget_vertex(prim, v));
        }
        self.kill_vertex(v);
        self.meta_cache_count += 1;
        true
    }

    fn destroy_primitive_list(&mut self, prims: &[Offset], and_points: bool) -> usize {
        let slot = ElementClass::Primitive.slot();
        let mut destroyed = 0;
        let mut orphans = Vec::new();
        for &prim in prims {
            if !self.index_maps[slot].is_active(prim) {
                continue;
            }
            let verts = self.primitives.vertex_list(prim).to_vec();
            self.topology.unlink_primitive_hedges(&verts);
            self.primitives.take(prim);
            for v in verts {
                if and_points {
                    orphans.push(self.topology.vertex_point(v));
                }
                self.kill_vertex(v);
            }
            self.attributes[slot].destruct(prim);
            for g in self.groups[slot].iter_mut() {
                g.destruct(prim);
            }
            self.index_maps[slot].destroy_offset(prim);
            destroyed += 1;
        }
        if destroyed > 0 {
            self.primitives.bump_data_id();
            self.meta_cache_count += 1;
        }
        if and_points {
            orphans.sort();
            orphans.dedup();
            for p in orphans {
                if self.is_active(ElementClass::Point, p) && self.point_is_unused(p) {
                    self.kill_point(p);
                }
            }
        }
        destroyed
    }

    /// Destroys the active primitives of `range` with their vertices; with
    /// `and_points`, also points left without vertices. Returns how many
    /// primitives were destroyed.
    pub fn destroy_primitive_offsets(&mut self, range: OffsetRange, and_points: bool) -> usize {
        let prims: Vec<Offset> = range.iter().collect();
        self.destroy_primitive_list(&prims, and_points)
    }

    pub fn destroy_primitive(&mut self, prim: Offset, and_points: bool) -> bool {
        self.destroy_primitive_list(&[prim], and_points) == 1
    }

    /// Destroys points of `range` (or every point) that no vertex uses.
    pub fn destroy_unused_points(&mut self, range: Option<OffsetRange>) -> usize {
        let map = self.index_map(ElementClass::Point);
        let candidates: Vec<Offset> = match range {
            Some(r) => r.iter().filter(|&p| map.is_active(p)).collect(),
            None => map.iter_offsets().collect(),
        };
        let unused: Vec<Offset> = if self.topology.tracks_point_vertices() {
            candidates
                .into_iter()
                .filter(|&p| self.point_is_unused(p))
                .collect()
        } else {
            let mut used = vec![false; map.offset_size()];
            for v in self.index_map(ElementClass::Vertex).iter_offsets() {
                if let Some(p) = self.topology.vertex_point(v).valid() {
                    if let Some(u) = used.get_mut(p.get()) {
                        *u = true;
                    }
                }
            }
            candidates.into_iter().filter(|p| !used[p.get()]).collect()
        };
        for &p in &unused {
            self.kill_point(p);
        }
        if !unused.is_empty() {
            self.meta_cache_count += 1;
        }
        unused.len()
    }

    /// Destroys the points of `range` under `mode`. Unless the caller
    /// guarantees that no vertex references them, every referencing
    /// primitive is asked first (see [`plan_point_destruction`]). Returns
    /// how many points were destroyed.
    ///
    /// [`plan_point_destruction`]: Self::plan_point_destruction
    pub fn destroy_point_offsets(
        &mut self,
        range: OffsetRange,
        mode: DestroyMode,
        guarantee_no_vertex_refs: bool,
    ) -> usize {
        let points: Vec<Offset> = range
            .iter()
            .filter(|&p| self.is_active(ElementClass::Point, p))
            .collect();
        if !guarantee_no_vertex_refs {
            let plan = self.plan_point_destruction(points.iter().copied(), mode);
            return self.apply_cascade(&plan);
        }
        let mut destroyed = 0;
        for p in points {
            if self.topology.tracks_point_vertices() && !self.point_is_unused(p) {
                debug_assert!(false, "point {p} still referenced");
                log::warn!("point {p} still referenced; not destroyed");
                continue;
            }
            self.kill_point(p);
            destroyed += 1;
        }
        if destroyed > 0 {
            self.meta_cache_count += 1;
        }
        destroyed
    }

    pub fn destroy_point(&mut self, p: Offset, mode: DestroyMode) -> bool {
        self.destroy_point_offsets(OffsetRange::with_len(p, 1), mode, false) == 1
    }

    // ----- whole-detail operations -----

    fn clear_elements(&mut self) {
        for class in [ElementClass::Point, ElementClass::Vertex, ElementClass::Primitive] {
            let slot = class.slot();
            self.index_maps[slot].clear();
            self.attributes[slot].resize(0);
            for g in self.groups[slot].iter_mut() {
                g.resize(0);
            }
        }
        self.topology.clear();
        self.meta_cache_count += 1;
    }

    /// Drops every point, vertex and primitive. Attribute and group
    /// definitions and the global record stay.
    pub fn clear(&mut self) {
        self.primitives.clear();
        self.clear_elements();
    }

    /// Clears the detail but keeps the primitive storage aside; rebuilding
    /// the same primitive shape reuses it.
    pub fn stash_all(&mut self) {
        self.primitives.stash_all();
        self.clear_elements();
    }

    /// Frees primitive storage the last rebuild did not reclaim.
    pub fn destroy_stashed(&mut self) -> usize {
        self.primitives.destroy_stashed()
    }

    /// Marks everything as changed.
    pub fn bump_all_data_ids(&mut self) {
        for m in &mut self.index_maps {
            m.bump_data_id();
        }
        self.topology.bump(Touched::all());
        self.primitives.bump_data_id();
        for dict in &mut self.attributes {
            for (_, a) in dict.iter_mut() {
                a.bump_data_id();
            }
        }
        for dict in &mut self.groups {
            for g in dict.iter_mut() {
                g.bump_data_id();
            }
        }
        self.meta_cache_count += 1;
    }
}

impl InvalidateCache for Detail {
    fn invalidate_cache(&mut self) {
        self.primitives.invalidate_cache();
        for dict in &mut self.groups {
            for g in dict.iter_mut() {
                g.invalidate_cache();
            }
        }
    }
}
