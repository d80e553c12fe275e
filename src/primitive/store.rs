//! PrimitiveStore: per-primitive payload in paged, compressed form.
//!
//! Primitives live in fixed-size pages indexed by offset. A page whose
//! primitives all share one shape (type, vertex count, closed flag) and own
//! consecutive vertex runs is stored as a single `Uniform` record; anything
//! else is `Explicit`, one optional entry per slot. Even explicit entries
//! keep contiguous vertex runs as a `(start, len)` pair and only allocate a
//! list once a vertex is edited.
//!
//! Code needing type-specific behaviour asks for the *hardened* form, one
//! [`HardenedPrimitive`] per slot, computed once behind a `OnceCell` so that
//! concurrent first readers share a single pass. Every mutation drops it.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::config::PrimitiveStoreOptions;
use crate::data::version::{DataId, VersionCounter};
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshDetailError;
use crate::primitive::kind::{
    HardenedPrimitive, PrimitiveKind, PrimitiveTypeDef, PrimitiveTypeId, PrimitiveTypeRegistry,
};
use crate::primitive::tracker::PrimitiveTracker;
use crate::topology::cache::InvalidateCache;
use crate::topology::hedge::PrimitiveBoundary;
use crate::topology::index_map::OffsetRemap;
use crate::topology::offset::Offset;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Vertices owned by one primitive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VertexList {
    /// `len` consecutive vertex offsets from `start`.
    Trivial { start: Offset, len: usize },
    List(Vec<Offset>),
}

impl VertexList {
    pub fn empty() -> Self {
        VertexList::Trivial {
            start: Offset::INVALID,
            len: 0,
        }
    }

    pub fn as_ref(&self) -> VertexListRef<'_> {
        match self {
            VertexList::Trivial { start, len } => VertexListRef::Trivial {
                start: *start,
                len: *len,
            },
            VertexList::List(v) => VertexListRef::Slice(v),
        }
    }

    fn make_list(&mut self) -> &mut Vec<Offset> {
        if let VertexList::Trivial { .. } = self {
            *self = VertexList::List(self.as_ref().to_vec());
        }
        match self {
            VertexList::List(v) => v,
            VertexList::Trivial { .. } => unreachable!("converted above"),
        }
    }

    fn remap(&mut self, remap: &OffsetRemap) {
        match self {
            VertexList::Trivial { start, len } => {
                if *len > 0 {
                    debug_assert!(
                        remap.map(start.add(*len - 1)) == remap.map(*start).add(*len - 1),
                        "vertex run split by compaction"
                    );
                    *start = remap.map(*start);
                }
            }
            VertexList::List(v) => {
                for o in v.iter_mut() {
                    *o = remap.map(*o);
                }
            }
        }
    }
}

/// Borrowed vertex list with O(1) access in either representation.
#[derive(Clone, Copy, Debug)]
pub enum VertexListRef<'a> {
    Trivial { start: Offset, len: usize },
    Slice(&'a [Offset]),
}

impl<'a> VertexListRef<'a> {
    pub const EMPTY: VertexListRef<'static> = VertexListRef::Slice(&[]);

    #[inline]
    pub fn len(&self) -> usize {
        match self {
            VertexListRef::Trivial { len, .. } => *len,
            VertexListRef::Slice(s) => s.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vertex at position `i`; `INVALID` past the end.
    #[inline]
    pub fn get(&self, i: usize) -> Offset {
        match self {
            VertexListRef::Trivial { start, len } if i < *len => start.add(i),
            VertexListRef::Slice(s) => s.get(i).copied().unwrap_or(Offset::INVALID),
            _ => Offset::INVALID,
        }
    }

    /// Position of `v`; O(1) for trivial runs.
    pub fn position(&self, v: Offset) -> Option<usize> {
        match self {
            VertexListRef::Trivial { start, len } => {
                let i = v.raw() - start.raw();
                (v.is_valid() && i >= 0 && (i as usize) < *len).then_some(i as usize)
            }
            VertexListRef::Slice(s) => s.iter().position(|&x| x == v),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Offset> + use<'a> {
        let this = *self;
        (0..this.len()).map(move |i| this.get(i))
    }

    pub fn to_vec(&self) -> Vec<Offset> {
        self.iter().collect()
    }
}

impl PartialEq for VertexListRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

/// Read-only view of one primitive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrimitiveRef<'a> {
    pub offset: Offset,
    pub type_id: PrimitiveTypeId,
    pub closed: bool,
    pub vertices: VertexListRef<'a>,
}

/// How a new block of primitives claims its (already reserved) vertices.
#[derive(Clone, Copy, Debug)]
pub enum BlockVertices<'a> {
    /// No vertices at all.
    None,
    /// Primitive `i` owns `[start + i * per_primitive, start + (i + 1) * per_primitive)`.
    Uniform { start: Offset, per_primitive: usize },
    /// Primitive `i` owns the next `counts[i]` vertices, starting at `start`.
    Counts { start: Offset, counts: &'a [usize] },
}

impl BlockVertices<'_> {
    fn count(&self, i: usize) -> usize {
        match self {
            BlockVertices::None => 0,
            BlockVertices::Uniform { per_primitive, .. } => *per_primitive,
            BlockVertices::Counts { counts, .. } => counts[i],
        }
    }

    /// Total vertices the block covers for `n` primitives.
    pub fn total(&self, n: usize) -> usize {
        match self {
            BlockVertices::None => 0,
            BlockVertices::Uniform { per_primitive, .. } => per_primitive * n,
            BlockVertices::Counts { counts, .. } => counts.iter().sum(),
        }
    }

    fn start(&self) -> Offset {
        match self {
            BlockVertices::None => Offset::INVALID,
            BlockVertices::Uniform { start, .. } | BlockVertices::Counts { start, .. } => *start,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Shape {
    type_id: PrimitiveTypeId,
    vertex_count: usize,
    closed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct PrimEntry {
    type_id: PrimitiveTypeId,
    closed: bool,
    vertices: VertexList,
}

impl PrimEntry {
    fn shape(&self) -> Shape {
        Shape {
            type_id: self.type_id,
            vertex_count: self.vertices.as_ref().len(),
            closed: self.closed,
        }
    }

    fn view(&self, offset: Offset) -> PrimitiveRef<'_> {
        PrimitiveRef {
            offset,
            type_id: self.type_id,
            closed: self.closed,
            vertices: self.vertices.as_ref(),
        }
    }
}

#[derive(Clone, Debug)]
enum Page {
    Empty,
    /// Slots `[0, len)` share `shape`; slot `i` owns the run starting at
    /// `first_vertex + i * shape.vertex_count`.
    Uniform {
        shape: Shape,
        first_vertex: Offset,
        len: usize,
    },
    Explicit(Vec<Option<PrimEntry>>),
}

impl Page {
    fn view(&self, local: usize, offset: Offset) -> Option<PrimitiveRef<'_>> {
        match self {
            Page::Empty => None,
            Page::Uniform {
                shape,
                first_vertex,
                len,
            } => (local < *len).then(|| PrimitiveRef {
                offset,
                type_id: shape.type_id,
                closed: shape.closed,
                vertices: VertexListRef::Trivial {
                    start: uniform_start(*first_vertex, shape.vertex_count, local),
                    len: shape.vertex_count,
                },
            }),
            Page::Explicit(slots) => slots
                .get(local)
                .and_then(Option::as_ref)
                .map(|e| e.view(offset)),
        }
    }

    /// Removes and returns slot `local` without exploding the page.
    fn take(&mut self, local: usize) -> Option<PrimEntry> {
        match self {
            Page::Empty => None,
            Page::Uniform {
                shape,
                first_vertex,
                len,
            } => {
                if local >= *len {
                    return None;
                }
                let entry = PrimEntry {
                    type_id: shape.type_id,
                    closed: shape.closed,
                    vertices: VertexList::Trivial {
                        start: uniform_start(*first_vertex, shape.vertex_count, local),
                        len: shape.vertex_count,
                    },
                };
                self.explode()[local] = None;
                Some(entry)
            }
            Page::Explicit(slots) => slots.get_mut(local).and_then(Option::take),
        }
    }

    /// Converts to the explicit form and returns its slots.
    fn explode(&mut self) -> &mut Vec<Option<PrimEntry>> {
        match self {
            Page::Empty => *self = Page::Explicit(Vec::new()),
            Page::Uniform {
                shape,
                first_vertex,
                len,
            } => {
                let slots = (0..*len)
                    .map(|i| {
                        Some(PrimEntry {
                            type_id: shape.type_id,
                            closed: shape.closed,
                            vertices: VertexList::Trivial {
                                start: uniform_start(*first_vertex, shape.vertex_count, i),
                                len: shape.vertex_count,
                            },
                        })
                    })
                    .collect();
                *self = Page::Explicit(slots);
            }
            Page::Explicit(_) => {}
        }
        match self {
            Page::Explicit(slots) => slots,
            _ => unreachable!("exploded above"),
        }
    }

    /// Appends `entry` at `local` to a uniform run when it continues it.
    fn try_extend(&mut self, local: usize, entry: &PrimEntry) -> bool {
        let VertexList::Trivial { start, .. } = entry.vertices else {
            return false;
        };
        match self {
            Page::Empty if local == 0 => {
                *self = Page::Uniform {
                    shape: entry.shape(),
                    first_vertex: start,
                    len: 1,
                };
                true
            }
            Page::Uniform {
                shape,
                first_vertex,
                len,
            } if *len == local
                && *shape == entry.shape()
                && start == uniform_start(*first_vertex, shape.vertex_count, local) =>
            {
                *len += 1;
                true
            }
            _ => false,
        }
    }
}

#[inline]
fn uniform_start(first: Offset, count: usize, i: usize) -> Offset {
    if count == 0 {
        Offset::INVALID
    } else {
        first.add(i * count)
    }
}

/// Page occupancy, for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageStats {
    pub empty: usize,
    pub uniform: usize,
    pub explicit: usize,
}

#[derive(Clone, Debug)]
struct Stash {
    pages: Vec<Page>,
    size: usize,
    tracker: PrimitiveTracker,
}

/// Payload of every primitive of a detail.
#[derive(Clone, Debug)]
pub struct PrimitiveStore {
    registry: Arc<PrimitiveTypeRegistry>,
    page_bits: u32,
    stash_limit: usize,
    size: usize,
    pages: Vec<Page>,
    tracker: PrimitiveTracker,
    stash: Option<Stash>,
    hardened: OnceCell<Vec<Option<HardenedPrimitive>>>,
    version: VersionCounter,
}

impl PrimitiveStore {
    pub fn new(registry: Arc<PrimitiveTypeRegistry>, options: &PrimitiveStoreOptions) -> Self {
        PrimitiveStore {
            registry,
            page_bits: options.page_bits,
            stash_limit: options.stash_limit,
            size: 0,
            pages: Vec::new(),
            tracker: PrimitiveTracker::new(),
            stash: None,
            hardened: OnceCell::new(),
            version: VersionCounter::new(),
        }
    }

    pub fn registry(&self) -> &Arc<PrimitiveTypeRegistry> {
        &self.registry
    }

    #[inline]
    fn page_size(&self) -> usize {
        1 << self.page_bits
    }

    #[inline]
    fn locate(&self, prim: Offset) -> (usize, usize) {
        let o = prim.get();
        (o >> self.page_bits, o & (self.page_size() - 1))
    }

    /// Slots covered, active or not.
    pub fn offset_size(&self) -> usize {
        self.size
    }

    /// Active primitives.
    pub fn len(&self) -> usize {
        self.tracker.total()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tracker(&self) -> &PrimitiveTracker {
        &self.tracker
    }

    pub fn data_id(&self) -> DataId {
        self.version.get()
    }

    pub fn bump_data_id(&mut self) {
        self.version.bump();
    }

    /// Becomes a copy of `src`, never lowering the data id. The stash is
    /// kept.
    pub(crate) fn replace_from(&mut self, src: &PrimitiveStore) {
        let version = self.version.clone();
        let stash = self.stash.take();
        *self = src.clone();
        self.stash = stash;
        self.version = version;
        self.version.adopt(src.data_id());
    }

    fn changed(&mut self) {
        self.hardened.take();
        self.version.bump();
    }

    /// Covers `[0, new_size)`; shrinking drops the primitives beyond.
    pub fn resize(&mut self, new_size: usize) {
        if new_size < self.size {
            for o in new_size..self.size {
                if let Some(e) = self.take_entry(Offset::new(o)) {
                    self.tracker.remove(e.type_id, 1);
                }
            }
        }
        if new_size != self.size {
            self.changed();
        }
        self.size = new_size;
        let pages = new_size.div_ceil(self.page_size());
        self.pages.resize_with(pages, || Page::Empty);
    }

    // ----- O(1) reads -----

    pub fn get(&self, prim: Offset) -> Option<PrimitiveRef<'_>> {
        if !prim.is_valid() || prim.get() >= self.size {
            return None;
        }
        let (p, l) = self.locate(prim);
        self.pages.get(p)?.view(l, prim)
    }

    #[inline]
    pub fn contains(&self, prim: Offset) -> bool {
        self.get(prim).is_some()
    }

    pub fn type_id(&self, prim: Offset) -> Option<PrimitiveTypeId> {
        self.get(prim).map(|p| p.type_id)
    }

    pub fn type_def(&self, prim: Offset) -> Option<&PrimitiveTypeDef> {
        self.type_id(prim).and_then(|t| self.registry.get(t))
    }

    pub fn vertex_list(&self, prim: Offset) -> VertexListRef<'_> {
        self.get(prim).map_or(VertexListRef::EMPTY, |p| p.vertices)
    }

    pub fn vertex_count(&self, prim: Offset) -> usize {
        self.vertex_list(prim).len()
    }

    pub fn is_closed(&self, prim: Offset) -> bool {
        self.get(prim).is_some_and(|p| p.closed)
    }

    /// Every active primitive in offset order.
    pub fn iter(&self) -> impl Iterator<Item = PrimitiveRef<'_>> + '_ {
        (0..self.size).filter_map(move |o| self.get(Offset::new(o)))
    }

    pub fn page_stats(&self) -> PageStats {
        let mut s = PageStats::default();
        for p in &self.pages {
            match p {
                Page::Empty => s.empty += 1,
                Page::Uniform { .. } => s.uniform += 1,
                Page::Explicit(_) => s.explicit += 1,
            }
        }
        s
    }

    // ----- slot plumbing -----

    fn place(&mut self, prim: Offset, entry: PrimEntry) {
        let (p, l) = self.locate(prim);
        let page = &mut self.pages[p];
        if page.try_extend(l, &entry) {
            return;
        }
        let slots = page.explode();
        if slots.len() <= l {
            slots.resize(l + 1, None);
        }
        slots[l] = Some(entry);
    }

    fn take_entry(&mut self, prim: Offset) -> Option<PrimEntry> {
        if !prim.is_valid() || prim.get() >= self.size {
            return None;
        }
        let (p, l) = self.locate(prim);
        self.pages.get_mut(p)?.take(l)
    }

    fn entry_mut(&mut self, prim: Offset) -> Option<&mut PrimEntry> {
        if !prim.is_valid() || prim.get() >= self.size {
            return None;
        }
        let (p, l) = self.locate(prim);
        self.pages
            .get_mut(p)?
            .explode()
            .get_mut(l)
            .and_then(Option::as_mut)
    }

    // ----- construction -----

    /// Checks that a block of `n` primitives of `type_id` could be created
    /// with `vertices`, without creating anything.
    pub fn check_block(
        &self,
        type_id: PrimitiveTypeId,
        n: usize,
        vertices: &BlockVertices<'_>,
    ) -> Result<(), MeshDetailError> {
        let def = self.registry.require(type_id)?;
        if let BlockVertices::Counts { counts, .. } = vertices {
            if counts.len() != n {
                return Err(MeshDetailError::SizeMismatch {
                    what: "vertex counts of a primitive block".into(),
                    expected: n,
                    found: counts.len(),
                });
            }
        }
        if let Some(fixed) = def.fixed_vertex_count {
            if let Some(bad) = (0..n).map(|i| vertices.count(i)).find(|&c| c != fixed) {
                return Err(MeshDetailError::SizeMismatch {
                    what: format!("vertices per {}", def.name),
                    expected: fixed,
                    found: bad,
                });
            }
        }
        Ok(())
    }

    /// Creates `n` primitives of `type_id` at `[at, at + n)`. Vertices must
    /// already be reserved; the caller wires their links afterwards.
    pub fn create_block(
        &mut self,
        type_id: PrimitiveTypeId,
        at: Offset,
        n: usize,
        vertices: BlockVertices<'_>,
    ) -> Result<(), MeshDetailError> {
        self.check_block(type_id, n, &vertices)?;
        let registry = Arc::clone(&self.registry);
        let def = registry.require(type_id)?;
        if n == 0 {
            return Ok(());
        }
        let end = at.get() + n;
        if end > self.size {
            self.resize(end);
        }
        if !self.reclaim_stash(def, at, n, &vertices) {
            let mut next = vertices.start();
            for i in 0..n {
                let count = vertices.count(i);
                let start = if count == 0 { Offset::INVALID } else { next };
                if count > 0 {
                    next = next.add(count);
                }
                self.place(
                    at.add(i),
                    PrimEntry {
                        type_id,
                        closed: def.closed_by_default,
                        vertices: VertexList::Trivial { start, len: count },
                    },
                );
            }
            self.tracker.add(type_id, n);
        }
        self.changed();
        Ok(())
    }

    /// Adopts the stashed pages when the new block rebuilds exactly what was
    /// stashed.
    fn reclaim_stash(
        &mut self,
        def: &PrimitiveTypeDef,
        at: Offset,
        n: usize,
        vertices: &BlockVertices<'_>,
    ) -> bool {
        let Some(stash) = self.stash.as_ref() else {
            return false;
        };
        if at.get() != 0 || stash.size != n || self.tracker.total() != 0 || self.size != n {
            return false;
        }
        if stash.tracker.count(def.id) != n {
            return false;
        }
        let bits = self.page_bits;
        let mask = (1usize << bits) - 1;
        let mut next = vertices.start();
        for i in 0..n {
            let count = vertices.count(i);
            let expect = PrimitiveRef {
                offset: Offset::new(i),
                type_id: def.id,
                closed: def.closed_by_default,
                vertices: VertexListRef::Trivial {
                    start: if count == 0 { Offset::INVALID } else { next },
                    len: count,
                },
            };
            next = next.add(count);
            let stored = stash.pages[i >> bits].view(i & mask, Offset::new(i));
            if stored != Some(expect) {
                return false;
            }
        }
        let Some(stash) = self.stash.take() else {
            return false;
        };
        log::debug!("reclaimed {n} stashed primitives");
        self.pages = stash.pages;
        self.tracker = stash.tracker;
        true
    }

    /// Removes `prim`, returning the vertices it owned. Does not bump the
    /// data id; callers destroying a batch bump once.
    pub(crate) fn take(&mut self, prim: Offset) -> Option<Vec<Offset>> {
        let entry = self.take_entry(prim)?;
        self.tracker.remove(entry.type_id, 1);
        self.hardened.take();
        Some(entry.vertices.as_ref().to_vec())
    }

    /// Destroys `prim`, returning the vertices it owned.
    pub fn destroy(&mut self, prim: Offset) -> Option<Vec<Offset>> {
        let verts = self.take(prim)?;
        self.version.bump();
        Some(verts)
    }

    // ----- editing -----

    fn editable(&self, prim: Offset) -> Option<&PrimitiveTypeDef> {
        let def = self.type_def(prim)?;
        if def.is_fixed_vertex_count() {
            log::warn!("{} {prim} has a fixed vertex count", def.name);
            return None;
        }
        Some(def)
    }

    /// Replaces the vertex list of `prim`.
    pub fn set_vertex_list(&mut self, prim: Offset, vertices: Vec<Offset>) -> bool {
        let Some(def) = self.type_def(prim) else {
            return false;
        };
        if def.fixed_vertex_count.is_some_and(|n| n != vertices.len()) {
            log::warn!("{} {prim} needs {:?} vertices", def.name, def.fixed_vertex_count);
            return false;
        }
        let Some(e) = self.entry_mut(prim) else {
            return false;
        };
        e.vertices = VertexList::List(vertices);
        self.changed();
        true
    }

    pub fn append_vertex(&mut self, prim: Offset, v: Offset) -> bool {
        let n = self.vertex_count(prim);
        self.insert_vertex(prim, n, v)
    }

    /// Inserts `v` at position `i` (clamped to the end).
    pub fn insert_vertex(&mut self, prim: Offset, i: usize, v: Offset) -> bool {
        if self.editable(prim).is_none() {
            return false;
        }
        let Some(e) = self.entry_mut(prim) else {
            return false;
        };
        let list = e.vertices.make_list();
        let i = i.min(list.len());
        list.insert(i, v);
        self.changed();
        true
    }

    /// Removes the vertex at position `i`, returning it.
    pub fn remove_vertex_at(&mut self, prim: Offset, i: usize) -> Offset {
        if self.editable(prim).is_none() || i >= self.vertex_count(prim) {
            return Offset::INVALID;
        }
        let Some(e) = self.entry_mut(prim) else {
            return Offset::INVALID;
        };
        let v = e.vertices.make_list().remove(i);
        self.changed();
        v
    }

    /// Removes `v` wherever it sits in `prim`, returning its old position.
    pub fn remove_vertex(&mut self, prim: Offset, v: Offset) -> Option<usize> {
        let i = self.vertex_list(prim).position(v)?;
        self.remove_vertex_at(prim, i).is_valid().then_some(i)
    }

    /// Drops a vertex regardless of fixed vertex counts. Used when the
    /// vertex itself is being destroyed.
    pub(crate) fn forget_vertex(&mut self, prim: Offset, v: Offset) -> Option<usize> {
        let i = self.vertex_list(prim).position(v)?;
        let e = self.entry_mut(prim)?;
        e.vertices.make_list().remove(i);
        self.changed();
        Some(i)
    }

    pub fn set_closed(&mut self, prim: Offset, closed: bool) -> bool {
        match self.entry_mut(prim) {
            Some(e) if e.closed != closed => {
                e.closed = closed;
                self.changed();
                true
            }
            _ => false,
        }
    }

    /// Changes the type of `prim`, keeping its vertices.
    pub fn set_type(&mut self, prim: Offset, type_id: PrimitiveTypeId) -> Result<bool, MeshDetailError> {
        let def = self.registry.require(type_id)?;
        let count = self.vertex_count(prim);
        if let Some(fixed) = def.fixed_vertex_count.filter(|&f| f != count) {
            return Err(MeshDetailError::SizeMismatch {
                what: format!("vertices per {}", def.name),
                expected: fixed,
                found: count,
            });
        }
        let Some(e) = self.entry_mut(prim) else {
            return Ok(false);
        };
        let old = e.type_id;
        if old == type_id {
            return Ok(false);
        }
        e.type_id = type_id;
        self.tracker.change(old, type_id);
        self.changed();
        Ok(true)
    }

    // ----- defragmentation -----

    /// Rewrites vertex offsets after the vertex class was compacted.
    pub fn remap_vertices(&mut self, remap: &OffsetRemap) {
        if remap.is_identity() {
            return;
        }
        for page in &mut self.pages {
            match page {
                Page::Empty => {}
                Page::Uniform {
                    shape, first_vertex, ..
                } => {
                    if shape.vertex_count > 0 {
                        *first_vertex = remap.map(*first_vertex);
                    }
                }
                Page::Explicit(slots) => {
                    for e in slots.iter_mut().flatten() {
                        e.vertices.remap(remap);
                    }
                }
            }
        }
        self.changed();
    }

    /// Moves every primitive to its new offset after the primitive class
    /// was compacted. Uniform runs are re-coalesced on the way.
    pub fn remap(&mut self, remap: &OffsetRemap) {
        let mut old_pages = std::mem::take(&mut self.pages);
        let bits = self.page_bits;
        let mask = self.page_size() - 1;
        self.size = 0;
        self.resize(remap.new_size());
        for (old, new) in remap.pairs() {
            let o = old.get();
            if let Some(entry) = old_pages.get_mut(o >> bits).and_then(|p| p.take(o & mask)) {
                self.place(new, entry);
            }
        }
        self.changed();
    }

    /// Drops every primitive and the stash.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.size = 0;
        self.tracker.clear();
        self.stash = None;
        self.changed();
    }

    // ----- stashing -----

    /// Moves every primitive aside without freeing it. A following
    /// [`create_block`](Self::create_block) rebuilding the same shape
    /// reclaims the storage; [`destroy_stashed`](Self::destroy_stashed)
    /// frees it.
    pub fn stash_all(&mut self) {
        let count = self.tracker.total();
        if count > self.stash_limit {
            log::debug!(
                "{count} primitives exceed the stash limit {}; freeing",
                self.stash_limit
            );
            self.clear();
            return;
        }
        let pages = std::mem::take(&mut self.pages);
        let tracker = std::mem::take(&mut self.tracker);
        self.stash = Some(Stash {
            pages,
            size: self.size,
            tracker,
        });
        self.size = 0;
        log::debug!("stashed {count} primitives");
        self.changed();
    }

    /// Frees whatever the last stash left unreclaimed; returns how many
    /// primitives that was.
    pub fn destroy_stashed(&mut self) -> usize {
        let freed = self.stash.take().map_or(0, |s| s.tracker.total());
        if freed > 0 {
            log::debug!("destroyed {freed} stashed primitives");
        }
        freed
    }

    pub fn stashed_len(&self) -> usize {
        self.stash.as_ref().map_or(0, |s| s.tracker.total())
    }

    // ----- hardening -----

    /// Per-slot hardened records, built at most once until the next change.
    pub fn hardened(&self) -> &[Option<HardenedPrimitive>] {
        self.hardened.get_or_init(|| self.harden_all())
    }

    pub fn hardened_primitive(&self, prim: Offset) -> Option<&HardenedPrimitive> {
        prim.valid()
            .and_then(|p| self.hardened().get(p.get()))
            .and_then(Option::as_ref)
    }

    pub fn is_hardened(&self) -> bool {
        self.hardened.get().is_some()
    }

    fn harden_one(&self, o: usize) -> Option<HardenedPrimitive> {
        let p = self.get(Offset::new(o))?;
        let def = self.registry.get(p.type_id)?;
        Some(HardenedPrimitive {
            offset: p.offset,
            kind: PrimitiveKind::for_type(def),
            closed: p.closed,
            vertices: p.vertices.to_vec(),
        })
    }

    #[cfg(feature = "rayon")]
    fn harden_all(&self) -> Vec<Option<HardenedPrimitive>> {
        log::debug!("hardening {} primitives in parallel", self.len());
        (0..self.size)
            .into_par_iter()
            .map(|o| self.harden_one(o))
            .collect()
    }

    #[cfg(not(feature = "rayon"))]
    fn harden_all(&self) -> Vec<Option<HardenedPrimitive>> {
        log::debug!("hardening {} primitives", self.len());
        (0..self.size).map(|o| self.harden_one(o)).collect()
    }

    /// Recounts the tracker from the pages.
    pub fn recount(&self) -> PrimitiveTracker {
        let mut t = PrimitiveTracker::new();
        for p in self.iter() {
            t.add(p.type_id, 1);
        }
        t
    }
}

impl PrimitiveBoundary for PrimitiveStore {
    fn hedge_head(&self, prim: Offset, vtx: Offset) -> Offset {
        let Some(p) = self.get(prim) else {
            return Offset::INVALID;
        };
        if !self.registry.get(p.type_id).is_some_and(|d| d.supports_half_edges) {
            return Offset::INVALID;
        }
        let Some(i) = p.vertices.position(vtx) else {
            return Offset::INVALID;
        };
        let n = p.vertices.len();
        if i + 1 < n {
            p.vertices.get(i + 1)
        } else if p.closed {
            p.vertices.get(0)
        } else {
            Offset::INVALID
        }
    }

    fn hedge_tail_into(&self, prim: Offset, vtx: Offset) -> Offset {
        let Some(p) = self.get(prim) else {
            return Offset::INVALID;
        };
        if !self.registry.get(p.type_id).is_some_and(|d| d.supports_half_edges) {
            return Offset::INVALID;
        }
        let Some(i) = p.vertices.position(vtx) else {
            return Offset::INVALID;
        };
        if i > 0 {
            p.vertices.get(i - 1)
        } else if p.closed {
            p.vertices.get(p.vertices.len() - 1)
        } else {
            Offset::INVALID
        }
    }
}

impl InvalidateCache for PrimitiveStore {
    fn invalidate_cache(&mut self) {
        self.hardened.take();
    }
}

impl DebugInvariants for PrimitiveStore {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "PrimitiveStore invalid");
    }

    fn validate_invariants(&self) -> Result<(), MeshDetailError> {
        let pages = self.size.div_ceil(self.page_size());
        if self.pages.len() != pages {
            return Err(MeshDetailError::SizeMismatch {
                what: "primitive pages".into(),
                expected: pages,
                found: self.pages.len(),
            });
        }
        for p in self.iter() {
            let def = self.registry.require(p.type_id)?;
            if let Some(fixed) = def.fixed_vertex_count {
                if p.vertices.len() != fixed {
                    return Err(MeshDetailError::SizeMismatch {
                        what: format!("vertices of {} {}", def.name, p.offset),
                        expected: fixed,
                        found: p.vertices.len(),
                    });
                }
            }
        }
        let recount = self.recount();
        for id in recount.types().into_iter().chain(self.tracker.types()) {
            if recount.count(id) != self.tracker.count(id) {
                return Err(MeshDetailError::TrackerMismatch {
                    type_id: id,
                    expected: recount.count(id),
                    found: self.tracker.count(id),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::offset::ElementClass;

    fn o(i: usize) -> Offset {
        Offset::new(i)
    }

    fn store() -> PrimitiveStore {
        let options = PrimitiveStoreOptions {
            page_bits: 4,
            ..Default::default()
        };
        PrimitiveStore::new(Arc::new(PrimitiveTypeRegistry::with_builtins()), &options)
    }

    fn triangles(s: &mut PrimitiveStore, n: usize) {
        s.create_block(
            PrimitiveTypeId::POLYGON,
            o(0),
            n,
            BlockVertices::Uniform {
                start: o(0),
                per_primitive: 3,
            },
        )
        .unwrap();
    }

    #[test]
    fn uniform_block_stays_compressed() {
        let mut s = store();
        triangles(&mut s, 40);
        assert_eq!(s.len(), 40);
        assert_eq!(
            s.page_stats(),
            PageStats {
                empty: 0,
                uniform: 3,
                explicit: 0
            }
        );
        assert_eq!(s.vertex_list(o(17)).to_vec(), vec![o(51), o(52), o(53)]);
        assert!(s.is_closed(o(17)));
        assert_eq!(s.tracker().count(PrimitiveTypeId::POLYGON), 40);
        s.validate_invariants().unwrap();
    }

    #[test]
    fn varying_counts_and_edits_explode_one_page() {
        let mut s = store();
        s.create_block(
            PrimitiveTypeId::POLYLINE,
            o(0),
            3,
            BlockVertices::Counts {
                start: o(0),
                counts: &[2, 2, 5],
            },
        )
        .unwrap();
        assert_eq!(s.page_stats().explicit, 1);
        assert_eq!(s.vertex_list(o(2)).to_vec(), (4..9).map(o).collect::<Vec<_>>());
        assert!(s.append_vertex(o(0), o(42)));
        assert_eq!(s.vertex_list(o(0)).to_vec(), vec![o(0), o(1), o(42)]);
        assert_eq!(s.remove_vertex(o(0), o(1)), Some(1));
        assert_eq!(s.vertex_list(o(0)).position(o(42)), Some(1));
    }

    #[test]
    fn fixed_types_reject_wrong_counts_and_edits() {
        let mut s = store();
        let err = s.create_block(
            PrimitiveTypeId::TETRAHEDRON,
            o(0),
            1,
            BlockVertices::Uniform {
                start: o(0),
                per_primitive: 3,
            },
        );
        assert!(matches!(err, Err(MeshDetailError::SizeMismatch { .. })));
        s.create_block(
            PrimitiveTypeId::TETRAHEDRON,
            o(0),
            1,
            BlockVertices::Uniform {
                start: o(0),
                per_primitive: 4,
            },
        )
        .unwrap();
        assert!(!s.append_vertex(o(0), o(9)));
        assert_eq!(s.vertex_count(o(0)), 4);
    }

    #[test]
    fn destroy_then_remap_compacts_and_recoalesces() {
        let mut s = store();
        triangles(&mut s, 20);
        let id = s.data_id();
        assert_eq!(s.destroy(o(3)), Some(vec![o(9), o(10), o(11)]));
        assert!(s.data_id() > id);
        assert!(!s.contains(o(3)));
        assert_eq!(s.destroy(o(3)), None);

        let remap = OffsetRemap::compacting(ElementClass::Primitive, 20, |i| i != 3);
        s.remap(&remap);
        assert_eq!(s.offset_size(), 19);
        assert_eq!(s.vertex_list(o(3)).to_vec(), vec![o(12), o(13), o(14)]);
        s.validate_invariants().unwrap();

        // compact the vertices too: the run becomes contiguous again
        let vremap = OffsetRemap::compacting(ElementClass::Vertex, 60, |i| !(9..12).contains(&i));
        s.remap_vertices(&vremap);
        assert_eq!(s.vertex_list(o(3)).to_vec(), vec![o(9), o(10), o(11)]);
    }

    #[test]
    fn hardening_is_cached_until_change() {
        let mut s = store();
        triangles(&mut s, 2);
        assert!(!s.is_hardened());
        let h = s.hardened_primitive(o(1)).unwrap();
        assert_eq!(h.vertices, vec![o(3), o(4), o(5)]);
        assert_eq!(h.edge_count(), 3);
        assert!(s.is_hardened());
        s.set_closed(o(1), false);
        assert!(!s.is_hardened());
        assert!(!s.hardened_primitive(o(1)).unwrap().closed);
    }

    #[test]
    fn stash_is_reclaimed_by_identical_rebuild() {
        let mut s = store();
        triangles(&mut s, 10);
        s.stash_all();
        assert_eq!(s.len(), 0);
        assert_eq!(s.stashed_len(), 10);
        triangles(&mut s, 10);
        assert_eq!(s.stashed_len(), 0);
        assert_eq!(s.len(), 10);
        assert_eq!(s.destroy_stashed(), 0);
        s.validate_invariants().unwrap();
    }

    #[test]
    fn stash_with_different_shape_is_freed() {
        let mut s = store();
        triangles(&mut s, 10);
        s.stash_all();
        triangles(&mut s, 4);
        assert_eq!(s.stashed_len(), 10);
        assert_eq!(s.destroy_stashed(), 10);
        assert_eq!(s.len(), 4);
    }

    #[test]
    fn set_type_moves_tracker_counts() {
        let mut s = store();
        triangles(&mut s, 2);
        assert!(s.set_type(o(0), PrimitiveTypeId::POLYLINE).unwrap());
        assert_eq!(s.tracker().count(PrimitiveTypeId::POLYLINE), 1);
        assert!(s.set_type(o(0), PrimitiveTypeId::SPHERE).is_err());
        s.validate_invariants().unwrap();
    }

    #[test]
    fn boundary_wraps_only_when_closed() {
        let mut s = store();
        s.create_block(
            PrimitiveTypeId::POLYLINE,
            o(0),
            1,
            BlockVertices::Uniform {
                start: o(0),
                per_primitive: 3,
            },
        )
        .unwrap();
        assert_eq!(s.hedge_head(o(0), o(1)), o(2));
        assert_eq!(s.hedge_head(o(0), o(2)), Offset::INVALID);
        assert_eq!(s.hedge_tail_into(o(0), o(0)), Offset::INVALID);
        s.set_closed(o(0), true);
        assert_eq!(s.hedge_head(o(0), o(2)), o(0));
        assert_eq!(s.hedge_tail_into(o(0), o(0)), o(2));
    }
}
