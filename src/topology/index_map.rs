//! IndexMap: offset ⇄ index bookkeeping for one element class.
//!
//! The map hands out storage slots ([`Offset`]s) in contiguous blocks and
//! keeps the dense traversal order ([`Index`]) of the active ones. While no
//! element has ever been destroyed or reordered the map is *trivial*: index
//! and offset coincide and no arrays are allocated. The first destroy or
//! reorder materializes both directions.
//!
//! Destroying leaves holes in both the offset and index spaces. Indices of
//! later elements do not shift until [`IndexMap::defragment`] runs, so a
//! caller iterating a marker range stays valid while later elements are
//! removed. Vacant offsets are never reused implicitly: new blocks always
//! extend the offset space.

use crate::data::group::GroupMembership;
use crate::data::version::{DataId, VersionCounter};
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshDetailError;
use crate::topology::offset::{ElementClass, Index, Offset, OffsetRange};

/// Old → new offset table produced by offset compaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OffsetRemap {
    class: ElementClass,
    old_to_new: Vec<Offset>,
    new_size: usize,
}

impl OffsetRemap {
    /// Builds a remap that packs the `active` offsets of `[0, old_size)` in
    /// ascending order.
    pub fn compacting(
        class: ElementClass,
        old_size: usize,
        mut active: impl FnMut(usize) -> bool,
    ) -> Self {
        let mut old_to_new = Vec::with_capacity(old_size);
        let mut next = 0usize;
        for old in 0..old_size {
            if active(old) {
                old_to_new.push(Offset::new(next));
                next += 1;
            } else {
                old_to_new.push(Offset::INVALID);
            }
        }
        OffsetRemap {
            class,
            old_to_new,
            new_size: next,
        }
    }

    #[inline]
    pub fn class(&self) -> ElementClass {
        self.class
    }

    /// New offset of `old`; `INVALID` for vacant or out-of-range input.
    #[inline]
    pub fn map(&self, old: Offset) -> Offset {
        if !old.is_valid() {
            return Offset::INVALID;
        }
        self.old_to_new
            .get(old.get())
            .copied()
            .unwrap_or(Offset::INVALID)
    }

    #[inline]
    pub fn old_size(&self) -> usize {
        self.old_to_new.len()
    }

    #[inline]
    pub fn new_size(&self) -> usize {
        self.new_size
    }

    /// `(old, new)` for every surviving offset, ascending.
    pub fn pairs(&self) -> impl Iterator<Item = (Offset, Offset)> + '_ {
        self.old_to_new
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_valid())
            .map(|(o, &n)| (Offset::new(o), n))
    }

    /// True when no surviving offset moves and nothing is dropped.
    pub fn is_identity(&self) -> bool {
        self.new_size == self.old_to_new.len()
            && self
                .old_to_new
                .iter()
                .enumerate()
                .all(|(o, n)| n.raw() == o as i64)
    }

    /// Moves the surviving entries of a per-offset vector into their new slots.
    pub fn apply_to_vec<T: Clone>(&self, values: &mut Vec<T>, fill: T) {
        let mut out = vec![fill; self.new_size];
        for (old, new) in self.pairs() {
            if let Some(v) = values.get(old.get()) {
                out[new.get()] = v.clone();
            }
        }
        *values = out;
    }
}

/// What [`IndexMap::defragment`] changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DefragmentOutcome {
    /// Index holes were squeezed out.
    pub indices_moved: bool,
    /// Offsets were compacted; every dependent structure must apply this.
    pub remap: Option<OffsetRemap>,
}

impl DefragmentOutcome {
    pub fn moved(&self) -> bool {
        self.indices_moved || self.remap.is_some()
    }
}

/// Mutation-tolerant forward traversal over active offsets.
///
/// The cursor re-reads the class size on every step, so elements appended
/// while traversing are visited too. Destroying elements *before* the
/// cursor is harmless; destroying them after it simply skips them.
#[derive(Clone, Copy, Debug, Default)]
pub struct OffsetCursor {
    next: usize,
}

impl OffsetCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_offset(&mut self, map: &IndexMap) -> Option<Offset> {
        while self.next < map.offset_size() {
            let off = Offset::new(self.next);
            self.next += 1;
            if map.is_active(off) {
                return Some(off);
            }
        }
        None
    }
}

/// Offset/index bookkeeping for one element class.
#[derive(Clone, Debug)]
pub struct IndexMap {
    class: ElementClass,
    offset_size: usize,
    active: usize,
    /// `None` while trivial; otherwise one entry per offset, `INVALID` if vacant.
    index_from_offset: Option<Vec<Index>>,
    /// `None` while trivial; otherwise one entry per index, `INVALID` for index holes.
    offset_from_index: Option<Vec<Offset>>,
    version: VersionCounter,
}

impl IndexMap {
    pub fn new(class: ElementClass) -> Self {
        IndexMap {
            class,
            offset_size: 0,
            active: 0,
            index_from_offset: None,
            offset_from_index: None,
            version: VersionCounter::new(),
        }
    }

    #[inline]
    pub fn class(&self) -> ElementClass {
        self.class
    }

    /// Exclusive upper bound of offsets issued since the last compaction.
    #[inline]
    pub fn offset_size(&self) -> usize {
        self.offset_size
    }

    /// Exclusive upper bound of indices, including index holes.
    #[inline]
    pub fn index_size(&self) -> usize {
        match &self.offset_from_index {
            Some(v) => v.len(),
            None => self.offset_size,
        }
    }

    /// Number of active elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.active
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    /// Vacant offsets below [`offset_size`](Self::offset_size).
    #[inline]
    pub fn hole_count(&self) -> usize {
        self.offset_size - self.active
    }

    /// Identity map with no holes and no arrays.
    #[inline]
    pub fn is_trivial(&self) -> bool {
        self.index_from_offset.is_none()
    }

    #[inline]
    pub fn data_id(&self) -> DataId {
        self.version.get()
    }

    pub fn bump_data_id(&mut self) {
        self.version.bump();
    }

    /// Becomes a copy of `src`, taking its data id unless that would move
    /// this map's id backwards.
    pub(crate) fn replace_from(&mut self, src: &IndexMap) {
        let version = self.version.clone();
        *self = src.clone();
        self.version = version;
        self.version.adopt(src.data_id());
    }

    /// Offsets ever issued and still below the size bound.
    #[inline]
    pub fn offset_range(&self) -> OffsetRange {
        OffsetRange::with_len(Offset::new(0), self.offset_size)
    }

    /// Reserves `n` contiguous offsets at the end of the offset space.
    ///
    /// Returns the first new offset, or `INVALID` when `n == 0`.
    pub fn add_element_block(&mut self, n: usize) -> Offset {
        if n == 0 {
            return Offset::INVALID;
        }
        let start = self.offset_size;
        let first_index = self.index_size();
        self.offset_size += n;
        self.active += n;
        if let (Some(ifo), Some(ofi)) = (&mut self.index_from_offset, &mut self.offset_from_index)
        {
            ifo.extend((0..n).map(|i| Index::new(first_index + i)));
            ofi.extend((0..n).map(|i| Offset::new(start + i)));
        }
        self.version.bump();
        Offset::new(start)
    }

    #[inline]
    pub fn is_active(&self, off: Offset) -> bool {
        if !off.is_valid() || off.get() >= self.offset_size {
            return false;
        }
        match &self.index_from_offset {
            Some(ifo) => ifo[off.get()].is_valid(),
            None => true,
        }
    }

    /// True for offsets below the size bound that hold no element.
    #[inline]
    pub fn is_vacant(&self, off: Offset) -> bool {
        off.is_valid() && off.get() < self.offset_size && !self.is_active(off)
    }

    /// Index of an active offset; `INVALID` for vacant or out-of-range offsets.
    #[inline]
    pub fn index_from_offset(&self, off: Offset) -> Index {
        if !self.is_active(off) {
            return Index::INVALID;
        }
        match &self.index_from_offset {
            Some(ifo) => ifo[off.get()],
            None => Index::new(off.get()),
        }
    }

    /// Offset at an index; `INVALID` for index holes or out-of-range indices.
    #[inline]
    pub fn offset_from_index(&self, idx: Index) -> Offset {
        if !idx.is_valid() || idx.get() >= self.index_size() {
            return Offset::INVALID;
        }
        match &self.offset_from_index {
            Some(ofi) => ofi[idx.get()],
            None => Offset::new(idx.get()),
        }
    }

    fn materialize(&mut self) {
        if self.index_from_offset.is_some() {
            return;
        }
        self.index_from_offset = Some((0..self.offset_size).map(Index::new).collect());
        self.offset_from_index = Some((0..self.offset_size).map(Offset::new).collect());
    }

    fn destroy_unversioned(&mut self, off: Offset) -> bool {
        if !self.is_active(off) {
            if off.is_valid() && off.get() >= self.offset_size {
                log::warn!(
                    "{} offset {} destroyed beyond class size {}",
                    self.class,
                    off,
                    self.offset_size
                );
            }
            return false;
        }
        self.materialize();
        if let (Some(ifo), Some(ofi)) = (&mut self.index_from_offset, &mut self.offset_from_index)
        {
            let idx = ifo[off.get()];
            ofi[idx.get()] = Offset::INVALID;
            ifo[off.get()] = Index::INVALID;
        }
        self.active -= 1;
        true
    }

    /// Marks `off` vacant. Destroying a vacant offset is a no-op.
    pub fn destroy_offset(&mut self, off: Offset) -> bool {
        let changed = self.destroy_unversioned(off);
        if changed {
            self.version.bump();
        }
        changed
    }

    /// Marks every active offset of `range` vacant; returns how many were destroyed.
    pub fn destroy_range(&mut self, range: OffsetRange) -> usize {
        let mut n = 0;
        for off in range {
            if self.destroy_unversioned(off) {
                n += 1;
            }
        }
        if n > 0 {
            self.version.bump();
        }
        n
    }

    /// Squeezes index holes out, keeping the relative index order.
    fn compact_indices(&mut self) -> bool {
        let (Some(ifo), Some(ofi)) = (&mut self.index_from_offset, &mut self.offset_from_index)
        else {
            return false;
        };
        if ofi.len() == self.active {
            return false;
        }
        ofi.retain(|o| o.is_valid());
        for (i, off) in ofi.iter().enumerate() {
            ifo[off.get()] = Index::new(i);
        }
        true
    }

    fn try_make_trivial(&mut self) {
        let identity = match &self.offset_from_index {
            Some(ofi) => {
                self.active == self.offset_size
                    && ofi.len() == self.offset_size
                    && ofi.iter().enumerate().all(|(i, o)| o.raw() == i as i64)
            }
            None => false,
        };
        if identity {
            self.index_from_offset = None;
            self.offset_from_index = None;
        }
    }

    /// Reassigns indices densely; with `remove_holes` also packs offsets into
    /// `[0, len)` in ascending offset order.
    ///
    /// The returned remap must be applied to every structure keyed by or
    /// referring to this class before it is used again.
    pub fn defragment(&mut self, remove_holes: bool) -> DefragmentOutcome {
        let indices_moved = self.compact_indices();
        let mut remap = None;
        if remove_holes && self.hole_count() > 0 {
            let table = {
                let ifo = self.index_from_offset.as_ref();
                OffsetRemap::compacting(self.class, self.offset_size, |o| {
                    ifo.is_none_or(|ifo| ifo[o].is_valid())
                })
            };
            if let (Some(ifo), Some(ofi)) =
                (&mut self.index_from_offset, &mut self.offset_from_index)
            {
                let mut new_ifo = vec![Index::INVALID; table.new_size()];
                for (old, new) in table.pairs() {
                    new_ifo[new.get()] = ifo[old.get()];
                }
                *ifo = new_ifo;
                for off in ofi.iter_mut() {
                    *off = table.map(*off);
                }
            }
            self.offset_size = table.new_size();
            remap = Some(table);
        }
        self.try_make_trivial();
        let outcome = DefragmentOutcome {
            indices_moved,
            remap,
        };
        if outcome.moved() {
            self.version.bump();
        }
        outcome
    }

    /// Applies an externally computed remap of this class (used when another
    /// map of the same class was defragmented, e.g. during replace).
    pub fn apply_remap(&mut self, remap: &OffsetRemap) {
        debug_assert_eq!(remap.class(), self.class);
        let order: Vec<Offset> = self.iter_indexed().map(|o| remap.map(o)).collect();
        self.offset_size = remap.new_size();
        self.active = order.iter().filter(|o| o.is_valid()).count();
        self.index_from_offset = Some(vec![Index::INVALID; self.offset_size]);
        self.offset_from_index = Some(Vec::with_capacity(self.active));
        if let (Some(ifo), Some(ofi)) = (&mut self.index_from_offset, &mut self.offset_from_index)
        {
            for off in order.into_iter().filter(|o| o.is_valid()) {
                ifo[off.get()] = Index::new(ofi.len());
                ofi.push(off);
            }
        }
        self.try_make_trivial();
        self.version.bump();
    }

    /// Sets the traversal order to `order`, which must list every active
    /// offset exactly once.
    pub fn reorder(&mut self, order: &[Offset]) -> Result<(), MeshDetailError> {
        let bad = || MeshDetailError::InvalidPermutation {
            class: self.class,
            expected: self.active,
        };
        if order.len() != self.active {
            return Err(bad());
        }
        let mut new_ifo = vec![Index::INVALID; self.offset_size];
        for (i, &off) in order.iter().enumerate() {
            if !self.is_active(off) || new_ifo[off.get()].is_valid() {
                return Err(bad());
            }
            new_ifo[off.get()] = Index::new(i);
        }
        self.index_from_offset = Some(new_ifo);
        self.offset_from_index = Some(order.to_vec());
        self.try_make_trivial();
        self.version.bump();
        Ok(())
    }

    /// Drops every element and resets the offset space.
    pub fn clear(&mut self) {
        if self.offset_size == 0 && self.index_size() == 0 {
            return;
        }
        self.offset_size = 0;
        self.active = 0;
        self.index_from_offset = None;
        self.offset_from_index = None;
        self.version.bump();
    }

    /// Active offsets in ascending order.
    pub fn iter_offsets(&self) -> impl Iterator<Item = Offset> + '_ {
        (0..self.offset_size)
            .map(Offset::new)
            .filter(move |&o| self.is_active(o))
    }

    /// Active offsets in index order.
    pub fn iter_indexed(&self) -> impl Iterator<Item = Offset> + '_ {
        (0..self.index_size())
            .map(move |i| self.offset_from_index(Index::new(i)))
            .filter(|o| o.is_valid())
    }

    /// Visits active offsets in ascending order.
    ///
    /// Do not destroy earlier-positioned elements from inside the traversal;
    /// use an [`OffsetCursor`] when appending while traversing.
    pub fn for_each_offset(&self, mut f: impl FnMut(Offset)) {
        self.for_each_offset_break(|o| {
            f(o);
            true
        });
    }

    /// Like [`for_each_offset`](Self::for_each_offset); stops when `f` returns
    /// `false`. Returns `true` when the traversal ran to completion.
    pub fn for_each_offset_break(&self, mut f: impl FnMut(Offset) -> bool) -> bool {
        match &self.index_from_offset {
            None => (0..self.offset_size).all(|o| f(Offset::new(o))),
            Some(ifo) => ifo
                .iter()
                .enumerate()
                .filter(|(_, i)| i.is_valid())
                .all(|(o, _)| f(Offset::new(o))),
        }
    }

    /// Visits maximal runs of consecutive active offsets.
    pub fn for_each_offset_block(&self, mut f: impl FnMut(OffsetRange)) {
        let mut run_start: Option<usize> = None;
        for o in 0..self.offset_size {
            let active = self.is_active(Offset::new(o));
            match (active, run_start) {
                (true, None) => run_start = Some(o),
                (false, Some(s)) => {
                    f(OffsetRange::new(Offset::new(s), Offset::new(o)));
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = run_start {
            f(OffsetRange::new(Offset::new(s), Offset::new(self.offset_size)));
        }
    }

    /// Visits the active offsets that are members of `group`, skipping whole
    /// non-member spans at once.
    pub fn for_each_offset_in<G: GroupMembership + ?Sized>(&self, group: &G, mut f: impl FnMut(Offset)) {
        let end = Offset::new(self.offset_size);
        let mut pos = 0usize;
        while pos < self.offset_size {
            let (len, member) = group.constant_span(Offset::new(pos), end);
            let len = len.max(1);
            if member {
                for o in pos..(pos + len).min(self.offset_size) {
                    let off = Offset::new(o);
                    if self.is_active(off) {
                        f(off);
                    }
                }
            }
            pos += len;
        }
    }

    pub fn cursor(&self) -> OffsetCursor {
        OffsetCursor::new()
    }
}

impl DebugInvariants for IndexMap {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "IndexMap invalid");
    }

    fn validate_invariants(&self) -> Result<(), MeshDetailError> {
        let (Some(ifo), Some(ofi)) = (&self.index_from_offset, &self.offset_from_index) else {
            if self.active != self.offset_size {
                return Err(MeshDetailError::ActiveCountMismatch {
                    class: self.class,
                    expected: self.offset_size,
                    found: self.active,
                });
            }
            return Ok(());
        };
        if ifo.len() != self.offset_size {
            return Err(MeshDetailError::SizeMismatch {
                what: format!("{} index map offsets", self.class),
                expected: self.offset_size,
                found: ifo.len(),
            });
        }
        let mut active = 0usize;
        for (o, &idx) in ifo.iter().enumerate() {
            if !idx.is_valid() {
                continue;
            }
            active += 1;
            let off = Offset::new(o);
            if ofi.get(idx.get()).copied() != Some(off) {
                return Err(MeshDetailError::IndexMapMismatch {
                    class: self.class,
                    offset: off,
                    index: idx,
                });
            }
        }
        if active != self.active || ofi.iter().filter(|o| o.is_valid()).count() != active {
            return Err(MeshDetailError::ActiveCountMismatch {
                class: self.class,
                expected: active,
                found: self.active,
            });
        }
        Ok(())
    }
}
