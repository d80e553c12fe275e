//! Element groups: per-class membership bitsets.
//!
//! Groups are an external collaborator of the core. The core needs three
//! things from them: a membership test by constant span (used by
//! [`IndexMap::for_each_offset_in`]), resizing/remapping alongside their
//! class, and an explicit [`ElementGroup::invalidate_entries`] hook.
//!
//! Membership words are atomic so that several threads may flip bits of
//! disjoint ranges through [`ElementGroup::set_concurrent`]. The cached
//! entry count is *not* invalidated by those writes; callers invalidate it
//! once after the parallel region. The data id does follow them: every
//! concurrent write that flips a bit draws a fresh id.
//!
//! [`IndexMap::for_each_offset_in`]: crate::topology::index_map::IndexMap::for_each_offset_in

use crate::data::storage::OffsetStorage;
use crate::data::version::{DataId, VersionCounter};
use crate::mesh_error::MeshDetailError;
use crate::topology::cache::InvalidateCache;
use crate::topology::index_map::OffsetRemap;
use crate::topology::offset::{ElementClass, Offset};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

const WORD: usize = 64;

/// Membership test used by traversal fast paths.
pub trait GroupMembership {
    fn contains(&self, off: Offset) -> bool;

    /// Length of the run starting at `start` (bounded by `end`) over which
    /// membership does not change, and the membership value of that run.
    fn constant_span(&self, start: Offset, end: Offset) -> (usize, bool) {
        let value = self.contains(start);
        let mut len = 1;
        while start.raw() + (len as i64) < end.raw() && self.contains(start.add(len)) == value {
            len += 1;
        }
        (len, value)
    }
}

/// Named membership set over one element class.
#[derive(Debug)]
pub struct ElementGroup {
    name: String,
    class: ElementClass,
    words: Vec<AtomicU64>,
    size: usize,
    entries: Mutex<Option<usize>>,
    version: VersionCounter,
    /// Latest id drawn by a concurrent write, 0 when none.
    concurrent_id: AtomicU64,
}

impl ElementGroup {
    pub fn new(name: impl Into<String>, class: ElementClass, size: usize) -> Self {
        let mut g = ElementGroup {
            name: name.into(),
            class,
            words: Vec::new(),
            size: 0,
            entries: Mutex::new(Some(0)),
            version: VersionCounter::new(),
            concurrent_id: AtomicU64::new(0),
        };
        g.resize(size);
        g
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> ElementClass {
        self.class
    }

    pub fn data_id(&self) -> DataId {
        let concurrent = DataId::from_raw(self.concurrent_id.load(Ordering::Acquire));
        self.version.get().max(concurrent)
    }

    pub fn bump_data_id(&mut self) {
        self.version.bump();
    }

    /// Becomes a copy of `src`, never lowering the data id.
    pub(crate) fn replace_from(&mut self, src: &ElementGroup) {
        let version = self.version.clone();
        *self = src.clone();
        self.version = version;
        self.version.adopt(src.data_id());
        *self.concurrent_id.get_mut() = 0;
    }

    #[inline]
    fn locate(off: Offset) -> (usize, u64) {
        let o = off.get();
        (o / WORD, 1u64 << (o % WORD))
    }

    /// Sets membership and keeps the entry count current.
    pub fn set(&mut self, off: Offset, member: bool) {
        if !off.is_valid() || off.get() >= self.size {
            debug_assert!(false, "group `{}` write outside its class size", self.name);
            return;
        }
        let (w, bit) = Self::locate(off);
        let word = self.words[w].get_mut();
        let was = *word & bit != 0;
        if was == member {
            return;
        }
        if member {
            *word |= bit;
        } else {
            *word &= !bit;
        }
        if let Some(n) = self.entries.get_mut().as_mut() {
            if member {
                *n += 1;
            } else {
                *n -= 1;
            }
        }
        self.version.bump();
    }

    /// Sets membership through a shared reference.
    ///
    /// Safe for concurrent writers on any offsets; the cached entry count
    /// goes stale until [`invalidate_entries`](Self::invalidate_entries).
    /// A write that changes membership changes the data id.
    pub fn set_concurrent(&self, off: Offset, member: bool) {
        if !off.is_valid() || off.get() >= self.size {
            return;
        }
        let (w, bit) = Self::locate(off);
        let before = if member {
            self.words[w].fetch_or(bit, Ordering::Relaxed)
        } else {
            self.words[w].fetch_and(!bit, Ordering::Relaxed)
        };
        if (before & bit != 0) != member {
            self.concurrent_id
                .fetch_max(DataId::fresh().get(), Ordering::AcqRel);
        }
    }

    /// Forgets the cached entry count; the next [`entries`](Self::entries)
    /// call recounts.
    pub fn invalidate_entries(&self) {
        *self.entries.lock() = None;
    }

    /// Number of members, recounted when the cache was invalidated.
    pub fn entries(&self) -> usize {
        let mut cached = self.entries.lock();
        if let Some(n) = *cached {
            return n;
        }
        let n = self
            .words
            .iter()
            .map(|w| w.load(Ordering::Relaxed).count_ones() as usize)
            .sum();
        *cached = Some(n);
        n
    }

    /// Members in ascending offset order.
    pub fn iter(&self) -> impl Iterator<Item = Offset> + '_ {
        (0..self.size)
            .map(Offset::new)
            .filter(move |&o| self.contains(o))
    }

    pub fn clear(&mut self) {
        for w in &mut self.words {
            *w.get_mut() = 0;
        }
        *self.entries.get_mut() = Some(0);
        self.version.bump();
    }

    pub fn len_offsets(&self) -> usize {
        self.size
    }
}

impl GroupMembership for ElementGroup {
    #[inline]
    fn contains(&self, off: Offset) -> bool {
        if !off.is_valid() || off.get() >= self.size {
            return false;
        }
        let (w, bit) = Self::locate(off);
        self.words[w].load(Ordering::Relaxed) & bit != 0
    }

    fn constant_span(&self, start: Offset, end: Offset) -> (usize, bool) {
        let end = end.get().min(self.size);
        let s = start.get();
        if s >= end {
            return (end.saturating_sub(s).max(1), false);
        }
        let value = self.contains(start);
        let mut pos = s;
        while pos < end {
            let w = pos / WORD;
            let word = self.words[w].load(Ordering::Relaxed);
            let word = if value { !word } else { word };
            // bits at or above `pos` within this word that break the run
            let breaks = word & (!0u64 << (pos % WORD));
            if breaks != 0 {
                let stop = w * WORD + breaks.trailing_zeros() as usize;
                return (stop.min(end) - s, value);
            }
            pos = (w + 1) * WORD;
        }
        (end - s, value)
    }
}

impl Clone for ElementGroup {
    fn clone(&self) -> Self {
        ElementGroup {
            name: self.name.clone(),
            class: self.class,
            words: self
                .words
                .iter()
                .map(|w| AtomicU64::new(w.load(Ordering::Relaxed)))
                .collect(),
            size: self.size,
            entries: Mutex::new(*self.entries.lock()),
            version: self.version.clone(),
            concurrent_id: AtomicU64::new(self.concurrent_id.load(Ordering::Acquire)),
        }
    }
}

impl InvalidateCache for ElementGroup {
    fn invalidate_cache(&mut self) {
        *self.entries.get_mut() = None;
    }
}

impl OffsetStorage for ElementGroup {
    fn resize(&mut self, new_size: usize) {
        if new_size == self.size {
            return;
        }
        if new_size < self.size {
            for o in new_size..self.size {
                let (w, bit) = Self::locate(Offset::new(o));
                *self.words[w].get_mut() &= !bit;
            }
            self.invalidate_cache();
        }
        self.words
            .resize_with(new_size.div_ceil(WORD), || AtomicU64::new(0));
        self.size = new_size;
        self.version.bump();
    }

    fn construct_range(&mut self, start: Offset, n: usize) {
        for off in crate::topology::offset::OffsetRange::with_len(start, n) {
            self.set(off, false);
        }
    }

    fn destruct(&mut self, off: Offset) {
        self.set(off, false);
    }

    fn remap(&mut self, remap: &OffsetRemap) {
        let members: Vec<Offset> = self.iter().map(|o| remap.map(o)).collect();
        self.words = Vec::new();
        self.size = 0;
        self.resize(remap.new_size());
        let mut n = 0;
        for off in members.into_iter().filter(|o| o.is_valid()) {
            let (w, bit) = Self::locate(off);
            *self.words[w].get_mut() |= bit;
            n += 1;
        }
        *self.entries.get_mut() = Some(n);
        self.version.bump();
    }
}

/// Groups of one element class, by name.
#[derive(Clone, Debug)]
pub struct GroupDict {
    class: ElementClass,
    groups: BTreeMap<String, ElementGroup>,
}

impl GroupDict {
    pub fn new(class: ElementClass) -> Self {
        GroupDict {
            class,
            groups: BTreeMap::new(),
        }
    }

    pub fn create(&mut self, name: &str, size: usize) -> Result<&mut ElementGroup, MeshDetailError> {
        if self.groups.contains_key(name) {
            return Err(MeshDetailError::DuplicateAttribute {
                class: self.class,
                name: name.to_string(),
            });
        }
        Ok(self
            .groups
            .entry(name.to_string())
            .or_insert_with(|| ElementGroup::new(name, self.class, size)))
    }

    pub fn get(&self, name: &str) -> Option<&ElementGroup> {
        self.groups.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ElementGroup> {
        self.groups.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ElementGroup> {
        self.groups.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut ElementGroup> {
        self.groups.values_mut()
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.groups.retain(|k, _| keep(k));
    }

    pub(crate) fn insert(&mut self, group: ElementGroup) {
        self.groups.insert(group.name.clone(), group);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn o(i: usize) -> Offset {
        Offset::new(i)
    }

    #[test]
    fn set_tracks_entries_and_version() {
        let mut g = ElementGroup::new("boundary", ElementClass::Point, 10);
        let id = g.data_id();
        g.set(o(3), true);
        g.set(o(3), true);
        g.set(o(7), true);
        assert_eq!(g.entries(), 2);
        assert!(g.data_id() > id);
        g.set(o(3), false);
        assert_eq!(g.entries(), 1);
    }

    #[test]
    fn concurrent_writes_need_explicit_invalidation() {
        let g = ElementGroup::new("sel", ElementClass::Primitive, 256);
        assert_eq!(g.entries(), 0);
        std::thread::scope(|s| {
            for chunk in 0..4usize {
                let g = &g;
                s.spawn(move || {
                    for i in (chunk * 64)..(chunk * 64 + 10) {
                        g.set_concurrent(o(i), true);
                    }
                });
            }
        });
        assert_eq!(g.entries(), 0, "cache stays stale until invalidated");
        g.invalidate_entries();
        assert_eq!(g.entries(), 40);
    }

    #[test]
    fn concurrent_writes_change_the_data_id() {
        let g = ElementGroup::new("sel", ElementClass::Point, 8);
        let id = g.data_id();
        g.set_concurrent(o(3), false);
        assert_eq!(g.data_id(), id, "no bit flipped");
        g.set_concurrent(o(3), true);
        let after = g.data_id();
        assert!(after > id);
        let copy = g.clone();
        assert_eq!(copy.data_id(), after);
        g.set_concurrent(o(4), true);
        assert!(g.data_id() > copy.data_id());
    }

    #[test]
    fn constant_span_crosses_words() {
        let mut g = ElementGroup::new("g", ElementClass::Point, 200);
        for i in 10..150 {
            g.set(o(i), true);
        }
        assert_eq!(g.constant_span(o(0), o(200)), (10, false));
        assert_eq!(g.constant_span(o(10), o(200)), (140, true));
        assert_eq!(g.constant_span(o(20), o(100)), (80, true));
        assert_eq!(g.constant_span(o(150), o(200)), (50, false));
    }

    #[test]
    fn remap_moves_members() {
        let mut g = ElementGroup::new("g", ElementClass::Point, 4);
        g.set(o(2), true);
        g.set(o(3), true);
        let remap = OffsetRemap::compacting(ElementClass::Point, 4, |i| i != 1);
        g.remap(&remap);
        assert_eq!(g.len_offsets(), 3);
        assert_eq!(g.iter().collect::<Vec<_>>(), vec![o(1), o(2)]);
        assert_eq!(g.entries(), 2);
    }

    #[test]
    fn duplicate_group_rejected() {
        let mut d = GroupDict::new(ElementClass::Point);
        d.create("a", 4).unwrap();
        assert!(matches!(
            d.create("a", 4),
            Err(MeshDetailError::DuplicateAttribute { .. })
        ));
    }
}
