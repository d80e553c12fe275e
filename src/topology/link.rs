//! Adaptive-width topology link arrays.
//!
//! A link maps every offset of its *owner* class to an offset of its
//! *target* class (or `INVALID`). Values are stored as signed 16-, 32- or
//! 64-bit integers with `-1` as the invalid sentinel; the width follows the
//! size of the target class through [`LinkArray::check_width`]. Changing width
//! is a bulk re-encode of the whole array.

use num_traits::{AsPrimitive, PrimInt};
use serde::{Deserialize, Serialize};

use crate::config::LinkWidthPolicy;
use crate::data::version::{DataId, VersionCounter};
use crate::topology::index_map::OffsetRemap;
use crate::topology::offset::{ElementClass, Offset, OffsetRange};

/// Integer width of a link array.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LinkWidth {
    W16,
    W32,
    W64,
}

impl LinkWidth {
    /// Largest storable offset.
    pub const fn max_value(self) -> i64 {
        match self {
            LinkWidth::W16 => i16::MAX as i64,
            LinkWidth::W32 => i32::MAX as i64,
            LinkWidth::W64 => i64::MAX,
        }
    }

    pub const fn bytes(self) -> usize {
        match self {
            LinkWidth::W16 => 2,
            LinkWidth::W32 => 4,
            LinkWidth::W64 => 8,
        }
    }

    pub const fn wider(self) -> Option<LinkWidth> {
        match self {
            LinkWidth::W16 => Some(LinkWidth::W32),
            LinkWidth::W32 => Some(LinkWidth::W64),
            LinkWidth::W64 => None,
        }
    }

    pub const fn narrower(self) -> Option<LinkWidth> {
        match self {
            LinkWidth::W16 => None,
            LinkWidth::W32 => Some(LinkWidth::W16),
            LinkWidth::W64 => Some(LinkWidth::W32),
        }
    }

    /// Narrowest width able to hold `value`.
    pub fn for_value(value: i64) -> LinkWidth {
        if value <= LinkWidth::W16.max_value() {
            LinkWidth::W16
        } else if value <= LinkWidth::W32.max_value() {
            LinkWidth::W32
        } else {
            LinkWidth::W64
        }
    }

    /// Width to use for a target class whose largest offset is `required_max`,
    /// starting from `current` and applying the policy's watermarks.
    pub fn choose(current: LinkWidth, required_max: i64, policy: &LinkWidthPolicy) -> LinkWidth {
        let mut w = current.max(policy.min_width);
        while required_max as f64 > policy.widen_fraction * w.max_value() as f64
            || required_max > w.max_value()
        {
            match w.wider() {
                Some(next) => w = next,
                None => break,
            }
        }
        while let Some(n) = w.narrower() {
            if n >= policy.min_width
                && (required_max as f64) < policy.narrow_fraction * n.max_value() as f64
            {
                w = n;
            } else {
                break;
            }
        }
        w
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum LinkStorage {
    W16(Vec<i16>),
    W32(Vec<i32>),
    W64(Vec<i64>),
}

macro_rules! with_storage {
    ($storage:expr, $v:ident => $body:expr) => {
        match $storage {
            LinkStorage::W16($v) => $body,
            LinkStorage::W32($v) => $body,
            LinkStorage::W64($v) => $body,
        }
    };
}

#[inline]
fn read<T: PrimInt + AsPrimitive<i64>>(values: &[T], i: usize) -> i64 {
    values[i].as_()
}

#[inline]
fn encode<T>(value: i64) -> T
where
    T: PrimInt + 'static,
    i64: AsPrimitive<T>,
{
    value.as_()
}

fn reencode<T>(values: impl Iterator<Item = i64>) -> Vec<T>
where
    T: PrimInt + 'static,
    i64: AsPrimitive<T>,
{
    values.map(encode::<T>).collect()
}

impl LinkStorage {
    fn new(width: LinkWidth, len: usize) -> Self {
        match width {
            LinkWidth::W16 => LinkStorage::W16(vec![-1; len]),
            LinkWidth::W32 => LinkStorage::W32(vec![-1; len]),
            LinkWidth::W64 => LinkStorage::W64(vec![-1; len]),
        }
    }

    fn width(&self) -> LinkWidth {
        match self {
            LinkStorage::W16(_) => LinkWidth::W16,
            LinkStorage::W32(_) => LinkWidth::W32,
            LinkStorage::W64(_) => LinkWidth::W64,
        }
    }

    fn len(&self) -> usize {
        with_storage!(self, v => v.len())
    }

    #[inline]
    fn get(&self, i: usize) -> i64 {
        with_storage!(self, v => read(v, i))
    }

    #[inline]
    fn set(&mut self, i: usize, value: i64) {
        with_storage!(self, v => v[i] = encode(value))
    }

    fn fill(&mut self, start: usize, end: usize, value: i64) {
        with_storage!(self, v => v[start..end].fill(encode(value)))
    }

    fn resize(&mut self, len: usize) {
        with_storage!(self, v => v.resize(len, encode(-1)))
    }

    fn values(&self) -> Box<dyn Iterator<Item = i64> + '_> {
        with_storage!(self, v => Box::new(v.iter().map(|&x| AsPrimitive::<i64>::as_(x))))
    }

    fn rebuild(width: LinkWidth, values: impl Iterator<Item = i64>) -> Self {
        match width {
            LinkWidth::W16 => LinkStorage::W16(reencode(values)),
            LinkWidth::W32 => LinkStorage::W32(reencode(values)),
            LinkWidth::W64 => LinkStorage::W64(reencode(values)),
        }
    }
}

/// One topology relationship stored per owner offset.
#[derive(Clone, Debug)]
pub struct LinkArray {
    name: &'static str,
    owner: ElementClass,
    target: ElementClass,
    storage: LinkStorage,
    version: VersionCounter,
}

impl LinkArray {
    pub fn new(
        name: &'static str,
        owner: ElementClass,
        target: ElementClass,
        len: usize,
        width: LinkWidth,
    ) -> Self {
        LinkArray {
            name,
            owner,
            target,
            storage: LinkStorage::new(width, len),
            version: VersionCounter::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn owner(&self) -> ElementClass {
        self.owner
    }

    #[inline]
    pub fn target(&self) -> ElementClass {
        self.target
    }

    #[inline]
    pub fn width(&self) -> LinkWidth {
        self.storage.width()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate heap bytes used by the values.
    pub fn byte_size(&self) -> usize {
        self.len() * self.width().bytes()
    }

    #[inline]
    pub fn data_id(&self) -> DataId {
        self.version.get()
    }

    #[inline]
    pub fn bump_data_id(&mut self) {
        self.version.bump();
    }

    /// Becomes a copy of `src` (same name), never lowering the data id.
    pub(crate) fn replace_from(&mut self, src: &LinkArray) {
        let version = self.version.clone();
        *self = src.clone();
        self.version = version;
        self.version.adopt(src.data_id());
    }

    /// Linked offset of `off`; `INVALID` when unset or out of range.
    #[inline]
    pub fn get(&self, off: Offset) -> Offset {
        if !off.is_valid() || off.get() >= self.len() {
            return Offset::INVALID;
        }
        Offset::from_raw(self.storage.get(off.get()))
    }

    /// Stores `value` at `off` without touching the data id; callers bump
    /// once per logical change.
    #[inline]
    pub fn set(&mut self, off: Offset, value: Offset) {
        if !off.is_valid() || off.get() >= self.len() {
            debug_assert!(false, "link `{}` write at {off} beyond {}", self.name, self.len());
            return;
        }
        if value.raw() > self.width().max_value() {
            // A block append was not followed by check_width; never truncate.
            log::warn!(
                "link `{}` widened on write of {}; check_width was skipped",
                self.name,
                value
            );
            self.reencode(LinkWidth::for_value(value.raw()));
        }
        self.storage.set(off.get(), value.raw());
    }

    /// Stores `value` for every owner offset of `range`.
    pub fn set_range(&mut self, range: OffsetRange, value: Offset) {
        if range.is_empty() {
            return;
        }
        if value.raw() > self.width().max_value() {
            self.reencode(LinkWidth::for_value(value.raw()));
        }
        let end = range.end.get().min(self.len());
        self.storage.fill(range.start.get().min(end), end, value.raw());
    }

    /// Grows or shrinks to `len` owner slots; new slots are `INVALID`.
    pub fn resize(&mut self, len: usize) {
        if len != self.len() {
            self.storage.resize(len);
            self.version.bump();
        }
    }

    /// Owner offsets in ascending order paired with their linked offsets.
    pub fn iter(&self) -> impl Iterator<Item = (Offset, Offset)> + '_ {
        self.storage
            .values()
            .enumerate()
            .map(|(i, v)| (Offset::new(i), Offset::from_raw(v)))
    }

    /// Largest stored value, `-1` when empty or all invalid.
    pub fn max_value(&self) -> i64 {
        self.storage.values().max().unwrap_or(-1)
    }

    fn reencode(&mut self, width: LinkWidth) {
        if width == self.width() {
            return;
        }
        log::debug!(
            "link `{}` re-encoded {:?} -> {:?} ({} slots)",
            self.name,
            self.width(),
            width,
            self.len()
        );
        self.storage = LinkStorage::rebuild(width, self.storage.values());
    }

    /// Re-encodes to the width chosen for a target class of `target_size`
    /// offsets. Returns whether the width changed.
    ///
    /// Content is unchanged, so the data id is not bumped.
    pub fn check_width(&mut self, target_size: usize, policy: &LinkWidthPolicy) -> bool {
        let required_max = target_size as i64 - 1;
        let width = LinkWidth::choose(self.width(), required_max, policy);
        if width == self.width() {
            return false;
        }
        self.reencode(width);
        true
    }

    /// Compacts the owner slots after the owner class was defragmented.
    pub fn compact_owner(&mut self, remap: &OffsetRemap) -> bool {
        debug_assert_eq!(remap.class(), self.owner);
        if remap.is_identity() && remap.old_size() == self.len() {
            return false;
        }
        let mut out = LinkStorage::new(self.width(), remap.new_size());
        for (old, new) in remap.pairs() {
            if old.get() < self.len() {
                out.set(new.get(), self.storage.get(old.get()));
            }
        }
        self.storage = out;
        self.version.bump();
        true
    }

    /// Rewrites link values after the target class was defragmented.
    pub fn remap_values(&mut self, remap: &OffsetRemap) -> bool {
        debug_assert_eq!(remap.class(), self.target);
        if remap.is_identity() {
            return false;
        }
        let mut changed = false;
        for i in 0..self.len() {
            let v = self.storage.get(i);
            if v < 0 {
                continue;
            }
            let n = remap.map(Offset::from_raw(v)).raw();
            if n != v {
                self.storage.set(i, n);
                changed = true;
            }
        }
        if changed {
            self.version.bump();
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn o(i: usize) -> Offset {
        Offset::new(i)
    }

    fn link(len: usize) -> LinkArray {
        LinkArray::new(
            "vertex_point",
            ElementClass::Vertex,
            ElementClass::Point,
            len,
            LinkWidth::W16,
        )
    }

    #[test]
    fn starts_invalid() {
        let l = link(3);
        assert!(l.iter().all(|(_, v)| v == Offset::INVALID));
        assert_eq!(l.get(o(7)), Offset::INVALID);
    }

    #[test]
    fn widens_past_high_watermark_and_keeps_values() {
        let policy = LinkWidthPolicy::default();
        let mut l = link(2);
        l.set(o(0), o(5));
        assert!(!l.check_width(1000, &policy));
        assert!(l.check_width(40_000, &policy));
        assert_eq!(l.width(), LinkWidth::W32);
        assert_eq!(l.get(o(0)), o(5));
        assert_eq!(l.get(o(1)), Offset::INVALID);
        l.set(o(1), o(39_999));
        assert_eq!(l.get(o(1)), o(39_999));
    }

    #[test]
    fn check_width_is_idempotent() {
        let policy = LinkWidthPolicy::default();
        let mut l = link(1);
        assert!(l.check_width(100_000, &policy));
        assert!(!l.check_width(100_000, &policy));
        assert!(!l.check_width(100_000, &policy));
    }

    #[test]
    fn narrows_only_below_low_watermark() {
        let policy = LinkWidthPolicy::default();
        let mut l = link(1);
        l.check_width(40_000, &policy);
        // 30_000 fits 16 bits but sits above half of i16::MAX
        assert!(!l.check_width(30_000, &policy));
        assert_eq!(l.width(), LinkWidth::W32);
        assert!(l.check_width(1_000, &policy));
        assert_eq!(l.width(), LinkWidth::W16);
    }

    #[test]
    fn min_width_is_respected() {
        let policy = LinkWidthPolicy {
            min_width: LinkWidth::W64,
            ..LinkWidthPolicy::default()
        };
        let mut l = link(1);
        assert!(l.check_width(4, &policy));
        assert_eq!(l.width(), LinkWidth::W64);
    }

    #[test]
    fn oversized_write_widens_instead_of_truncating() {
        let mut l = link(1);
        l.set(o(0), o(70_000));
        assert_eq!(l.width(), LinkWidth::W32);
        assert_eq!(l.get(o(0)), o(70_000));
    }

    #[test]
    fn owner_compaction_moves_slots() {
        let mut l = link(4);
        for i in 0..4 {
            l.set(o(i), o(10 + i));
        }
        let remap = OffsetRemap::compacting(ElementClass::Vertex, 4, |i| i != 0);
        assert!(l.compact_owner(&remap));
        assert_eq!(l.len(), 3);
        assert_eq!(l.get(o(0)), o(11));
        assert_eq!(l.get(o(2)), o(13));
    }

    #[test]
    fn target_remap_rewrites_values() {
        let mut l = link(3);
        l.set(o(0), o(0));
        l.set(o(1), o(2));
        l.set(o(2), o(3));
        let remap = OffsetRemap::compacting(ElementClass::Point, 4, |i| i != 1);
        let id = l.data_id();
        assert!(l.remap_values(&remap));
        assert!(l.data_id() > id);
        assert_eq!(
            l.iter().map(|(_, v)| v).collect::<Vec<_>>(),
            vec![o(0), o(1), o(2)]
        );
    }

    #[test]
    fn byte_size_tracks_width() {
        let policy = LinkWidthPolicy::default();
        let mut l = link(10);
        assert_eq!(l.byte_size(), 20);
        l.check_width(1 << 40, &policy);
        assert_eq!(l.width(), LinkWidth::W64);
        assert_eq!(l.byte_size(), 80);
    }
}
