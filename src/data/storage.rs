//! Offset-keyed storage hooks and the attribute array abstraction.
//!
//! Anything stored per element offset (attribute values, group bits) must
//! follow its class through growth, element construction/destruction, and
//! defragmentation. [`OffsetStorage`] is that contract; [`AttributeArray`]
//! adds the data-id and the type erasure the attribute dictionaries need.

use core::fmt::{self, Debug};
use std::any::Any;

use crate::data::version::{DataId, VersionCounter};
use crate::topology::index_map::OffsetRemap;
use crate::topology::offset::{Offset, OffsetRange};

/// Hooks invoked by the detail whenever its element classes change shape.
pub trait OffsetStorage {
    /// Grow or shrink to cover `[0, new_size)`.
    fn resize(&mut self, new_size: usize);

    /// Elements `[start, start + n)` were created.
    fn construct_range(&mut self, start: Offset, n: usize);

    /// Element `off` was destroyed.
    fn destruct(&mut self, off: Offset);

    /// The class was compacted; move every surviving entry.
    fn remap(&mut self, remap: &OffsetRemap);
}

/// Type-erased attribute over one element class.
pub trait AttributeArray: OffsetStorage + Debug + Send + Sync {
    /// Current covered offset size.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn data_id(&self) -> DataId;

    fn bump_data_id(&mut self);

    /// Become a copy of `src`, taking its id unless that would lower ours.
    ///
    /// Returns `false` when `src` stores a different value type.
    fn assign_from(&mut self, src: &dyn AttributeArray) -> bool;

    /// Copy values of `src` at `src_offsets` into `[dst_start, ..)`.
    ///
    /// Returns `false` when `src` stores a different value type.
    fn copy_from(&mut self, src: &dyn AttributeArray, src_offsets: &[Offset], dst_start: Offset)
    -> bool;

    /// Empty attribute of the same value type and default.
    fn empty_like(&self) -> Box<dyn AttributeArray>;

    fn clone_box(&self) -> Box<dyn AttributeArray>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl Clone for Box<dyn AttributeArray> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// `Vec`-backed attribute with a per-attribute default value.
#[derive(Clone)]
pub struct VecAttribute<V> {
    values: Vec<V>,
    default: V,
    version: VersionCounter,
}

impl<V> Debug for VecAttribute<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VecAttribute")
            .field("len", &self.values.len())
            .field("data_id", &self.version.get())
            .finish()
    }
}

impl<V: Clone> VecAttribute<V> {
    pub fn new(len: usize, default: V) -> Self {
        VecAttribute {
            values: vec![default.clone(); len],
            default,
            version: VersionCounter::new(),
        }
    }

    pub fn default_value(&self) -> &V {
        &self.default
    }

    /// Value at `off`; `None` outside the covered size.
    #[inline]
    pub fn get(&self, off: Offset) -> Option<&V> {
        off.valid().and_then(|o| self.values.get(o.get()))
    }

    /// Writes one value and bumps the data id.
    pub fn set(&mut self, off: Offset, value: V) -> bool {
        match off.valid().and_then(|o| self.values.get_mut(o.get())) {
            Some(slot) => {
                *slot = value;
                self.version.bump();
                true
            }
            None => false,
        }
    }

    /// Writes a whole range with one data-id bump.
    pub fn set_range(&mut self, range: OffsetRange, value: V) {
        let end = range.end.get().min(self.values.len());
        let start = range.start.get().min(end);
        if start == end {
            return;
        }
        self.values[start..end].fill(value);
        self.version.bump();
    }

    /// Entire read-only buffer, indexed by offset.
    pub fn as_slice(&self) -> &[V] {
        &self.values
    }

    /// Entire mutable buffer; the caller bumps the data id once done.
    pub fn as_mut_slice(&mut self) -> &mut [V] {
        &mut self.values
    }
}

impl<V: Clone> OffsetStorage for VecAttribute<V> {
    fn resize(&mut self, new_size: usize) {
        if new_size != self.values.len() {
            self.values.resize(new_size, self.default.clone());
            self.version.bump();
        }
    }

    fn construct_range(&mut self, start: Offset, n: usize) {
        let range = OffsetRange::with_len(start, n);
        if range.end.get() > self.values.len() {
            self.resize(range.end.get());
        }
        if n > 0 {
            self.values[range.start.get()..range.end.get()].fill(self.default.clone());
            self.version.bump();
        }
    }

    fn destruct(&mut self, off: Offset) {
        if let Some(slot) = off.valid().and_then(|o| self.values.get_mut(o.get())) {
            *slot = self.default.clone();
            self.version.bump();
        }
    }

    fn remap(&mut self, remap: &OffsetRemap) {
        remap.apply_to_vec(&mut self.values, self.default.clone());
        self.version.bump();
    }
}

impl<V> AttributeArray for VecAttribute<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn len(&self) -> usize {
        self.values.len()
    }

    fn data_id(&self) -> DataId {
        self.version.get()
    }

    fn bump_data_id(&mut self) {
        self.version.bump();
    }

    fn assign_from(&mut self, src: &dyn AttributeArray) -> bool {
        let Some(src) = src.as_any().downcast_ref::<VecAttribute<V>>() else {
            return false;
        };
        self.values.clone_from(&src.values);
        self.default = src.default.clone();
        self.version.adopt(src.version.get());
        true
    }

    fn copy_from(
        &mut self,
        src: &dyn AttributeArray,
        src_offsets: &[Offset],
        dst_start: Offset,
    ) -> bool {
        let Some(src) = src.as_any().downcast_ref::<VecAttribute<V>>() else {
            return false;
        };
        let end = dst_start.get() + src_offsets.len();
        if end > self.values.len() {
            self.resize(end);
        }
        for (i, &so) in src_offsets.iter().enumerate() {
            let v = src.get(so).unwrap_or(&src.default).clone();
            self.values[dst_start.get() + i] = v;
        }
        self.version.bump();
        true
    }

    fn empty_like(&self) -> Box<dyn AttributeArray> {
        Box::new(VecAttribute::new(0, self.default.clone()))
    }

    fn clone_box(&self) -> Box<dyn AttributeArray> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::offset::ElementClass;

    #[test]
    fn construct_and_destruct_reset_to_default() {
        let mut a = VecAttribute::new(0, 1.5f32);
        a.resize(4);
        a.set(Offset::new(2), 9.0);
        a.destruct(Offset::new(2));
        assert_eq!(a.get(Offset::new(2)), Some(&1.5));
        a.set(Offset::new(3), 4.0);
        a.construct_range(Offset::new(3), 3);
        assert_eq!(a.len(), 6);
        assert_eq!(a.get(Offset::new(3)), Some(&1.5));
    }

    #[test]
    fn remap_follows_offsets() {
        let mut a = VecAttribute::new(4, 0i32);
        for i in 0..4 {
            a.set(Offset::new(i), i as i32 * 10);
        }
        let remap = OffsetRemap::compacting(ElementClass::Point, 4, |o| o != 1);
        let id = a.data_id();
        a.remap(&remap);
        assert_eq!(a.as_slice(), &[0, 20, 30]);
        assert!(a.data_id() > id);
    }

    #[test]
    fn copy_from_requires_same_type() {
        let mut src = VecAttribute::new(3, 0u8);
        src.set(Offset::new(1), 7);
        let mut dst = VecAttribute::new(1, 0u8);
        assert!(dst.copy_from(&src, &[Offset::new(1), Offset::new(2)], Offset::new(1)));
        assert_eq!(dst.as_slice(), &[0, 7, 0]);
        let mut wrong = VecAttribute::new(1, 0.0f64);
        assert!(!wrong.copy_from(&src, &[Offset::new(1)], Offset::new(0)));
    }

    #[test]
    fn assign_from_copies_and_never_lowers_id() {
        let mut src = VecAttribute::new(3, 2u16);
        src.set(Offset::new(0), 9);
        let mut dst = VecAttribute::new(1, 0u16);
        dst.bump_data_id();
        let before = dst.data_id();
        assert!(dst.assign_from(&src));
        assert_eq!(dst.as_slice(), &[9, 2, 2]);
        assert_eq!(dst.default_value(), &2);
        assert!(dst.data_id() > before);
        let mut wrong = VecAttribute::new(1, 0i64);
        assert!(!wrong.assign_from(&src));
    }

    #[test]
    fn out_of_range_set_is_rejected() {
        let mut a = VecAttribute::new(2, 0u32);
        let id = a.data_id();
        assert!(!a.set(Offset::new(5), 1));
        assert!(!a.set(Offset::INVALID, 1));
        assert_eq!(a.data_id(), id);
    }
}
