//! Per-class attribute dictionaries.

use std::collections::BTreeMap;

use crate::data::storage::{AttributeArray, OffsetStorage, VecAttribute};
use crate::mesh_error::MeshDetailError;
use crate::topology::index_map::OffsetRemap;
use crate::topology::offset::{ElementClass, Offset};

/// Attributes of one element class, by name, in name order.
#[derive(Clone, Debug)]
pub struct AttributeDict {
    class: ElementClass,
    size: usize,
    attrs: BTreeMap<String, Box<dyn AttributeArray>>,
}

impl AttributeDict {
    pub fn new(class: ElementClass) -> Self {
        AttributeDict {
            class,
            size: 0,
            attrs: BTreeMap::new(),
        }
    }

    pub fn class(&self) -> ElementClass {
        self.class
    }

    /// Adds a `Vec`-backed attribute sized to the class.
    pub fn add<V>(&mut self, name: &str, default: V) -> Result<&mut VecAttribute<V>, MeshDetailError>
    where
        V: Clone + Send + Sync + 'static,
    {
        self.insert_boxed(name, Box::new(VecAttribute::new(self.size, default)))?;
        self.get_mut::<V>(name)
    }

    /// Adds any attribute implementation; it is resized to the class.
    pub fn insert_boxed(
        &mut self,
        name: &str,
        mut attr: Box<dyn AttributeArray>,
    ) -> Result<(), MeshDetailError> {
        if self.attrs.contains_key(name) {
            return Err(MeshDetailError::DuplicateAttribute {
                class: self.class,
                name: name.to_string(),
            });
        }
        attr.resize(self.size);
        self.attrs.insert(name.to_string(), attr);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn get_dyn(&self, name: &str) -> Option<&dyn AttributeArray> {
        self.attrs.get(name).map(|a| a.as_ref())
    }

    pub fn get_dyn_mut(&mut self, name: &str) -> Option<&mut (dyn AttributeArray + 'static)> {
        self.attrs.get_mut(name).map(|a| a.as_mut())
    }

    pub fn get<V: Clone + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<&VecAttribute<V>, MeshDetailError> {
        let attr = self.attrs.get(name).ok_or_else(|| self.missing(name))?;
        attr.as_any()
            .downcast_ref::<VecAttribute<V>>()
            .ok_or_else(|| MeshDetailError::AttributeTypeMismatch {
                class: self.class,
                name: name.to_string(),
            })
    }

    pub fn get_mut<V: Clone + Send + Sync + 'static>(
        &mut self,
        name: &str,
    ) -> Result<&mut VecAttribute<V>, MeshDetailError> {
        let class = self.class;
        let attr = self
            .attrs
            .get_mut(name)
            .ok_or_else(|| MeshDetailError::MissingAttribute {
                class,
                name: name.to_string(),
            })?;
        attr.as_any_mut()
            .downcast_mut::<VecAttribute<V>>()
            .ok_or_else(|| MeshDetailError::AttributeTypeMismatch {
                class,
                name: name.to_string(),
            })
    }

    pub fn remove(&mut self, name: &str) -> Option<Box<dyn AttributeArray>> {
        self.attrs.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Offset size every attribute is kept at.
    pub fn offset_size(&self) -> usize {
        self.size
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &dyn AttributeArray)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Box<dyn AttributeArray>)> {
        self.attrs.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.attrs.retain(|k, _| keep(k));
    }

    pub(crate) fn put(&mut self, name: &str, attr: Box<dyn AttributeArray>) {
        self.attrs.insert(name.to_string(), attr);
    }

    fn missing(&self, name: &str) -> MeshDetailError {
        MeshDetailError::MissingAttribute {
            class: self.class,
            name: name.to_string(),
        }
    }
}

impl OffsetStorage for AttributeDict {
    fn resize(&mut self, new_size: usize) {
        self.size = new_size;
        for attr in self.attrs.values_mut() {
            attr.resize(new_size);
        }
    }

    fn construct_range(&mut self, start: Offset, n: usize) {
        for attr in self.attrs.values_mut() {
            attr.construct_range(start, n);
        }
    }

    fn destruct(&mut self, off: Offset) {
        for attr in self.attrs.values_mut() {
            attr.destruct(off);
        }
    }

    fn remap(&mut self, remap: &OffsetRemap) {
        self.size = remap.new_size();
        for attr in self.attrs.values_mut() {
            attr.remap(remap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_access_and_mismatch() {
        let mut d = AttributeDict::new(ElementClass::Point);
        d.resize(3);
        d.add("P", [0.0f32; 3]).unwrap();
        assert_eq!(d.get::<[f32; 3]>("P").unwrap().len(), 3);
        assert!(matches!(
            d.get::<f64>("P"),
            Err(MeshDetailError::AttributeTypeMismatch { .. })
        ));
        assert!(matches!(
            d.get::<f64>("Cd"),
            Err(MeshDetailError::MissingAttribute { .. })
        ));
        assert!(d.add("P", 0i32).is_err());
    }

    #[test]
    fn hooks_reach_every_attribute() {
        let mut d = AttributeDict::new(ElementClass::Vertex);
        d.add("a", 0i32).unwrap();
        d.add("b", 1u8).unwrap();
        d.resize(5);
        d.get_mut::<i32>("a").unwrap().set(Offset::new(4), 3);
        let remap = OffsetRemap::compacting(ElementClass::Vertex, 5, |o| o % 2 == 0);
        d.remap(&remap);
        assert_eq!(d.offset_size(), 3);
        assert_eq!(d.get::<i32>("a").unwrap().as_slice(), &[0, 0, 3]);
        assert_eq!(d.get::<u8>("b").unwrap().len(), 3);
    }
}
