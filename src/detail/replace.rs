//! Whole-detail copies: [`Detail::replace_with`] makes this detail a copy of
//! another, moving only the parts whose data ids differ; [`Detail::merge`]
//! appends another detail's elements.

use std::any::Any;
use std::sync::Arc;

use super::marker::{ElementMarker, MarkedRanges};
use super::Detail;
use crate::data::group::{ElementGroup, GroupMembership};
use crate::data::storage::{AttributeArray, OffsetStorage};
use crate::mesh_error::MeshDetailError;
use crate::topology::links::Touched;
use crate::topology::offset::{ElementClass, Offset};

/// How many parts [`Detail::replace_with`] copied and how many it could
/// skip because their data ids already matched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaceStats {
    pub copied: usize,
    pub skipped: usize,
}

impl ReplaceStats {
    fn tally(&mut self, copied: bool) {
        if copied {
            self.copied += 1;
        } else {
            self.skipped += 1;
        }
    }
}

fn same_value_type(a: &dyn AttributeArray, b: &dyn AttributeArray) -> bool {
    Any::type_id(a.as_any()) == Any::type_id(b.as_any())
}

impl Detail {
    /// Makes this detail a copy of `src`.
    pub fn replace(&mut self, src: &Detail) -> ReplaceStats {
        self.replace_with(src, |_, _| false)
    }

    /// Makes this detail a copy of `src`, except for attributes and groups
    /// for which `skip(class, name)` holds: those keep their values here and
    /// are only resized.
    ///
    /// Parts with equal data ids are assumed identical and left alone. Every
    /// copied part ends with a data id no lower than before.
    pub fn replace_with(
        &mut self,
        src: &Detail,
        skip: impl Fn(ElementClass, &str) -> bool,
    ) -> ReplaceStats {
        let mut stats = ReplaceStats::default();
        self.config = src.config;
        self.registry = Arc::clone(&src.registry);

        for (dst, s) in self.index_maps.iter_mut().zip(&src.index_maps) {
            let differs = dst.data_id() != s.data_id();
            if differs {
                dst.replace_from(s);
            }
            stats.tally(differs);
        }

        let (copied, skipped) = self.topology.replace_from(&src.topology);
        stats.copied += copied;
        stats.skipped += skipped;

        let differs = self.primitives.data_id() != src.primitives.data_id();
        if differs {
            self.primitives.replace_from(&src.primitives);
        }
        stats.tally(differs);

        for class in ElementClass::ALL {
            let slot = class.slot();
            let size = src.index_maps[slot].offset_size();
            let src_attrs = &src.attributes[slot];
            let dst_attrs = &mut self.attributes[slot];
            dst_attrs.retain(|name| src_attrs.contains(name) || skip(class, name));
            for (name, s) in src_attrs.iter() {
                if skip(class, name) {
                    continue;
                }
                match dst_attrs.get_dyn_mut(name) {
                    Some(d) if d.data_id() == s.data_id() => stats.tally(false),
                    Some(d) if same_value_type(d, s) => {
                        d.assign_from(s);
                        stats.tally(true);
                    }
                    Some(d) => {
                        let old = d.data_id();
                        let mut copy = s.clone_box();
                        if copy.data_id() <= old {
                            copy.bump_data_id();
                        }
                        dst_attrs.put(name, copy);
                        stats.tally(true);
                    }
                    None => {
                        dst_attrs.put(name, s.clone_box());
                        stats.tally(true);
                    }
                }
            }
            dst_attrs.resize(size);

            let src_groups = &src.groups[slot];
            let dst_groups = &mut self.groups[slot];
            dst_groups.retain(|name| src_groups.get(name).is_some() || skip(class, name));
            for name in src_groups.names() {
                if skip(class, name) {
                    continue;
                }
                let Some(s) = src_groups.get(name) else {
                    continue;
                };
                match dst_groups.get_mut(name) {
                    Some(d) if d.data_id() == s.data_id() => stats.tally(false),
                    Some(d) => {
                        d.replace_from(s);
                        stats.tally(true);
                    }
                    None => {
                        dst_groups.insert(s.clone());
                        stats.tally(true);
                    }
                }
            }
            for g in dst_groups.iter_mut() {
                g.resize(size);
            }
        }

        self.meta_cache_count += 1;
        log::debug!(
            "replace: {} parts copied, {} shared",
            stats.copied,
            stats.skipped
        );
        stats
    }

    /// Appends every point, vertex and primitive of `src`, with attribute
    /// values and group membership. Attributes missing here are created;
    /// an attribute present in both with different value types is an error,
    /// as is a primitive type this detail's registry does not know. Both
    /// are checked before anything changes. Global attributes are not
    /// merged.
    pub fn merge(&mut self, src: &Detail) -> Result<MarkedRanges, MeshDetailError> {
        for id in src.tracker().types() {
            if !self.registry.contains(id) {
                return Err(MeshDetailError::UnknownPrimitiveType(id));
            }
        }
        for class in [ElementClass::Point, ElementClass::Vertex, ElementClass::Primitive] {
            let dst_attrs = &self.attributes[class.slot()];
            for (name, s) in src.attributes[class.slot()].iter() {
                if let Some(d) = dst_attrs.get_dyn(name) {
                    if !same_value_type(d, s) {
                        return Err(MeshDetailError::AttributeTypeMismatch {
                            class,
                            name: name.to_string(),
                        });
                    }
                }
            }
        }

        let marker = ElementMarker::capture(self);

        // points, in offset order
        let src_points: Vec<Offset> = src.index_map(ElementClass::Point).iter_offsets().collect();
        let mut point_map = vec![Offset::INVALID; src.index_map(ElementClass::Point).offset_size()];
        let p0 = self.append_points(src_points.len());
        for (i, &p) in src_points.iter().enumerate() {
            point_map[p.get()] = p0.add(i);
        }

        // primitives with their vertices, then vertices no primitive owns
        let src_prims: Vec<Offset> = src
            .index_map(ElementClass::Primitive)
            .iter_offsets()
            .filter(|&p| src.primitive_type(p).is_some())
            .collect();
        let mut src_vertices: Vec<Offset> = Vec::with_capacity(src.vertex_count());
        let mut new_vertices: Vec<Offset> = Vec::with_capacity(src.vertex_count());
        for &prim in &src_prims {
            let (Some(type_id), list) = (src.primitive_type(prim), src.primitive_vertices(prim))
            else {
                continue;
            };
            let (dst_prim, vtx) = self.append_primitives_with_counts(type_id, &[list.len()])?;
            if src.is_primitive_closed(prim) != self.primitives.is_closed(dst_prim) {
                self.primitives
                    .set_closed(dst_prim, src.is_primitive_closed(prim));
            }
            for (k, v) in list.iter().enumerate() {
                src_vertices.push(v);
                new_vertices.push(vtx.add(k));
            }
        }
        let orphans: Vec<Offset> = src
            .index_map(ElementClass::Vertex)
            .iter_offsets()
            .filter(|&v| !src.vertex_primitive(v).is_valid())
            .collect();
        let o0 = self.append_vertices(orphans.len());
        for (k, &v) in orphans.iter().enumerate() {
            src_vertices.push(v);
            new_vertices.push(o0.add(k));
        }

        self.topology.unlink_primitive_hedges(&new_vertices);
        for (&sv, &dv) in src_vertices.iter().zip(&new_vertices) {
            let p = src.vertex_point(sv);
            if let Some(&mapped) = p.valid().and_then(|p| point_map.get(p.get())) {
                self.topology.set_vertex_point_raw(dv, mapped);
            }
        }
        if !new_vertices.is_empty() {
            self.topology.bump(Touched {
                point: true,
                chain: self.topology.tracks_point_vertices(),
                ..Touched::default()
            });
            self.topology
                .link_primitive_hedges(&new_vertices, &self.primitives);
        }

        let ranges = marker.ranges(self);
        self.merge_values(src, ElementClass::Point, &src_points, ranges.points.start);
        self.merge_values(src, ElementClass::Vertex, &src_vertices, ranges.vertices.start);
        self.merge_values(src, ElementClass::Primitive, &src_prims, ranges.primitives.start);
        self.meta_cache_count += 1;
        log::debug!(
            "merged {} points, {} vertices, {} primitives",
            ranges.points.len(),
            ranges.vertices.len(),
            ranges.primitives.len()
        );
        Ok(ranges)
    }

    /// Copies attribute values and group membership of `src_offsets` to the
    /// contiguous run starting at `dst_start`.
    fn merge_values(
        &mut self,
        src: &Detail,
        class: ElementClass,
        src_offsets: &[Offset],
        dst_start: Offset,
    ) {
        if src_offsets.is_empty() {
            return;
        }
        let slot = class.slot();
        let size = self.index_maps[slot].offset_size();
        let dst_attrs = &mut self.attributes[slot];
        for (name, s) in src.attributes[slot].iter() {
            if !dst_attrs.contains(name) {
                let mut fresh = s.empty_like();
                fresh.resize(size);
                dst_attrs.put(name, fresh);
            }
            if let Some(d) = dst_attrs.get_dyn_mut(name) {
                d.copy_from(s, src_offsets, dst_start);
            }
        }

        let src_groups = &src.groups[slot];
        for name in src_groups.names() {
            let Some(s) = src_groups.get(name) else {
                continue;
            };
            let dst_groups = &mut self.groups[slot];
            if dst_groups.get(name).is_none() {
                dst_groups.insert(ElementGroup::new(name, class, size));
            }
            if let Some(d) = dst_groups.get_mut(name) {
                for (i, &so) in src_offsets.iter().enumerate() {
                    if s.contains(so) {
                        d.set(dst_start.add(i), true);
                    }
                }
            }
        }
    }
}
