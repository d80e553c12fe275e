//! Whole-detail consistency checks.

use hashbrown::HashMap;

use super::Detail;
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshDetailError;
use crate::topology::offset::{ElementClass, Offset};

fn size_check(what: impl Into<String>, expected: usize, found: usize) -> Result<(), MeshDetailError> {
    if expected == found {
        Ok(())
    } else {
        Err(MeshDetailError::SizeMismatch {
            what: what.into(),
            expected,
            found,
        })
    }
}

impl Detail {
    fn validate_sizes(&self) -> Result<(), MeshDetailError> {
        for class in ElementClass::ALL {
            let size = self.index_map(class).offset_size();
            let attrs = self.attributes(class);
            size_check(format!("{class} attribute dictionary"), size, attrs.offset_size())?;
            for (name, a) in attrs.iter() {
                size_check(format!("{class} attribute `{name}`"), size, a.len())?;
            }
            let groups = self.groups(class);
            for name in groups.names() {
                if let Some(g) = groups.get(name) {
                    size_check(format!("{class} group `{name}`"), size, g.len_offsets())?;
                }
            }
            if class == ElementClass::Global {
                size_check("global elements", 1, self.index_map(class).len())?;
                continue;
            }
            for link in self.topology.links().filter(|l| l.owner() == class) {
                size_check(format!("link `{}`", link.name()), size, link.len())?;
            }
        }
        size_check(
            "primitive store",
            self.index_map(ElementClass::Primitive).offset_size(),
            self.primitives.offset_size(),
        )
    }

    fn validate_primitives(&self) -> Result<(), MeshDetailError> {
        let prims = self.index_map(ElementClass::Primitive);
        let vertices = self.index_map(ElementClass::Vertex);
        for o in 0..prims.offset_size() {
            let prim = Offset::new(o);
            if prims.is_active(prim) != self.primitives.contains(prim) {
                return Err(MeshDetailError::PrimitiveActivityMismatch(prim));
            }
            for v in self.primitives.vertex_list(prim).iter() {
                if !vertices.is_active(v) {
                    return Err(MeshDetailError::InactiveVertexInPrimitive {
                        primitive: prim,
                        vertex: v,
                    });
                }
                let linked = self.topology.vertex_primitive(v);
                if linked != prim {
                    return Err(MeshDetailError::VertexPrimitiveMismatch {
                        vertex: v,
                        linked,
                        listed: prim,
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_vertices(&self) -> Result<(), MeshDetailError> {
        let points = self.index_map(ElementClass::Point);
        for v in self.index_map(ElementClass::Vertex).iter_offsets() {
            let p = self.topology.vertex_point(v);
            if p.is_valid() && !points.is_active(p) {
                return Err(MeshDetailError::DanglingVertexPoint { vertex: v, point: p });
            }
            let prim = self.topology.vertex_primitive(v);
            if prim.is_valid() && self.primitives.vertex_list(prim).position(v).is_none() {
                return Err(MeshDetailError::VertexPrimitiveMismatch {
                    vertex: v,
                    linked: prim,
                    listed: Offset::INVALID,
                });
            }
        }
        Ok(())
    }

    fn validate_hedges(&self) -> Result<(), MeshDetailError> {
        if !self.topology.tracks_hedges() {
            return Ok(());
        }
        let unordered = |(a, b): (Offset, Offset)| if a <= b { (a, b) } else { (b, a) };
        let mut primaries: HashMap<(Offset, Offset), Offset> = HashMap::new();
        for h in self.index_map(ElementClass::Vertex).iter_offsets() {
            let pair = self.hedge_points(h);
            let linked = self.topology.is_linked_hedge(h);
            if pair.is_some() != linked {
                return Err(MeshDetailError::InvalidHedgeClass {
                    vertex: h,
                    reason: "hedge membership does not match the primitive boundary",
                });
            }
            let Some(pair) = pair else {
                continue;
            };
            let next = self.topology.hedge_to_next_hedge(h);
            if self.hedge_points(next).map(unordered) != Some(unordered(pair)) {
                return Err(MeshDetailError::InvalidHedgeClass {
                    vertex: h,
                    reason: "class members join different point pairs",
                });
            }
            let primary = self.topology.hedge_to_primary_hedge(h);
            if *primaries.entry(unordered(pair)).or_insert(primary) != primary {
                return Err(MeshDetailError::InvalidHedgeClass {
                    vertex: h,
                    reason: "two classes join the same point pair",
                });
            }
        }
        Ok(())
    }
}

impl DebugInvariants for Detail {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "Detail invalid");
    }

    fn validate_invariants(&self) -> Result<(), MeshDetailError> {
        for map in &self.index_maps {
            map.validate_invariants()?;
        }
        self.validate_sizes()?;
        self.topology.validate_invariants()?;
        self.primitives.validate_invariants()?;
        self.validate_primitives()?;
        self.validate_vertices()?;
        self.validate_hedges()
    }
}
