//! Primitive types: ids, definitions, the registry, and the hardened
//! per-primitive kinds.

use std::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::mesh_error::MeshDetailError;
use crate::topology::offset::Offset;

/// Registered primitive type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PrimitiveTypeId(pub u32);

impl PrimitiveTypeId {
    pub const POLYGON: PrimitiveTypeId = PrimitiveTypeId(1);
    pub const POLYLINE: PrimitiveTypeId = PrimitiveTypeId(2);
    pub const TETRAHEDRON: PrimitiveTypeId = PrimitiveTypeId(3);
    pub const SPHERE: PrimitiveTypeId = PrimitiveTypeId(4);

    /// First id free for user types.
    pub const FIRST_CUSTOM: u32 = 1000;
}

impl fmt::Display for PrimitiveTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

/// How a primitive reacts to losing one of its points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DereferenceResult {
    /// The primitive cannot drop the point.
    Fail,
    /// The primitive drops its vertices on the point and stays valid.
    Ok,
    /// Dropping the vertices leaves the primitive degenerate.
    Degenerate,
    /// The primitive should be destroyed along with the point.
    Destroy,
}

/// Per-type dereference behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DereferencePolicy {
    /// Remove the vertices on the point; fewer than `min_vertices` left is
    /// degenerate, none left means destroy.
    DropVertices { min_vertices: usize },
    /// Never give up a point.
    Refuse,
    /// Destroy the primitive whenever one of its points goes away.
    DestroySelf,
}

/// Static description of a primitive type.
#[derive(Clone, Debug, PartialEq)]
pub struct PrimitiveTypeDef {
    pub id: PrimitiveTypeId,
    pub name: String,
    /// `Some(n)` when every primitive of the type has exactly `n` vertices.
    pub fixed_vertex_count: Option<usize>,
    /// Closed flag given to new primitives.
    pub closed_by_default: bool,
    pub has_local_transform: bool,
    pub supports_half_edges: bool,
    pub dereference: DereferencePolicy,
}

impl PrimitiveTypeDef {
    pub fn polygon() -> Self {
        PrimitiveTypeDef {
            id: PrimitiveTypeId::POLYGON,
            name: "polygon".into(),
            fixed_vertex_count: None,
            closed_by_default: true,
            has_local_transform: false,
            supports_half_edges: true,
            dereference: DereferencePolicy::DropVertices { min_vertices: 3 },
        }
    }

    pub fn polyline() -> Self {
        PrimitiveTypeDef {
            id: PrimitiveTypeId::POLYLINE,
            name: "polyline".into(),
            fixed_vertex_count: None,
            closed_by_default: false,
            has_local_transform: false,
            supports_half_edges: true,
            dereference: DereferencePolicy::DropVertices { min_vertices: 2 },
        }
    }

    pub fn tetrahedron() -> Self {
        PrimitiveTypeDef {
            id: PrimitiveTypeId::TETRAHEDRON,
            name: "tetrahedron".into(),
            fixed_vertex_count: Some(4),
            closed_by_default: true,
            has_local_transform: false,
            supports_half_edges: false,
            dereference: DereferencePolicy::Refuse,
        }
    }

    pub fn sphere() -> Self {
        PrimitiveTypeDef {
            id: PrimitiveTypeId::SPHERE,
            name: "sphere".into(),
            fixed_vertex_count: Some(1),
            closed_by_default: true,
            has_local_transform: true,
            supports_half_edges: false,
            dereference: DereferencePolicy::DestroySelf,
        }
    }

    /// A user type with no hedges and no local transform.
    pub fn custom(id: u32, name: &str, dereference: DereferencePolicy) -> Self {
        PrimitiveTypeDef {
            id: PrimitiveTypeId(id),
            name: name.to_string(),
            fixed_vertex_count: None,
            closed_by_default: false,
            has_local_transform: false,
            supports_half_edges: false,
            dereference,
        }
    }

    #[inline]
    pub fn is_fixed_vertex_count(&self) -> bool {
        self.fixed_vertex_count.is_some()
    }

    /// What would happen to a primitive whose vertices sit on
    /// `vertex_points` if `point` were removed. Evaluating this changes
    /// nothing; it is the dry run of the cascade.
    pub fn dereference_point(&self, vertex_points: &[Offset], point: Offset) -> DereferenceResult {
        let on_point = vertex_points.iter().filter(|&&p| p == point).count();
        if on_point == 0 {
            return DereferenceResult::Ok;
        }
        match self.dereference {
            DereferencePolicy::Refuse => DereferenceResult::Fail,
            DereferencePolicy::DestroySelf => DereferenceResult::Destroy,
            DereferencePolicy::DropVertices { min_vertices } => {
                let remaining = vertex_points.len() - on_point;
                if remaining == 0 {
                    DereferenceResult::Destroy
                } else if remaining < min_vertices {
                    DereferenceResult::Degenerate
                } else {
                    DereferenceResult::Ok
                }
            }
        }
    }
}

/// Primitive types known to a detail.
#[derive(Clone, Debug, Default)]
pub struct PrimitiveTypeRegistry {
    types: HashMap<PrimitiveTypeId, PrimitiveTypeDef>,
}

impl PrimitiveTypeRegistry {
    /// Registry with no types at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with polygon, polyline, tetrahedron, and sphere.
    pub fn with_builtins() -> Self {
        let mut r = Self::empty();
        for def in [
            PrimitiveTypeDef::polygon(),
            PrimitiveTypeDef::polyline(),
            PrimitiveTypeDef::tetrahedron(),
            PrimitiveTypeDef::sphere(),
        ] {
            r.types.insert(def.id, def);
        }
        r
    }

    pub fn register(&mut self, def: PrimitiveTypeDef) -> Result<(), MeshDetailError> {
        if self.types.contains_key(&def.id) {
            return Err(MeshDetailError::DuplicatePrimitiveType(def.id));
        }
        self.types.insert(def.id, def);
        Ok(())
    }

    #[inline]
    pub fn get(&self, id: PrimitiveTypeId) -> Option<&PrimitiveTypeDef> {
        self.types.get(&id)
    }

    pub fn require(&self, id: PrimitiveTypeId) -> Result<&PrimitiveTypeDef, MeshDetailError> {
        self.get(id).ok_or(MeshDetailError::UnknownPrimitiveType(id))
    }

    pub fn contains(&self, id: PrimitiveTypeId) -> bool {
        self.types.contains_key(&id)
    }

    /// Definitions in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &PrimitiveTypeDef> {
        let mut defs: Vec<_> = self.types.values().collect();
        defs.sort_by_key(|d| d.id);
        defs.into_iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Type-specific payload of a hardened primitive.
#[derive(Clone, Debug, PartialEq)]
pub enum PrimitiveKind {
    Polygon,
    Polyline,
    Tetrahedron,
    Sphere { transform: [[f64; 3]; 3] },
    Custom(PrimitiveTypeId),
}

impl PrimitiveKind {
    pub fn for_type(def: &PrimitiveTypeDef) -> Self {
        match def.id {
            PrimitiveTypeId::POLYGON => PrimitiveKind::Polygon,
            PrimitiveTypeId::POLYLINE => PrimitiveKind::Polyline,
            PrimitiveTypeId::TETRAHEDRON => PrimitiveKind::Tetrahedron,
            PrimitiveTypeId::SPHERE => PrimitiveKind::Sphere {
                transform: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            },
            id => PrimitiveKind::Custom(id),
        }
    }

    pub fn type_id(&self) -> PrimitiveTypeId {
        match self {
            PrimitiveKind::Polygon => PrimitiveTypeId::POLYGON,
            PrimitiveKind::Polyline => PrimitiveTypeId::POLYLINE,
            PrimitiveKind::Tetrahedron => PrimitiveTypeId::TETRAHEDRON,
            PrimitiveKind::Sphere { .. } => PrimitiveTypeId::SPHERE,
            PrimitiveKind::Custom(id) => *id,
        }
    }
}

/// One primitive with its own vertex list, for code that needs
/// type-specific behaviour.
#[derive(Clone, Debug, PartialEq)]
pub struct HardenedPrimitive {
    pub offset: Offset,
    pub kind: PrimitiveKind,
    pub closed: bool,
    pub vertices: Vec<Offset>,
}

impl HardenedPrimitive {
    /// Number of distinct boundary edges.
    pub fn edge_count(&self) -> usize {
        let n = self.vertices.len();
        match self.kind {
            PrimitiveKind::Tetrahedron => 6,
            PrimitiveKind::Sphere { .. } => 0,
            _ if n < 2 => 0,
            _ if self.closed && n > 2 => n,
            _ => n - 1,
        }
    }

    /// Too few vertices to describe its shape.
    pub fn is_degenerate(&self) -> bool {
        let n = self.vertices.len();
        match self.kind {
            PrimitiveKind::Polygon => n < 3,
            PrimitiveKind::Polyline => n < 2,
            PrimitiveKind::Tetrahedron => n != 4,
            PrimitiveKind::Sphere { .. } => n != 1,
            PrimitiveKind::Custom(_) => n == 0,
        }
    }

    /// Local frame, for types that carry one.
    pub fn local_transform(&self) -> Option<&[[f64; 3]; 3]> {
        match &self.kind {
            PrimitiveKind::Sphere { transform } => Some(transform),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(v: &[usize]) -> Vec<Offset> {
        v.iter().map(|&i| Offset::new(i)).collect()
    }

    #[test]
    fn polygon_dereference_ladder() {
        let def = PrimitiveTypeDef::polygon();
        let quad = pts(&[0, 1, 2, 3]);
        assert_eq!(def.dereference_point(&quad, Offset::new(1)), DereferenceResult::Ok);
        let tri = pts(&[0, 1, 2]);
        assert_eq!(def.dereference_point(&tri, Offset::new(1)), DereferenceResult::Degenerate);
        let one = pts(&[5, 5]);
        assert_eq!(def.dereference_point(&one, Offset::new(5)), DereferenceResult::Destroy);
        assert_eq!(def.dereference_point(&tri, Offset::new(9)), DereferenceResult::Ok);
    }

    #[test]
    fn fixed_types() {
        let tet = PrimitiveTypeDef::tetrahedron();
        let t = pts(&[0, 1, 2, 3]);
        assert_eq!(tet.dereference_point(&t, Offset::new(0)), DereferenceResult::Fail);
        let sphere = PrimitiveTypeDef::sphere();
        assert_eq!(
            sphere.dereference_point(&pts(&[7]), Offset::new(7)),
            DereferenceResult::Destroy
        );
        assert!(sphere.has_local_transform);
    }

    #[test]
    fn registry_rejects_duplicates() {
        let mut r = PrimitiveTypeRegistry::with_builtins();
        assert_eq!(r.len(), 4);
        assert_eq!(
            r.register(PrimitiveTypeDef::polygon()),
            Err(MeshDetailError::DuplicatePrimitiveType(PrimitiveTypeId::POLYGON))
        );
        r.register(PrimitiveTypeDef::custom(
            PrimitiveTypeId::FIRST_CUSTOM,
            "blob",
            DereferencePolicy::DestroySelf,
        ))
        .unwrap();
        assert!(r.require(PrimitiveTypeId(PrimitiveTypeId::FIRST_CUSTOM)).is_ok());
        assert!(r.require(PrimitiveTypeId(77)).is_err());
        let ids: Vec<_> = r.iter().map(|d| d.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 1000]);
    }

    #[test]
    fn hardened_behaviour_per_kind() {
        let def = PrimitiveTypeDef::polygon();
        let p = HardenedPrimitive {
            offset: Offset::new(0),
            kind: PrimitiveKind::for_type(&def),
            closed: true,
            vertices: pts(&[0, 1, 2]),
        };
        assert_eq!(p.edge_count(), 3);
        assert!(!p.is_degenerate());
        let s = HardenedPrimitive {
            offset: Offset::new(1),
            kind: PrimitiveKind::for_type(&PrimitiveTypeDef::sphere()),
            closed: true,
            vertices: pts(&[3]),
        };
        assert!(s.local_transform().is_some());
        assert_eq!(s.kind.type_id(), PrimitiveTypeId::SPHERE);
    }
}
