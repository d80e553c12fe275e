//! MeshDetailError: Unified error type for mesh-detail diagnostics
//!
//! Structural operations on a [`Detail`](crate::detail::Detail) never fail
//! with an error: degenerate requests are no-ops and cascade outcomes are
//! reported through [`DereferenceResult`](crate::primitive::DereferenceResult).
//! This type covers consistency checks, configuration, and dictionary or
//! registry misuse.

use crate::primitive::PrimitiveTypeId;
use crate::topology::offset::{ElementClass, Index, Offset};
use thiserror::Error;

/// Unified error type for mesh-detail operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshDetailError {
    /// A configuration value is out of its accepted range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A primitive type id was registered twice.
    #[error("primitive type `{0}` is already registered")]
    DuplicatePrimitiveType(PrimitiveTypeId),
    /// A primitive type id is not known to the registry.
    #[error("unknown primitive type `{0}`")]
    UnknownPrimitiveType(PrimitiveTypeId),
    /// An attribute or group name is already in use for this class.
    #[error("{class} attribute `{name}` already exists")]
    DuplicateAttribute { class: ElementClass, name: String },
    /// No attribute or group with this name exists for this class.
    #[error("{class} attribute `{name}` not found")]
    MissingAttribute { class: ElementClass, name: String },
    /// The attribute exists but stores a different value type.
    #[error("{class} attribute `{name}` has a different value type")]
    AttributeTypeMismatch { class: ElementClass, name: String },
    /// A reorder request was not a permutation of the active offsets.
    #[error("{class} reorder is not a permutation of the {expected} active offsets")]
    InvalidPermutation { class: ElementClass, expected: usize },

    // ----- consistency diagnostics -----
    /// Index map: the offset→index and index→offset arrays disagree.
    #[error("{class} index map: offset {offset} and index {index} do not round-trip")]
    IndexMapMismatch {
        class: ElementClass,
        offset: Offset,
        index: Index,
    },
    /// Index map: the cached active count is wrong.
    #[error("{class} index map: active count {found}, expected {expected}")]
    ActiveCountMismatch {
        class: ElementClass,
        expected: usize,
        found: usize,
    },
    /// A link or attribute array is not sized to its class.
    #[error("{what}: length {found}, expected {expected}")]
    SizeMismatch {
        what: String,
        expected: usize,
        found: usize,
    },
    /// A link value does not fit the storage width it is kept in.
    #[error("link `{link}` holds {value} which exceeds its storage width")]
    LinkWidthOverflow { link: &'static str, value: i64 },
    /// An active vertex is not wired to an active point.
    #[error("vertex {vertex} is wired to invalid point {point}")]
    DanglingVertexPoint { vertex: Offset, point: Offset },
    /// A point's vertex chain is broken or misses a vertex.
    #[error("point {point} vertex chain is inconsistent at vertex {vertex}")]
    BrokenVertexChain { point: Offset, vertex: Offset },
    /// A vertex and the primitive owning it disagree.
    #[error("vertex {vertex} links to primitive {linked}, but is listed by {listed}")]
    VertexPrimitiveMismatch {
        vertex: Offset,
        linked: Offset,
        listed: Offset,
    },
    /// A primitive lists a vertex that is not active.
    #[error("primitive {primitive} lists inactive vertex {vertex}")]
    InactiveVertexInPrimitive { primitive: Offset, vertex: Offset },
    /// Half-edge equivalence class violates an invariant.
    #[error("half-edge class of vertex {vertex} is invalid: {reason}")]
    InvalidHedgeClass { vertex: Offset, reason: &'static str },
    /// The primitive tracker disagrees with a recount.
    #[error("primitive tracker: type {type_id} counted {found}, expected {expected}")]
    TrackerMismatch {
        type_id: PrimitiveTypeId,
        expected: usize,
        found: usize,
    },
    /// The primitive store and the primitive index map disagree about activity.
    #[error("primitive {0} activity differs between the store and the index map")]
    PrimitiveActivityMismatch(Offset),
}
