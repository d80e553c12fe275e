//! Primitives: type registry, per-type counts, and the paged store.

pub mod kind;
pub mod store;
pub mod tracker;

pub use kind::{
    DereferencePolicy, DereferenceResult, HardenedPrimitive, PrimitiveKind, PrimitiveTypeDef,
    PrimitiveTypeId, PrimitiveTypeRegistry,
};
pub use store::{BlockVertices, PageStats, PrimitiveRef, PrimitiveStore, VertexList, VertexListRef};
pub use tracker::{PrimitiveTracker, PrimitiveTrackerDiff};
