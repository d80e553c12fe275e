#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-detail
//!
//! mesh-detail is an in-memory geometry store. A [`Detail`](detail::Detail)
//! holds points, vertices, primitives and one global record, keeps their
//! identities stable under heavy partial mutation, and keeps their
//! attributes and topological relationships consistent through append,
//! destroy, reorder, merge and defragment.
//!
//! ## Features
//! - Stable offsets with dense, reorderable indices per element class
//! - Topology links stored at 16, 32 or 64 bits and re-encoded as a class grows
//! - Point → vertex chains and half-edge equivalence classes, both optional
//! - Paged primitive storage with uniform-run compression and stashing
//! - Point destruction with a dry-run dereference cascade
//! - Data ids drawn from one process-wide counter: equal ids mean equal content
//!
//! ## Usage
//! ```
//! use mesh_detail::prelude::*;
//!
//! let mut detail = Detail::new();
//! let p = detail.append_points(3);
//! let tri = detail
//!     .append_primitive_with_points(
//!         PrimitiveTypeId::POLYGON,
//!         &[p, p.add(1), p.add(2)],
//!     )
//!     .unwrap();
//! assert_eq!(detail.primitive_points(tri).len(), 3);
//! ```
//!
//! ## Versioning
//!
//! Every index map, link, attribute, group and the primitive store carries a
//! data id that changes whenever its content does. Copies keep the id, so
//! [`Detail::replace_with`](detail::Detail::replace_with) can skip every part
//! whose id already matches.
//!
//! ## Feature flags
//! - `rayon`: build hardened primitive records in parallel
//! - `check-invariants`: run [`DebugInvariants`] checks in release builds

pub mod config;
pub mod data;
pub mod debug_invariants;
pub mod detail;
pub mod mesh_error;
pub mod primitive;
pub mod topology;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::config::{
        DefragmentOptions, DetailConfig, LinkWidthPolicy, PrimitiveStoreOptions, TopologyOptions,
    };
    pub use crate::data::{AttributeArray, DataId, ElementGroup, GroupMembership, VecAttribute};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::detail::{
        CascadePlan, DestroyMode, Detail, ElementMarker, MarkedRanges, ReplaceStats,
    };
    pub use crate::mesh_error::MeshDetailError;
    pub use crate::primitive::{
        DereferencePolicy, DereferenceResult, PrimitiveTypeDef, PrimitiveTypeId,
        PrimitiveTypeRegistry,
    };
    pub use crate::topology::{ElementClass, Index, InvalidateCache, LinkWidth, Offset, OffsetRange};
}
