//! Element identity and topology.
//!
//! This module provides the handles and tables that relate elements to each
//! other:
//! - [`Offset`], [`Index`] and [`ElementClass`] handles
//! - [`IndexMap`]: stable offsets mapped to dense indices per class
//! - [`LinkArray`]: element-to-element links with adaptive integer width
//! - [`TopologyLinks`]: vertex/point/primitive links and point chains
//! - half-edge equivalence classes over primitive boundaries
//!
//! Most users reach these through [`Detail`](crate::detail::Detail).

pub mod cache;
pub mod hedge;
pub mod index_map;
pub mod link;
pub mod links;
pub mod offset;

pub use cache::InvalidateCache;
pub use hedge::PrimitiveBoundary;
pub use index_map::{DefragmentOutcome, IndexMap, OffsetCursor, OffsetRemap};
pub use link::{LinkArray, LinkWidth};
pub use links::{PointVertexIter, TopologyLinks};
pub use offset::{ElementClass, Index, Offset, OffsetRange};
