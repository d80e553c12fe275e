//! Data module: versions, attributes and groups

pub mod attributes;
pub mod group;
pub mod storage;
pub mod version;

pub use attributes::AttributeDict;
pub use group::{ElementGroup, GroupDict, GroupMembership};
pub use storage::{AttributeArray, OffsetStorage, VecAttribute};
pub use version::{DataId, VersionCounter};
