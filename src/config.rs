//! Detail configuration.
//!
//! All knobs are tuning constants: they affect memory use and speed, never
//! correctness. Every struct implements `Default` with the values a detail
//! uses when built with [`Detail::new`](crate::detail::Detail::new).

use serde::{Deserialize, Serialize};

use crate::mesh_error::MeshDetailError;
use crate::topology::link::LinkWidth;

/// Which optional topology links a detail maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyOptions {
    /// Keep the point → vertex chain ("full" topology). Without it, queries
    /// for the vertices of a point fall back to a scan.
    pub track_point_vertices: bool,
    /// Keep half-edge equivalence classes. Implies `track_point_vertices`.
    pub track_hedges: bool,
}

impl Default for TopologyOptions {
    fn default() -> Self {
        Self {
            track_point_vertices: true,
            track_hedges: false,
        }
    }
}

impl TopologyOptions {
    /// Only the vertex → point and vertex → primitive links.
    pub fn minimal() -> Self {
        Self {
            track_point_vertices: false,
            track_hedges: false,
        }
    }

    /// Everything, including half-edges.
    pub fn with_hedges() -> Self {
        Self {
            track_point_vertices: true,
            track_hedges: true,
        }
    }
}

/// Watermarks for re-encoding topology links at a different integer width.
///
/// Both fractions are relative to the largest value a width can represent.
/// A link widens when its required maximum exceeds `widen_fraction` of the
/// current width, and narrows only when the required maximum drops below
/// `narrow_fraction` of the narrower width. The gap between the two keeps a
/// class oscillating around a boundary from re-encoding on every change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkWidthPolicy {
    pub widen_fraction: f64,
    pub narrow_fraction: f64,
    /// Never store links narrower than this.
    pub min_width: LinkWidth,
}

impl Default for LinkWidthPolicy {
    fn default() -> Self {
        Self {
            widen_fraction: 1.0,
            narrow_fraction: 0.5,
            min_width: LinkWidth::W16,
        }
    }
}

/// Primitive store layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimitiveStoreOptions {
    /// Primitives per page is `1 << page_bits`.
    pub page_bits: u32,
    /// Most explicit primitive records kept around by `stash_all`.
    pub stash_limit: usize,
}

impl Default for PrimitiveStoreOptions {
    fn default() -> Self {
        Self {
            page_bits: 10,
            stash_limit: usize::MAX,
        }
    }
}

/// Options for [`Detail::defragment`](crate::detail::Detail::defragment).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DefragmentOptions {
    /// Also compact offsets, not only indices.
    pub remove_holes: bool,
    /// Skip a class whose vacant fraction of the offset space is below this.
    pub min_hole_fraction: f64,
}

impl Default for DefragmentOptions {
    fn default() -> Self {
        Self {
            remove_holes: true,
            min_hole_fraction: 0.0,
        }
    }
}

impl DefragmentOptions {
    /// Index compaction only; offsets stay put.
    pub fn indices_only() -> Self {
        Self {
            remove_holes: false,
            min_hole_fraction: 0.0,
        }
    }
}

/// Top-level detail configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailConfig {
    pub topology: TopologyOptions,
    pub link_width: LinkWidthPolicy,
    pub primitives: PrimitiveStoreOptions,
    pub defragment: DefragmentOptions,
}

impl DetailConfig {
    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), MeshDetailError> {
        let lw = &self.link_width;
        if !(lw.widen_fraction > 0.0 && lw.widen_fraction <= 1.0) {
            return Err(MeshDetailError::InvalidConfig(format!(
                "link_width.widen_fraction must be in (0, 1], got {}",
                lw.widen_fraction
            )));
        }
        if !(lw.narrow_fraction > 0.0 && lw.narrow_fraction < lw.widen_fraction) {
            return Err(MeshDetailError::InvalidConfig(format!(
                "link_width.narrow_fraction must be in (0, widen_fraction), got {}",
                lw.narrow_fraction
            )));
        }
        if !(4..=20).contains(&self.primitives.page_bits) {
            return Err(MeshDetailError::InvalidConfig(format!(
                "primitives.page_bits must be in 4..=20, got {}",
                self.primitives.page_bits
            )));
        }
        if !(0.0..=1.0).contains(&self.defragment.min_hole_fraction) {
            return Err(MeshDetailError::InvalidConfig(format!(
                "defragment.min_hole_fraction must be in [0, 1], got {}",
                self.defragment.min_hole_fraction
            )));
        }
        Ok(())
    }

    /// Effective topology options: hedges force point → vertex tracking.
    pub fn effective_topology(&self) -> TopologyOptions {
        let t = self.topology;
        TopologyOptions {
            track_point_vertices: t.track_point_vertices || t.track_hedges,
            track_hedges: t.track_hedges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        DetailConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_inverted_watermarks() {
        let mut c = DetailConfig::default();
        c.link_width.narrow_fraction = 1.0;
        assert!(matches!(c.validate(), Err(MeshDetailError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_page_bits() {
        let mut c = DetailConfig::default();
        c.primitives.page_bits = 2;
        assert!(c.validate().is_err());
    }

    #[test]
    fn hedges_imply_point_vertices() {
        let mut c = DetailConfig::default();
        c.topology = TopologyOptions {
            track_point_vertices: false,
            track_hedges: true,
        };
        assert!(c.effective_topology().track_point_vertices);
    }

    #[test]
    fn json_roundtrip() {
        let mut c = DetailConfig::default();
        c.topology = TopologyOptions::with_hedges();
        c.link_width.min_width = LinkWidth::W32;
        let s = serde_json::to_string(&c).unwrap();
        let back: DetailConfig = serde_json::from_str(&s).unwrap();
        assert_eq!(back, c);
    }
}
