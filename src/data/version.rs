//! Data ids: cheap change tracking for mutable detail structures.
//!
//! Every mutable structure (each topology link, the primitive store, each
//! attribute, each group) owns a [`VersionCounter`]. One logical change bumps
//! it exactly once. Ids are drawn from a single process-wide counter, so two
//! structures only ever share an id when one was copied from the other; equal
//! ids therefore imply equal content and [`Detail::replace_with`] can skip
//! copies on equality.
//!
//! [`Detail::replace_with`]: crate::detail::Detail::replace_with

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_DATA_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque change stamp.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct DataId(u64);

impl DataId {
    /// Draws a fresh id, strictly greater than every id handed out before.
    #[inline]
    pub fn fresh() -> Self {
        DataId(NEXT_DATA_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[inline]
    pub(crate) const fn from_raw(raw: u64) -> Self {
        DataId(raw)
    }
}

/// Per-structure monotonic version counter.
#[derive(Debug, PartialEq, Eq)]
pub struct VersionCounter {
    id: DataId,
}

impl VersionCounter {
    pub fn new() -> Self {
        VersionCounter { id: DataId::fresh() }
    }

    #[inline]
    pub fn get(&self) -> DataId {
        self.id
    }

    /// Records one logical change.
    #[inline]
    pub fn bump(&mut self) {
        self.id = DataId::fresh();
    }

    /// Takes over `source`'s id after this structure became a copy of it.
    ///
    /// The counter never moves backwards: when `source` is older the counter
    /// is bumped instead, which only costs a redundant copy next time.
    pub fn adopt(&mut self, source: DataId) {
        if source > self.id {
            self.id = source;
        } else {
            self.bump();
        }
    }
}

impl Default for VersionCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Clones keep the id: a clone has identical content.
impl Clone for VersionCounter {
    fn clone(&self) -> Self {
        VersionCounter { id: self.id }
    }
}
