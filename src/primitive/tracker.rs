//! Running per-type primitive counts.

use hashbrown::HashMap;
use itertools::Itertools;

use crate::primitive::kind::PrimitiveTypeId;

/// Count of active primitives per type, kept incrementally so that
/// "does this detail contain type T" is O(1).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrimitiveTracker {
    counts: HashMap<PrimitiveTypeId, usize>,
    total: usize,
}

impl PrimitiveTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: PrimitiveTypeId, n: usize) {
        if n == 0 {
            return;
        }
        *self.counts.entry(id).or_insert(0) += n;
        self.total += n;
    }

    pub fn remove(&mut self, id: PrimitiveTypeId, n: usize) {
        let Some(c) = self.counts.get_mut(&id) else {
            debug_assert!(n == 0, "removing {n} untracked {id}");
            return;
        };
        debug_assert!(*c >= n, "tracker underflow for {id}");
        let n = n.min(*c);
        *c -= n;
        self.total -= n;
        if *c == 0 {
            self.counts.remove(&id);
        }
    }

    /// One primitive changed type.
    pub fn change(&mut self, from: PrimitiveTypeId, to: PrimitiveTypeId) {
        if from != to {
            self.remove(from, 1);
            self.add(to, 1);
        }
    }

    #[inline]
    pub fn contains(&self, id: PrimitiveTypeId) -> bool {
        self.counts.contains_key(&id)
    }

    #[inline]
    pub fn count(&self, id: PrimitiveTypeId) -> usize {
        self.counts.get(&id).copied().unwrap_or(0)
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Types present, in ascending id order.
    pub fn types(&self) -> Vec<PrimitiveTypeId> {
        self.counts.keys().copied().sorted().collect()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.total = 0;
    }

    /// Folds in counts gathered independently, e.g. by one worker of a
    /// parallel region.
    pub fn apply_diff(&mut self, diff: &PrimitiveTrackerDiff) {
        for (&id, &delta) in &diff.deltas {
            if delta > 0 {
                self.add(id, delta as usize);
            } else if delta < 0 {
                self.remove(id, delta.unsigned_abs() as usize);
            }
        }
    }
}

/// Signed per-type count changes, merged into a tracker with
/// [`PrimitiveTracker::apply_diff`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrimitiveTrackerDiff {
    deltas: HashMap<PrimitiveTypeId, i64>,
}

impl PrimitiveTrackerDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: PrimitiveTypeId, n: usize) {
        *self.deltas.entry(id).or_insert(0) += n as i64;
    }

    pub fn remove(&mut self, id: PrimitiveTypeId, n: usize) {
        *self.deltas.entry(id).or_insert(0) -= n as i64;
    }

    /// Combines two diffs from sibling workers.
    pub fn merge(&mut self, other: &PrimitiveTrackerDiff) {
        for (&id, &d) in &other.deltas {
            *self.deltas.entry(id).or_insert(0) += d;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.values().all(|&d| d == 0)
    }
}
