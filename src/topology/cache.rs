//! Derived-data caches.

/// A structure keeping values derived from its primary contents (hardened
/// primitive records, group entry counts).
pub trait InvalidateCache {
    /// Drops every derived value; the next query recomputes it.
    fn invalidate_cache(&mut self);
}
