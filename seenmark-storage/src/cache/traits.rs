//! Persistent-tier backend trait and cache statistics.

use seenmark_core::PersistenceError;

use super::user_key::UserScopedKey;

/// Durable byte store behind the persistent cache tier.
///
/// Modeled on a browser's local storage: one opaque value per key, whole
/// value read and written at once. The dedup cache owns the value format and
/// serializes read-modify-write cycles itself, so implementations only need
/// to be individually atomic per call.
pub trait SeenPersistence: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn read(&self, key: &UserScopedKey) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Store `value` under `key`, replacing any previous value.
    fn write(&self, key: &UserScopedKey, value: &[u8]) -> Result<(), PersistenceError>;

    /// Delete the value under `key`. Returns whether a value existed.
    fn remove(&self, key: &UserScopedKey) -> Result<bool, PersistenceError>;
}

/// Statistics about dedup cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered by the session tier.
    pub session_hits: u64,
    /// Lookups answered by the persistent tier (and promoted).
    pub persistent_hits: u64,
    /// Lookups that found nothing in either tier.
    pub misses: u64,
    /// Persistent-tier reads or writes that failed and fell back.
    pub persist_failures: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.session_hits + self.persistent_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}
