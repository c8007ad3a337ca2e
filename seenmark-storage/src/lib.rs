//! SEENMARK Storage - Dedup Cache and Remote Store
//!
//! The two-tier dedup cache with its persistent-tier backends, and the
//! remote seen-record store abstraction with an in-memory implementation.

pub mod cache;
pub mod remote;

pub use cache::{
    CacheStats, Claim, DedupCache, Durability, InMemoryPersistence, LmdbPersistence, PersistedEntry,
    PersistedSeenMap, SeenPersistence, SeenPhase, UserScopedKey,
};
pub use remote::{CreateOutcome, InMemorySeenStore, SeenRecordStore, StoreCallCounts, WriteMode};
