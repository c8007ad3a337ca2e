//! Two-tier dedup cache with TTL-backed persistence and per-user isolation.
//!
//! # Tiers
//!
//! The session tier is an in-memory set per user with no expiry. The
//! persistent tier is an `item -> {timestamp}` map per user held by a
//! [`SeenPersistence`] backend and filtered by TTL on every read (see
//! [`freshness`]). Presence in either tier means seen.
//!
//! # User Isolation
//!
//! Persistent-tier keys are [`UserScopedKey`]s, which can only be built from a
//! [`seenmark_core::UserId`]. There is no way to address another user's map.
//!
//! # Degradation
//!
//! Backend failures never propagate. Writes report [`Durability::SessionOnly`]
//! and the cache keeps answering from the session tier.
//!
//! # Example
//!
//! ```ignore
//! let cache = DedupCache::new(Arc::new(InMemoryPersistence::new()), clock, CacheConfig::default());
//!
//! if !cache.is_seen(&user, &item) {
//!     if cache.mark_seen(&user, &item).is_degraded() {
//!         tracing::warn!("seen mark kept for this session only");
//!     }
//! }
//! ```

pub mod dedup;
pub mod freshness;
pub mod lmdb_backend;
pub mod memory_backend;
pub mod traits;
pub mod user_key;

pub use dedup::{Claim, DedupCache, Durability, SeenPhase};
pub use freshness::{PersistedEntry, PersistedSeenMap};
pub use lmdb_backend::LmdbPersistence;
pub use memory_backend::InMemoryPersistence;
pub use traits::{CacheStats, SeenPersistence};
pub use user_key::UserScopedKey;
