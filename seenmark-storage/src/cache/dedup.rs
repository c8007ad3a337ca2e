//! Two-tier dedup cache.
//!
//! Answers "has this user's item already been recorded as seen" from two
//! tiers:
//!
//! - the **session tier**, an in-memory set per user that lives as long as
//!   the process and never expires;
//! - the **persistent tier**, a durable `item -> {timestamp}` map per user
//!   whose entries expire after the configured TTL.
//!
//! Presence in either tier means seen. Absence in both proves nothing about
//! the remote store. Persistent-tier failures are logged and the cache keeps
//! working from the session tier alone.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use seenmark_core::{CacheConfig, Clock, ItemId, PersistenceError, UserId};

use super::freshness::{fresh_items, prune_expired, PersistedEntry, PersistedSeenMap};
use super::traits::{CacheStats, SeenPersistence};
use super::user_key::UserScopedKey;

/// Whether the remote record behind a session entry is known to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeenPhase {
    /// Marked optimistically; the remote write is in flight or failed.
    PendingLocal,
    /// The remote record is known to exist.
    ConfirmedRemote,
}

/// Where a cache write ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// Session tier and persistent tier both updated.
    Persisted,
    /// The persistent tier failed; only the session tier holds the write.
    SessionOnly,
}

/// Result of [`DedupCache::try_claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Already in a tier; nothing changed.
    AlreadySeen,
    /// Missed, but the admission check refused. Nothing was marked.
    Refused,
    /// Missed and now marked `PendingLocal`.
    Claimed(Durability),
}

impl Durability {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Durability::SessionOnly)
    }
}

#[derive(Debug, Default)]
struct StatCounters {
    session_hits: AtomicU64,
    persistent_hits: AtomicU64,
    misses: AtomicU64,
    persist_failures: AtomicU64,
}

type SessionTier = HashMap<UserId, HashMap<ItemId, SeenPhase>>;

/// Process-wide dedup cache. Share it behind an `Arc`.
pub struct DedupCache {
    session: Mutex<SessionTier>,
    /// Serializes persistent-tier read-modify-write cycles.
    persist_lock: Mutex<()>,
    persistence: Arc<dyn SeenPersistence>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    stats: StatCounters,
}

impl DedupCache {
    pub fn new(
        persistence: Arc<dyn SeenPersistence>,
        clock: Arc<dyn Clock>,
        config: CacheConfig,
    ) -> Self {
        Self {
            session: Mutex::new(HashMap::new()),
            persist_lock: Mutex::new(()),
            persistence,
            clock,
            ttl: config.ttl,
            stats: StatCounters::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Check whether `item_id` is known seen for `user_id`.
    ///
    /// A fresh persistent-tier entry is promoted into the session tier.
    /// Expired entries read as absent but stay on disk until the next write
    /// for this user.
    pub fn is_seen(&self, user_id: &UserId, item_id: &ItemId) -> bool {
        let mut session = self.lock_session();
        self.lookup(&mut session, user_id, item_id)
    }

    /// Check and optimistically mark in one step.
    ///
    /// The session lock is held from the lookup through the `PendingLocal`
    /// insert, so concurrent claims for the same pair see exactly one
    /// `Claimed`. `admit` runs only on a miss; if it refuses, nothing is
    /// marked.
    pub fn try_claim<F>(&self, user_id: &UserId, item_id: &ItemId, admit: F) -> Claim
    where
        F: FnOnce() -> bool,
    {
        {
            let mut session = self.lock_session();
            if self.lookup(&mut session, user_id, item_id) {
                return Claim::AlreadySeen;
            }
            if !admit() {
                return Claim::Refused;
            }
            session
                .entry(user_id.clone())
                .or_default()
                .insert(item_id.clone(), SeenPhase::PendingLocal);
        }
        Claim::Claimed(self.persist(user_id, std::slice::from_ref(item_id)))
    }

    fn lookup(&self, session: &mut SessionTier, user_id: &UserId, item_id: &ItemId) -> bool {
        if session
            .get(user_id)
            .is_some_and(|items| items.contains_key(item_id))
        {
            self.stats.session_hits.fetch_add(1, Ordering::Relaxed);
            return true;
        }

        let key = UserScopedKey::new(user_id);
        let map = match self.read_map(&key) {
            Ok(map) => map,
            Err(e) => {
                self.note_degraded(user_id, "read", &e);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        let now = self.clock.now();
        let fresh = map
            .get(item_id)
            .is_some_and(|entry| entry.is_fresh(now, self.ttl));
        if fresh {
            session
                .entry(user_id.clone())
                .or_default()
                .insert(item_id.clone(), SeenPhase::ConfirmedRemote);
            self.stats.persistent_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(user_id = %user_id, item_id = %item_id, "Promoted persistent entry into session tier");
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        fresh
    }

    /// Mark one item seen in both tiers, optimistically (`PendingLocal`).
    pub fn mark_seen(&self, user_id: &UserId, item_id: &ItemId) -> Durability {
        self.record(user_id, vec![item_id.clone()], SeenPhase::PendingLocal)
    }

    /// Mark many items seen with a single persistent-tier write.
    pub fn bulk_mark_seen<I>(&self, user_id: &UserId, item_ids: I) -> Durability
    where
        I: IntoIterator<Item = ItemId>,
    {
        self.record(user_id, item_ids.into_iter().collect(), SeenPhase::PendingLocal)
    }

    /// Like [`bulk_mark_seen`](Self::bulk_mark_seen) for items whose remote
    /// records are known to exist.
    pub fn bulk_mark_confirmed<I>(&self, user_id: &UserId, item_ids: I) -> Durability
    where
        I: IntoIterator<Item = ItemId>,
    {
        self.record(user_id, item_ids.into_iter().collect(), SeenPhase::ConfirmedRemote)
    }

    /// Promote a session entry to `ConfirmedRemote`. Absent entries are left
    /// absent, so a confirmation arriving after `clear` does not resurrect it.
    pub fn confirm(&self, user_id: &UserId, item_id: &ItemId) {
        let mut session = self.lock_session();
        if let Some(phase) = session
            .get_mut(user_id)
            .and_then(|items| items.get_mut(item_id))
        {
            *phase = SeenPhase::ConfirmedRemote;
        }
    }

    /// Empty the user's session tier and delete their persistent entry.
    pub fn clear(&self, user_id: &UserId) -> Durability {
        self.lock_session().remove(user_id);

        let key = UserScopedKey::new(user_id);
        let _guard = self.lock_persist();
        match self.persistence.remove(&key) {
            Ok(_) => {
                tracing::debug!(user_id = %user_id, "Cleared seen cache");
                Durability::Persisted
            }
            Err(e) => {
                self.note_degraded(user_id, "clear", &e);
                Durability::SessionOnly
            }
        }
    }

    /// Snapshot of the user's session tier.
    pub fn session_items(&self, user_id: &UserId) -> HashSet<ItemId> {
        self.lock_session()
            .get(user_id)
            .map(|items| items.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Items marked optimistically whose remote write is not confirmed.
    pub fn pending_items(&self, user_id: &UserId) -> Vec<ItemId> {
        let mut pending: Vec<ItemId> = self
            .lock_session()
            .get(user_id)
            .map(|items| {
                items
                    .iter()
                    .filter(|(_, phase)| **phase == SeenPhase::PendingLocal)
                    .map(|(item, _)| item.clone())
                    .collect()
            })
            .unwrap_or_default();
        pending.sort();
        pending
    }

    pub fn session_phase(&self, user_id: &UserId, item_id: &ItemId) -> Option<SeenPhase> {
        self.lock_session()
            .get(user_id)
            .and_then(|items| items.get(item_id))
            .copied()
    }

    /// Fresh persistent-tier items for the user. Errors degrade to empty.
    pub fn persisted_items(&self, user_id: &UserId) -> HashSet<ItemId> {
        let key = UserScopedKey::new(user_id);
        match self.read_map(&key) {
            Ok(map) => fresh_items(&map, self.clock.now(), self.ttl).cloned().collect(),
            Err(e) => {
                self.note_degraded(user_id, "read", &e);
                HashSet::new()
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            session_hits: self.stats.session_hits.load(Ordering::Relaxed),
            persistent_hits: self.stats.persistent_hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            persist_failures: self.stats.persist_failures.load(Ordering::Relaxed),
        }
    }

    fn record(&self, user_id: &UserId, item_ids: Vec<ItemId>, phase: SeenPhase) -> Durability {
        if item_ids.is_empty() {
            return Durability::Persisted;
        }
        self.insert_session(user_id, item_ids.iter().cloned(), phase);
        self.persist(user_id, &item_ids)
    }

    /// Read-modify-write of the user's persistent map. Expired entries are
    /// pruned here and only here.
    fn persist(&self, user_id: &UserId, item_ids: &[ItemId]) -> Durability {
        let key = UserScopedKey::new(user_id);
        let _guard = self.lock_persist();

        let mut map = match self.read_map(&key) {
            Ok(map) => map,
            Err(e) => {
                self.note_degraded(user_id, "read", &e);
                return Durability::SessionOnly;
            }
        };

        let now = self.clock.now();
        let pruned = prune_expired(&mut map, now, self.ttl);
        for item_id in item_ids {
            map.insert(item_id.clone(), PersistedEntry::stamped(now));
        }

        let written = serde_json::to_vec(&map)
            .map_err(|e| PersistenceError::Serialization {
                user_id: user_id.clone(),
                reason: e.to_string(),
            })
            .and_then(|bytes| self.persistence.write(&key, &bytes));

        match written {
            Ok(()) => {
                if pruned > 0 {
                    tracing::debug!(user_id = %user_id, pruned, "Pruned expired seen entries");
                }
                Durability::Persisted
            }
            Err(e) => {
                self.note_degraded(user_id, "write", &e);
                Durability::SessionOnly
            }
        }
    }

    /// Load the raw (unfiltered) persistent map. A value that does not parse
    /// is treated as an empty map.
    fn read_map(&self, key: &UserScopedKey) -> Result<PersistedSeenMap, PersistenceError> {
        let Some(bytes) = self.persistence.read(key)? else {
            return Ok(PersistedSeenMap::new());
        };
        match serde_json::from_slice(&bytes) {
            Ok(map) => Ok(map),
            Err(e) => {
                tracing::warn!(
                    user_id = %key.user_id(),
                    error = %e,
                    "Discarding unreadable persistent seen map"
                );
                Ok(PersistedSeenMap::new())
            }
        }
    }

    fn insert_session<I>(&self, user_id: &UserId, item_ids: I, phase: SeenPhase)
    where
        I: IntoIterator<Item = ItemId>,
    {
        let mut session = self.lock_session();
        let items = session.entry(user_id.clone()).or_default();
        for item_id in item_ids {
            items
                .entry(item_id)
                .and_modify(|existing| {
                    if phase == SeenPhase::ConfirmedRemote {
                        *existing = phase;
                    }
                })
                .or_insert(phase);
        }
    }

    fn note_degraded(&self, user_id: &UserId, operation: &str, error: &PersistenceError) {
        self.stats.persist_failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            user_id = %user_id,
            operation,
            error = %error,
            "Persistent seen tier unavailable, falling back to session tier"
        );
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionTier> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_persist(&self) -> MutexGuard<'_, ()> {
        self.persist_lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for DedupCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupCache")
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish()
    }
}
