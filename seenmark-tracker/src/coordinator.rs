//! Idempotent seen-record writes for one (user, item) pair.
//!
//! Each attempt runs the same sequence:
//!
//! 1. reject blank identifiers
//! 2. short-circuit if the dedup cache already knows the pair
//! 3. take a rate-limit slot (soft abort when the window is full)
//! 4. mark the pair in the cache optimistically
//! 5. write the remote record idempotently and fold conflicts into success
//!
//! Steps 2 to 4 happen under the cache's session lock via
//! [`DedupCache::try_claim`].
//!
//! Nothing is rolled back or retried. A failed remote write leaves the cache
//! entry `PendingLocal`, visible through [`DedupCache::pending_items`].

use std::sync::Arc;

use seenmark_core::{ErrorKind, ItemId, NewSeenRecord, ScopeId, UserId};
use seenmark_storage::{Claim, CreateOutcome, DedupCache, SeenRecordStore, WriteMode};
use tracing::Instrument;

use crate::rate_limit::RateLimiter;

/// Result of one write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOutcome {
    /// This attempt created the remote record.
    Created,
    /// The dedup cache already knew the pair. No network call was made.
    AlreadyCached,
    /// The existence check found a record.
    AlreadyRecorded,
    /// Another writer created the record between the check and the create.
    LostRace,
    MissingParameters,
    RateLimited,
    WriteFailed,
}

impl WriteOutcome {
    /// Whether this attempt created the remote record.
    pub fn wrote(&self) -> bool {
        matches!(self, WriteOutcome::Created)
    }

    /// The caller-facing error, if the attempt failed.
    pub fn error(&self) -> Option<ErrorKind> {
        match self {
            WriteOutcome::MissingParameters => Some(ErrorKind::MissingParameters),
            WriteOutcome::RateLimited => Some(ErrorKind::RateLimited),
            WriteOutcome::WriteFailed => Some(ErrorKind::WriteFailed),
            WriteOutcome::Created
            | WriteOutcome::AlreadyCached
            | WriteOutcome::AlreadyRecorded
            | WriteOutcome::LostRace => None,
        }
    }

    /// Whether the caller should stop watching the item. Only a rate-limited
    /// attempt is worth repeating.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WriteOutcome::RateLimited)
    }

    /// Whether the remote record is known to exist after this attempt.
    pub fn confirms_remote(&self) -> bool {
        matches!(
            self,
            WriteOutcome::Created | WriteOutcome::AlreadyRecorded | WriteOutcome::LostRace
        )
    }
}

/// Orchestrates cache, rate limiter and remote store for write attempts.
///
/// Cheap to clone; every clone shares the same cache, limiter and store.
#[derive(Clone)]
pub struct SeenWriteCoordinator {
    cache: Arc<DedupCache>,
    limiter: Arc<RateLimiter>,
    store: Arc<dyn SeenRecordStore>,
}

impl SeenWriteCoordinator {
    pub fn new(
        cache: Arc<DedupCache>,
        limiter: Arc<RateLimiter>,
        store: Arc<dyn SeenRecordStore>,
    ) -> Self {
        Self {
            cache,
            limiter,
            store,
        }
    }

    pub fn cache(&self) -> &Arc<DedupCache> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Record that `user_id` has seen `item_id` within `scope_id`, at most
    /// once across every writer.
    pub async fn attempt_mark_seen(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
        scope_id: &ScopeId,
    ) -> WriteOutcome {
        let span = tracing::info_span!(
            "seen_write",
            user_id = %user_id,
            item_id = %item_id,
            scope_id = %scope_id,
        );
        self.attempt(user_id, item_id, scope_id)
            .instrument(span)
            .await
    }

    async fn attempt(&self, user_id: &UserId, item_id: &ItemId, scope_id: &ScopeId) -> WriteOutcome {
        if user_id.is_blank() || item_id.is_blank() || scope_id.is_blank() {
            tracing::debug!("Missing identifier, skipping seen write");
            return WriteOutcome::MissingParameters;
        }

        // Lookup, limiter slot and optimistic mark are one step, so a
        // concurrent attempt for the same pair stops here.
        match self
            .cache
            .try_claim(user_id, item_id, || self.limiter.try_acquire())
        {
            Claim::AlreadySeen => {
                tracing::debug!("Already seen, skipping remote write");
                return WriteOutcome::AlreadyCached;
            }
            Claim::Refused => {
                tracing::warn!(
                    remaining = self.limiter.remaining(),
                    "Seen write rate limited"
                );
                return WriteOutcome::RateLimited;
            }
            Claim::Claimed(_) => {}
        }

        let record = NewSeenRecord::new(user_id.clone(), item_id.clone(), scope_id.clone());
        let outcome = match self.store.write_mode() {
            WriteMode::Conditional => self.write_conditional(record).await,
            WriteMode::CheckThenCreate => self.write_check_then_create(record).await,
        };

        if outcome.confirms_remote() {
            self.cache.confirm(user_id, item_id);
        }
        outcome
    }

    async fn write_conditional(&self, record: NewSeenRecord) -> WriteOutcome {
        match self.store.create_if_absent(record).await {
            Ok(CreateOutcome::Created(created)) => {
                tracing::info!(seen_at = %created.seen_at, "Seen record created");
                WriteOutcome::Created
            }
            Ok(CreateOutcome::AlreadyExists) => {
                tracing::debug!("Seen record already exists");
                WriteOutcome::AlreadyRecorded
            }
            Err(e) => {
                tracing::warn!(error = %e, "Conditional seen write failed");
                WriteOutcome::WriteFailed
            }
        }
    }

    async fn write_check_then_create(&self, record: NewSeenRecord) -> WriteOutcome {
        match self.store.get(&record.user_id, &record.item_id).await {
            Ok(Some(_)) => {
                tracing::debug!("Seen record already exists");
                return WriteOutcome::AlreadyRecorded;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Seen record existence check failed");
                return WriteOutcome::WriteFailed;
            }
        }

        match self.store.create(record).await {
            Ok(created) => {
                tracing::info!(seen_at = %created.seen_at, "Seen record created");
                WriteOutcome::Created
            }
            Err(e) if e.is_conflict() => {
                tracing::debug!("Lost create race, record exists");
                WriteOutcome::LostRace
            }
            Err(e) => {
                tracing::warn!(error = %e, "Seen record create failed");
                WriteOutcome::WriteFailed
            }
        }
    }
}

impl std::fmt::Debug for SeenWriteCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeenWriteCoordinator")
            .field("cache", &self.cache)
            .field("limiter", &self.limiter)
            .field("write_mode", &self.store.write_mode())
            .finish()
    }
}
