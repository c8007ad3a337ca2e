//! Session-start warm-up of the dedup cache from the remote store.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use seenmark_core::{BulkLoadOptions, Clock, ItemId, ScopeId, SeenQuery, UserId};
use seenmark_storage::{DedupCache, SeenRecordStore};

/// Pre-populates the dedup cache with a user's recent seen records.
#[derive(Clone)]
pub struct BulkSeenLoader {
    cache: Arc<DedupCache>,
    store: Arc<dyn SeenRecordStore>,
    clock: Arc<dyn Clock>,
}

impl BulkSeenLoader {
    pub fn new(
        cache: Arc<DedupCache>,
        store: Arc<dyn SeenRecordStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            store,
            clock,
        }
    }

    /// Load the user's records seen within the last `options.window_days`,
    /// most recent first and at most `options.limit` of them, optionally
    /// restricted to one scope. Loaded items are marked in the cache as
    /// confirmed.
    ///
    /// Returns the user's session tier after the merge. A failed query is
    /// logged and leaves the cache as it was.
    pub async fn load(
        &self,
        user_id: &UserId,
        scope_id: Option<&ScopeId>,
        options: BulkLoadOptions,
    ) -> HashSet<ItemId> {
        if user_id.is_blank() {
            return HashSet::new();
        }
        if options.limit == 0 {
            return self.cache.session_items(user_id);
        }

        let now = self.clock.now();
        let since = now
            .checked_sub_signed(options.window())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let query = SeenQuery::new(since, options.limit).with_scope(scope_id.cloned());

        match self.store.query(user_id, &query).await {
            Ok(records) => {
                let loaded = records.len();
                let durability = self
                    .cache
                    .bulk_mark_confirmed(user_id, records.into_iter().map(|r| r.item_id));
                tracing::info!(
                    user_id = %user_id,
                    scope_id = scope_id.map(ScopeId::as_str),
                    loaded,
                    window_days = options.window_days,
                    degraded = durability.is_degraded(),
                    "Warmed seen cache"
                );
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Bulk seen load failed, using session tier"
                );
            }
        }

        self.cache.session_items(user_id)
    }
}

impl std::fmt::Debug for BulkSeenLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkSeenLoader")
            .field("cache", &self.cache)
            .finish()
    }
}
