//! Application context owning the process-wide seen-tracking singletons.

use std::collections::HashSet;
use std::sync::Arc;

use seenmark_core::{
    Clock, ConfigError, ItemId, ScopeId, TrackerConfig, UserId, VisibilityOptions,
};
use seenmark_storage::{DedupCache, Durability, SeenPersistence, SeenRecordStore};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::coordinator::{SeenWriteCoordinator, WriteOutcome};
use crate::loader::BulkSeenLoader;
use crate::rate_limit::RateLimiter;
use crate::visibility::{VisibilityFeed, VisibilityObserver, WeakVisibilityFeed};

/// One dedup cache, one rate limiter and one remote store for the whole
/// process, plus the configuration they were built from.
///
/// # Example
///
/// ```ignore
/// let session = SeenSession::new(TrackerConfig::from_env(), store, persistence, Arc::new(SystemClock))?;
/// session.warm_up(&user, Some(&campus)).await;
///
/// // One per rendered post
/// let tracked = session.track(&feed, user.clone(), post_id, campus.clone());
/// ```
pub struct SeenSession {
    config: TrackerConfig,
    cache: Arc<DedupCache>,
    limiter: Arc<RateLimiter>,
    store: Arc<dyn SeenRecordStore>,
    clock: Arc<dyn Clock>,
}

impl SeenSession {
    pub fn new(
        config: TrackerConfig,
        store: Arc<dyn SeenRecordStore>,
        persistence: Arc<dyn SeenPersistence>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let cache = Arc::new(DedupCache::new(
            persistence,
            clock.clone(),
            config.cache.clone(),
        ));
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit, clock.clone()));

        tracing::debug!(
            max_ops = config.rate_limit.max_ops,
            ttl_ms = config.cache.ttl.as_millis() as u64,
            write_mode = ?store.write_mode(),
            "Seen session created"
        );

        Ok(Self {
            config,
            cache,
            limiter,
            store,
            clock,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<DedupCache> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn coordinator(&self) -> SeenWriteCoordinator {
        SeenWriteCoordinator::new(self.cache.clone(), self.limiter.clone(), self.store.clone())
    }

    pub fn loader(&self) -> BulkSeenLoader {
        BulkSeenLoader::new(self.cache.clone(), self.store.clone(), self.clock.clone())
    }

    /// Warm the cache for `user_id` with the configured window and limit.
    pub async fn warm_up(&self, user_id: &UserId, scope_id: Option<&ScopeId>) -> HashSet<ItemId> {
        self.loader()
            .load(user_id, scope_id, self.config.bulk_load)
            .await
    }

    /// Watch one rendered item and record it as seen once it has been
    /// visible long enough.
    ///
    /// A rate-limited attempt re-attaches and waits for the next qualifying
    /// visibility period. Any other outcome ends tracking.
    pub fn track(
        &self,
        feed: &VisibilityFeed,
        user_id: UserId,
        item_id: ItemId,
        scope_id: ScopeId,
    ) -> TrackedItem {
        let (cancel, cancel_rx) = watch::channel(false);

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(item_id = %item_id, error = %e, "Cannot track item outside a runtime");
                return TrackedItem { cancel, task: None };
            }
        };

        let task = runtime.spawn(drive_item(
            feed.downgrade(),
            self.config.visibility,
            self.coordinator(),
            cancel_rx,
            (user_id, item_id, scope_id),
        ));

        TrackedItem {
            cancel,
            task: Some(task),
        }
    }

    /// Forget everything cached for `user_id`.
    pub fn logout(&self, user_id: &UserId) -> Durability {
        tracing::info!(user_id = %user_id, "Clearing seen cache on logout");
        self.cache.clear(user_id)
    }
}

impl std::fmt::Debug for SeenSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeenSession")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("limiter", &self.limiter)
            .finish()
    }
}

/// Attach, wait for the observer to fire, write. Repeats only while the
/// coordinator answers `RateLimited`.
async fn drive_item(
    feed: WeakVisibilityFeed,
    options: VisibilityOptions,
    coordinator: SeenWriteCoordinator,
    mut cancel_rx: watch::Receiver<bool>,
    (user_id, item_id, scope_id): (UserId, ItemId, ScopeId),
) -> Option<WriteOutcome> {
    loop {
        if *cancel_rx.borrow_and_update() {
            return None;
        }
        let Some(element) = feed.upgrade() else {
            tracing::debug!(item_id = %item_id, "Element unmounted before it was seen");
            return None;
        };

        let (fired_tx, fired_rx) = oneshot::channel();
        let observer = VisibilityObserver::attach(&element, options, move || {
            let _ = fired_tx.send(());
        });
        // The observer only needs its own subscription.
        drop(element);

        tokio::select! {
            biased;

            _ = cancel_rx.changed() => {
                observer.detach();
                return None;
            }

            fired = fired_rx => {
                if fired.is_err() {
                    // Detached without firing: the element went away.
                    return None;
                }
            }
        }
        drop(observer);

        let outcome = coordinator
            .attempt_mark_seen(&user_id, &item_id, &scope_id)
            .await;
        if outcome.is_terminal() {
            return Some(outcome);
        }
        tracing::debug!(item_id = %item_id, "Re-attaching after rate limit");
    }
}

/// Handle to one tracked item. Dropping it stops tracking.
#[derive(Debug)]
pub struct TrackedItem {
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<Option<WriteOutcome>>>,
}

impl TrackedItem {
    /// Stop watching the item. A remote write already in flight completes.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the terminal outcome. `None` if tracking stopped first.
    pub async fn outcome(mut self) -> Option<WriteOutcome> {
        let task = self.task.take()?;
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "Seen tracking task failed");
                None
            }
        }
    }
}

impl Drop for TrackedItem {
    fn drop(&mut self) {
        self.cancel();
    }
}
