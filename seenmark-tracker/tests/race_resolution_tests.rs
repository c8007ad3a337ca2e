//! Cross-tab race resolution.
//!
//! Each "tab" has its own dedup cache and rate limiter, as separate browser
//! tabs or devices would; they share only the remote store.

use std::sync::Arc;
use std::time::Duration;

use seenmark_core::{
    CacheConfig, ItemId, ManualClock, PersistenceError, RateLimitConfig, ScopeId, UserId,
};
use seenmark_storage::{
    DedupCache, InMemoryPersistence, InMemorySeenStore, SeenPersistence, SeenRecordStore,
    UserScopedKey, WriteMode,
};
use seenmark_test_utils::assertions::assert_single_record;
use seenmark_test_utils::{init_test_tracing, RacingStore};
use seenmark_tracker::{RateLimiter, SeenWriteCoordinator, WriteOutcome};

fn tab(store: Arc<dyn SeenRecordStore>, clock: &Arc<ManualClock>) -> SeenWriteCoordinator {
    let cache = Arc::new(DedupCache::new(
        Arc::new(InMemoryPersistence::new()),
        clock.clone(),
        CacheConfig::default(),
    ));
    let limiter = Arc::new(RateLimiter::new(
        &RateLimitConfig {
            max_ops: 60,
            window: Duration::from_secs(60),
        },
        clock.clone(),
    ));
    SeenWriteCoordinator::new(cache, limiter, store)
}

/// Persistent tier whose reads take a while, so concurrent cache lookups
/// overlap.
struct SlowPersistence {
    inner: InMemoryPersistence,
    delay: Duration,
}

impl SeenPersistence for SlowPersistence {
    fn read(&self, key: &UserScopedKey) -> Result<Option<Vec<u8>>, PersistenceError> {
        std::thread::sleep(self.delay);
        self.inner.read(key)
    }

    fn write(&self, key: &UserScopedKey, value: &[u8]) -> Result<(), PersistenceError> {
        self.inner.write(key, value)
    }

    fn remove(&self, key: &UserScopedKey) -> Result<bool, PersistenceError> {
        self.inner.remove(key)
    }
}

fn ids() -> (UserId, ItemId, ScopeId) {
    (UserId::new("u1"), ItemId::new("p1"), ScopeId::new("c1"))
}

#[tokio::test]
async fn test_two_tabs_one_record() {
    init_test_tracing();
    let clock = Arc::new(ManualClock::starting_now());
    let inner = Arc::new(InMemorySeenStore::new(clock.clone()));
    let racing = RacingStore::new(inner.clone(), 2);
    let first = tab(Arc::new(racing.clone()), &clock);
    let second = tab(Arc::new(racing), &clock);
    let (u, i, s) = ids();

    let (a, b) = tokio::join!(
        first.attempt_mark_seen(&u, &i, &s),
        second.attempt_mark_seen(&u, &i, &s),
    );

    let mut outcomes = [a, b];
    outcomes.sort_by_key(|o| !o.wrote());
    assert_eq!(outcomes, [WriteOutcome::Created, WriteOutcome::LostRace]);
    assert!(outcomes.iter().all(|o| o.error().is_none()));
    assert_single_record(&inner, &u, &i);

    // Both tabs now know the record exists.
    for coordinator in [&first, &second] {
        assert!(coordinator.cache().pending_items(&u).is_empty());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_devices_one_record() {
    init_test_tracing();
    const DEVICES: usize = 6;
    let clock = Arc::new(ManualClock::starting_now());
    let inner = Arc::new(InMemorySeenStore::new(clock.clone()));
    let racing = RacingStore::new(inner.clone(), DEVICES);

    let handles: Vec<_> = (0..DEVICES)
        .map(|_| {
            let coordinator = tab(Arc::new(racing.clone()), &clock);
            tokio::spawn(async move {
                let (u, i, s) = ids();
                coordinator.attempt_mark_seen(&u, &i, &s).await
            })
        })
        .collect();

    let mut created = 0;
    let mut lost = 0;
    for handle in handles {
        match handle.await.expect("task should not panic") {
            WriteOutcome::Created => created += 1,
            WriteOutcome::LostRace => lost += 1,
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(lost, DEVICES - 1);
    assert_eq!(inner.record_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_conditional_store_has_no_race_window() {
    init_test_tracing();
    let clock = Arc::new(ManualClock::starting_now());
    let store = Arc::new(InMemorySeenStore::new(clock.clone()).with_write_mode(WriteMode::Conditional));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = tab(store.clone(), &clock);
            tokio::spawn(async move {
                let (u, i, s) = ids();
                coordinator.attempt_mark_seen(&u, &i, &s).await
            })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.expect("task should not panic"));
    }
    assert_eq!(outcomes.iter().filter(|o| o.wrote()).count(), 1);
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, WriteOutcome::Created | WriteOutcome::AlreadyRecorded)));
    assert_eq!(store.record_count(), 1);
    assert_eq!(store.calls().creates, 0);
}

#[tokio::test]
async fn test_same_tab_concurrent_attempts_short_circuit() {
    let clock = Arc::new(ManualClock::starting_now());
    let store = Arc::new(InMemorySeenStore::new(clock.clone()));
    let coordinator = tab(store.clone(), &clock);
    let (u, i, s) = ids();

    // The optimistic mark lands before the first remote call suspends.
    let (a, b) = tokio::join!(
        coordinator.attempt_mark_seen(&u, &i, &s),
        coordinator.attempt_mark_seen(&u, &i, &s),
    );
    assert_eq!(a, WriteOutcome::Created);
    assert_eq!(b, WriteOutcome::AlreadyCached);
    assert_eq!(store.calls().gets, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_tab_parallel_attempts_claim_once() {
    init_test_tracing();
    const ATTEMPTS: usize = 4;
    let clock = Arc::new(ManualClock::starting_now());
    let store = Arc::new(InMemorySeenStore::new(clock.clone()));
    let cache = Arc::new(DedupCache::new(
        Arc::new(SlowPersistence {
            inner: InMemoryPersistence::new(),
            delay: Duration::from_millis(20),
        }),
        clock.clone(),
        CacheConfig::default(),
    ));
    let limiter = Arc::new(RateLimiter::new(
        &RateLimitConfig {
            max_ops: 60,
            window: Duration::from_secs(60),
        },
        clock.clone(),
    ));
    let coordinator = SeenWriteCoordinator::new(cache, limiter, store.clone());

    let start = Arc::new(tokio::sync::Barrier::new(ATTEMPTS));
    let handles: Vec<_> = (0..ATTEMPTS)
        .map(|_| {
            let coordinator = coordinator.clone();
            let start = start.clone();
            tokio::spawn(async move {
                start.wait().await;
                let (u, i, s) = ids();
                coordinator.attempt_mark_seen(&u, &i, &s).await
            })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.expect("task should not panic"));
    }
    assert_eq!(
        outcomes.iter().filter(|o| **o == WriteOutcome::Created).count(),
        1,
        "outcomes: {outcomes:?}"
    );
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == WriteOutcome::AlreadyCached)
            .count(),
        ATTEMPTS - 1
    );
    assert_eq!(store.calls().gets, 1);
    assert_eq!(store.calls().creates, 1);
    assert_eq!(coordinator.limiter().remaining(), 59);
}
