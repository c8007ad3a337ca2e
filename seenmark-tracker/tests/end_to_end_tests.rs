//! End-to-end tests: visibility reports through to remote seen records.
//!
//! Timers run on paused tokio time, so `sleep` advances the clock instantly
//! once every task is idle.

use std::sync::Arc;
use std::time::Duration;

use seenmark_core::{ItemId, ManualClock, ScopeId, TrackerConfig, UserId, VisibilityOptions};
use seenmark_storage::{InMemoryPersistence, InMemorySeenStore};
use seenmark_test_utils::assertions::{assert_no_remote_calls, assert_single_record};
use seenmark_test_utils::{init_test_tracing, FailingPersistence};
use seenmark_tracker::{SeenSession, VisibilityFeed, WriteOutcome};
use tokio::time::sleep;

struct World {
    session: SeenSession,
    store: Arc<InMemorySeenStore>,
    persistence: Arc<InMemoryPersistence>,
    clock: Arc<ManualClock>,
}

fn world() -> World {
    init_test_tracing();
    let clock = Arc::new(ManualClock::starting_now());
    let store = Arc::new(InMemorySeenStore::new(clock.clone()));
    let persistence = Arc::new(InMemoryPersistence::new());
    let session = session_over(&store, &persistence, &clock);
    World {
        session,
        store,
        persistence,
        clock,
    }
}

fn session_over(
    store: &Arc<InMemorySeenStore>,
    persistence: &Arc<InMemoryPersistence>,
    clock: &Arc<ManualClock>,
) -> SeenSession {
    let mut config = TrackerConfig::default();
    config.visibility = VisibilityOptions::new(0.5, Duration::from_millis(600));
    SeenSession::new(config, store.clone(), persistence.clone(), clock.clone())
        .expect("default config should be valid")
}

fn ids() -> (UserId, ItemId, ScopeId) {
    (UserId::new("u1"), ItemId::new("p1"), ScopeId::new("c1"))
}

#[tokio::test(start_paused = true)]
async fn test_scroll_into_view_writes_once_then_remount_is_cached() {
    let w = world();
    let (u, i, s) = ids();

    // Post rendered and scrolled into view for 800ms.
    let feed = VisibilityFeed::new();
    let tracked = w.session.track(&feed, u.clone(), i.clone(), s.clone());
    feed.report(0.7);
    sleep(Duration::from_millis(800)).await;

    let outcome = tracked.outcome().await.expect("tracking should finish");
    assert_eq!(outcome, WriteOutcome::Created);
    assert!(outcome.wrote());
    assert!(w.session.cache().is_seen(&u, &i));
    assert_single_record(&w.store, &u, &i);
    assert_eq!(feed.watcher_count(), 0, "observer disconnected after the write");
    drop(feed);

    // Same post mounted again later.
    w.store.reset_calls();
    let remounted = VisibilityFeed::new();
    let tracked = w.session.track(&remounted, u.clone(), i.clone(), s.clone());
    remounted.report(1.0);
    sleep(Duration::from_millis(800)).await;

    let outcome = tracked.outcome().await.expect("tracking should finish");
    assert_eq!(outcome, WriteOutcome::AlreadyCached);
    assert!(!outcome.wrote());
    assert_no_remote_calls(&w.store);
}

#[tokio::test(start_paused = true)]
async fn test_fast_scroll_past_never_writes() {
    let w = world();
    let (u, i, s) = ids();

    let feed = VisibilityFeed::new();
    let tracked = w.session.track(&feed, u.clone(), i, s);
    for _ in 0..10 {
        feed.report(1.0);
        sleep(Duration::from_millis(300)).await;
        feed.report(0.0);
        sleep(Duration::from_millis(300)).await;
    }

    // Scrolled off for good: the post unmounts.
    drop(feed);
    assert_eq!(tracked.outcome().await, None);
    assert_eq!(w.store.record_count(), 0);
    assert!(w.session.cache().session_items(&u).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_below_threshold_never_writes() {
    let w = world();
    let (u, i, s) = ids();

    let feed = VisibilityFeed::new();
    let tracked = w.session.track(&feed, u, i, s);
    feed.report(0.49);
    sleep(Duration::from_secs(5)).await;

    assert!(!tracked.is_finished());
    assert_eq!(w.store.record_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_new_session_over_same_persistence_skips_remote() {
    let w = world();
    let (u, i, s) = ids();

    assert!(w.session.coordinator().attempt_mark_seen(&u, &i, &s).await.wrote());

    // Page reload one day later: fresh session, same durable storage.
    w.clock.advance(Duration::from_secs(24 * 3600));
    let reloaded = session_over(&w.store, &w.persistence, &w.clock);
    w.store.reset_calls();

    assert_eq!(
        reloaded.coordinator().attempt_mark_seen(&u, &i, &s).await,
        WriteOutcome::AlreadyCached
    );
    assert_no_remote_calls(&w.store);
}

#[tokio::test(start_paused = true)]
async fn test_logout_clears_then_remote_check_prevents_duplicate() {
    let w = world();
    let (u, i, s) = ids();

    assert!(w.session.coordinator().attempt_mark_seen(&u, &i, &s).await.wrote());
    assert!(!w.session.logout(&u).is_degraded());
    assert!(!w.session.cache().is_seen(&u, &i));

    assert_eq!(
        w.session.coordinator().attempt_mark_seen(&u, &i, &s).await,
        WriteOutcome::AlreadyRecorded
    );
    assert_single_record(&w.store, &u, &i);
}

#[tokio::test(start_paused = true)]
async fn test_storage_disabled_still_dedups_within_session() {
    init_test_tracing();
    let clock = Arc::new(ManualClock::starting_now());
    let store = Arc::new(InMemorySeenStore::new(clock.clone()));
    let persistence = Arc::new(FailingPersistence::new());
    let session = SeenSession::new(
        TrackerConfig::default(),
        store.clone(),
        persistence.clone(),
        clock,
    )
    .expect("default config should be valid");
    let (u, i, s) = ids();

    let feed = VisibilityFeed::new();
    let tracked = session.track(&feed, u.clone(), i.clone(), s.clone());
    feed.report(1.0);
    sleep(Duration::from_millis(700)).await;
    assert_eq!(tracked.outcome().await, Some(WriteOutcome::Created));

    assert_eq!(
        session.coordinator().attempt_mark_seen(&u, &i, &s).await,
        WriteOutcome::AlreadyCached
    );
    assert!(persistence.attempts() > 0);
    assert_eq!(store.record_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_many_posts_in_one_feed() {
    let w = world();
    let user = UserId::new("u1");
    let scope = ScopeId::new("c1");

    let feeds: Vec<VisibilityFeed> = (0..5).map(|_| VisibilityFeed::new()).collect();
    let tracked: Vec<_> = feeds
        .iter()
        .enumerate()
        .map(|(n, feed)| {
            w.session
                .track(feed, user.clone(), ItemId::new(format!("p{n}")), scope.clone())
        })
        .collect();

    // Only the first three stay on screen long enough.
    for feed in &feeds[..3] {
        feed.report(1.0);
    }
    feeds[3].report(1.0);
    sleep(Duration::from_millis(200)).await;
    feeds[3].report(0.0);
    sleep(Duration::from_millis(800)).await;

    let mut outcomes = Vec::new();
    for (n, item) in tracked.into_iter().enumerate() {
        if n < 3 {
            outcomes.push(item.outcome().await);
        } else {
            assert!(!item.is_finished());
        }
    }
    assert!(outcomes.iter().all(|o| *o == Some(WriteOutcome::Created)));
    assert_eq!(w.store.record_count(), 3);
}
