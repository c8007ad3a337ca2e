//! Dedup cache reload tests against the LMDB persistent tier.
//!
//! A "reload" drops the cache and every LMDB handle, reopens the environment
//! from disk and builds a fresh cache over it, the way a new process would.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use seenmark_core::{CacheConfig, ItemId, ManualClock, UserId};
use seenmark_storage::{DedupCache, LmdbPersistence, SeenPhase};
use tempfile::TempDir;

const TTL: Duration = Duration::from_millis(604_800_000);

fn open_cache(dir: &TempDir, clock: &Arc<ManualClock>) -> DedupCache {
    let backend = LmdbPersistence::new(dir.path(), 10).expect("LMDB open should succeed");
    DedupCache::new(Arc::new(backend), clock.clone(), CacheConfig { ttl: TTL })
}

#[test]
fn test_mark_survives_process_reload() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let clock = Arc::new(ManualClock::starting_now());
    let user = UserId::new("u1");

    {
        let cache = open_cache(&dir, &clock);
        assert!(!cache.mark_seen(&user, &ItemId::new("p1")).is_degraded());
        cache.bulk_mark_seen(&user, vec![ItemId::new("p2"), ItemId::new("p3")]);
    }

    clock.advance(Duration::from_secs(3600));
    let cache = open_cache(&dir, &clock);
    for item in ["p1", "p2", "p3"] {
        assert!(cache.is_seen(&user, &ItemId::new(item)), "{item} should be seen");
    }
    assert_eq!(
        cache.session_phase(&user, &ItemId::new("p1")),
        Some(SeenPhase::ConfirmedRemote)
    );
    assert!(!cache.is_seen(&UserId::new("u2"), &ItemId::new("p1")));
}

#[test]
fn test_expiry_and_clear_across_reload() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let clock = Arc::new(ManualClock::starting_now());
    let user = UserId::new("u1");

    {
        let cache = open_cache(&dir, &clock);
        cache.mark_seen(&user, &ItemId::new("old"));
        clock.advance(Duration::from_secs(6 * 24 * 3600));
        cache.mark_seen(&user, &ItemId::new("recent"));
    }

    clock.advance(Duration::from_secs(2 * 24 * 3600));
    {
        let cache = open_cache(&dir, &clock);
        assert!(!cache.is_seen(&user, &ItemId::new("old")));
        assert!(cache.is_seen(&user, &ItemId::new("recent")));
        cache.clear(&user);
    }

    let cache = open_cache(&dir, &clock);
    assert!(!cache.is_seen(&user, &ItemId::new("recent")));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Whatever one user marks, no other user ever sees it after a reload.
    #[test]
    fn prop_users_isolated_after_reload(
        items in prop::collection::hash_set("[a-z0-9]{1,12}", 1..8),
        owner in "[a-z]{1,8}",
        other in "[a-z]{1,8}",
    ) {
        prop_assume!(owner != other);
        let dir = TempDir::new().map_err(|e| TestCaseError::fail(e.to_string()))?;
        let clock = Arc::new(ManualClock::starting_now());
        let owner = UserId::new(owner);
        let other = UserId::new(other);

        {
            let cache = open_cache(&dir, &clock);
            cache.bulk_mark_seen(&owner, items.iter().map(|i| ItemId::new(i.as_str())));
        }

        let cache = open_cache(&dir, &clock);
        for item in &items {
            let item = ItemId::new(item.as_str());
            prop_assert!(cache.is_seen(&owner, &item));
            prop_assert!(!cache.is_seen(&other, &item));
        }
    }
}
