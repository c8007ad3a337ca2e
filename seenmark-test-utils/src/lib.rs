//! SEENMARK Test Utilities
//!
//! Centralized test infrastructure for the SEENMARK workspace:
//! - Tracing setup for tests
//! - Fault-injecting and race-forcing remote stores
//! - A persistent-tier backend that always fails
//! - Proptest generators for identifiers and visibility traces
//! - Fixtures and custom assertions

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Barrier;

pub use seenmark_core::{
    Clock, ItemId, ManualClock, NewSeenRecord, PersistenceError, RemoteStoreError, ScopeId,
    SeenQuery, SeenRecord, SystemClock, Timestamp, TrackerConfig, UserId,
};
pub use seenmark_storage::{
    CreateOutcome, DedupCache, InMemoryPersistence, InMemorySeenStore, SeenPersistence,
    SeenRecordStore, StoreCallCounts, UserScopedKey, WriteMode,
};

// ============================================================================
// TRACING
// ============================================================================

/// Install a test-friendly `tracing` subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`. Safe to call from every test.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// FAULT-INJECTING STORE
// ============================================================================

/// Wraps an [`InMemorySeenStore`] and fails selected operations on demand.
pub struct FaultyStore {
    inner: InMemorySeenStore,
    fail_gets: AtomicBool,
    fail_creates: AtomicBool,
    fail_queries: AtomicBool,
    conflict_on_create: AtomicBool,
    injected: AtomicU64,
}

impl Default for FaultyStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl FaultyStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: InMemorySeenStore::new(clock),
            fail_gets: AtomicBool::new(false),
            fail_creates: AtomicBool::new(false),
            fail_queries: AtomicBool::new(false),
            conflict_on_create: AtomicBool::new(false),
            injected: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &InMemorySeenStore {
        &self.inner
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Make every create report `AlreadyExists` without storing anything,
    /// as if another writer had just won.
    pub fn conflict_on_create(&self, conflict: bool) {
        self.conflict_on_create.store(conflict, Ordering::SeqCst);
    }

    /// How many failures have been injected so far.
    pub fn injected_failures(&self) -> u64 {
        self.injected.load(Ordering::SeqCst)
    }

    fn unavailable(&self, operation: &str) -> RemoteStoreError {
        self.injected.fetch_add(1, Ordering::SeqCst);
        RemoteStoreError::Unavailable {
            reason: format!("injected {} failure", operation),
        }
    }
}

#[async_trait]
impl SeenRecordStore for FaultyStore {
    async fn get(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
    ) -> Result<Option<SeenRecord>, RemoteStoreError> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(self.unavailable("get"));
        }
        self.inner.get(user_id, item_id).await
    }

    async fn create(&self, record: NewSeenRecord) -> Result<SeenRecord, RemoteStoreError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(self.unavailable("create"));
        }
        if self.conflict_on_create.load(Ordering::SeqCst) {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(RemoteStoreError::AlreadyExists {
                user_id: record.user_id,
                item_id: record.item_id,
            });
        }
        self.inner.create(record).await
    }

    async fn query(
        &self,
        user_id: &UserId,
        query: &SeenQuery,
    ) -> Result<Vec<SeenRecord>, RemoteStoreError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(self.unavailable("query"));
        }
        self.inner.query(user_id, query).await
    }
}

// ============================================================================
// RACE-FORCING STORE
// ============================================================================

/// Forces concurrent writers into the check-then-create race.
///
/// Every `get` waits on a shared barrier after reading, so all `parties`
/// writers finish their existence check (and all see "absent") before any
/// of them creates. Clones share the underlying store and barrier.
///
/// Each round needs exactly `parties` concurrent `get` calls; a lone caller
/// waits forever.
#[derive(Clone)]
pub struct RacingStore {
    inner: Arc<InMemorySeenStore>,
    barrier: Arc<Barrier>,
}

impl RacingStore {
    pub fn new(inner: Arc<InMemorySeenStore>, parties: usize) -> Self {
        Self {
            inner,
            barrier: Arc::new(Barrier::new(parties)),
        }
    }

    pub fn inner(&self) -> &Arc<InMemorySeenStore> {
        &self.inner
    }
}

#[async_trait]
impl SeenRecordStore for RacingStore {
    async fn get(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
    ) -> Result<Option<SeenRecord>, RemoteStoreError> {
        let found = self.inner.get(user_id, item_id).await;
        self.barrier.wait().await;
        found
    }

    async fn create(&self, record: NewSeenRecord) -> Result<SeenRecord, RemoteStoreError> {
        self.inner.create(record).await
    }

    async fn query(
        &self,
        user_id: &UserId,
        query: &SeenQuery,
    ) -> Result<Vec<SeenRecord>, RemoteStoreError> {
        self.inner.query(user_id, query).await
    }
}

// ============================================================================
// FAILING PERSISTENCE
// ============================================================================

/// Persistent-tier backend whose every call fails, like a browser with
/// storage disabled or over quota.
#[derive(Debug, Default)]
pub struct FailingPersistence {
    attempts: AtomicU64,
}

impl FailingPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn fail(&self) -> PersistenceError {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        PersistenceError::Io {
            reason: "storage quota exceeded".to_string(),
        }
    }
}

impl SeenPersistence for FailingPersistence {
    fn read(&self, _key: &UserScopedKey) -> Result<Option<Vec<u8>>, PersistenceError> {
        Err(self.fail())
    }

    fn write(&self, _key: &UserScopedKey, _value: &[u8]) -> Result<(), PersistenceError> {
        Err(self.fail())
    }

    fn remove(&self, _key: &UserScopedKey) -> Result<bool, PersistenceError> {
        Err(self.fail())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for SEENMARK identifiers and inputs.

    use super::*;
    use proptest::prelude::*;

    /// Generate a non-blank user id.
    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        "[a-zA-Z0-9_-]{1,24}".prop_map(UserId::new)
    }

    /// Generate a non-blank item id.
    pub fn arb_item_id() -> impl Strategy<Value = ItemId> {
        "[a-zA-Z0-9_-]{1,24}".prop_map(ItemId::new)
    }

    /// Generate a non-blank scope id.
    pub fn arb_scope_id() -> impl Strategy<Value = ScopeId> {
        "[a-z]{2,10}".prop_map(ScopeId::new)
    }

    /// Generate an empty or whitespace-only string.
    pub fn arb_blank() -> impl Strategy<Value = String> {
        prop_oneof![Just(String::new()), "[ \t\n]{1,4}"]
    }

    /// Generate a list of distinct item ids.
    pub fn arb_item_ids(max: usize) -> impl Strategy<Value = Vec<ItemId>> {
        prop::collection::hash_set("[a-z0-9]{1,12}", 1..=max.max(1))
            .prop_map(|ids| ids.into_iter().map(ItemId::new).collect())
    }

    /// Generate a visibility trace: (intersection ratio, hold time in ms)
    /// pairs, each held for less than `max_hold_ms`.
    pub fn arb_visibility_trace(
        max_hold_ms: u64,
        max_len: usize,
    ) -> impl Strategy<Value = Vec<(f64, u64)>> {
        prop::collection::vec((0.0f64..=1.0, 1..max_hold_ms.max(2)), 1..=max_len.max(1))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use std::time::Duration;

    /// A user id that no other test will use.
    pub fn unique_user_id() -> UserId {
        UserId::new(format!("user-{}", uuid::Uuid::now_v7()))
    }

    /// An item id that no other test will use.
    pub fn unique_item_id() -> ItemId {
        ItemId::new(format!("post-{}", uuid::Uuid::now_v7()))
    }

    /// Defaults with a short debounce, for tests that do not care about the
    /// exact visibility timing.
    pub fn fast_config() -> TrackerConfig {
        let mut config = TrackerConfig::default();
        config.visibility.debounce = Duration::from_millis(50);
        config
    }

    /// Seed one record per `(item, days_ago)` for `user_id` in `scope_id`,
    /// stamped relative to `clock`.
    pub fn seed_records(
        store: &InMemorySeenStore,
        clock: &dyn Clock,
        user_id: &UserId,
        scope_id: &ScopeId,
        rows: &[(&str, i64)],
    ) -> Vec<SeenRecord> {
        let now = clock.now();
        rows.iter()
            .map(|(item, days_ago)| {
                let record = NewSeenRecord::new(
                    user_id.clone(),
                    ItemId::new(*item),
                    scope_id.clone(),
                )
                .into_record(now - chrono::Duration::days(*days_ago));
                store
                    .insert_record(record.clone())
                    .expect("seeding the in-memory store should succeed");
                record
            })
            .collect()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertions for SEENMARK-specific validation.

    use super::*;

    /// Assert that exactly one remote record exists for the pair.
    #[track_caller]
    pub fn assert_single_record(store: &InMemorySeenStore, user_id: &UserId, item_id: &ItemId) {
        let matching = store
            .records_for(user_id)
            .into_iter()
            .filter(|record| &record.item_id == item_id)
            .count();
        assert_eq!(
            matching, 1,
            "Expected exactly one record for ({}, {}), found {}",
            user_id, item_id, matching
        );
    }

    /// Assert that the store received no calls at all.
    #[track_caller]
    pub fn assert_no_remote_calls(store: &InMemorySeenStore) {
        let calls = store.calls();
        assert_eq!(calls.total(), 0, "Expected no remote calls, got {:?}", calls);
    }
}
