//! Remote seen-record store.
//!
//! The store holds, per user, a collection of seen records keyed by item id.
//! Creating a record is the sole signal for one external counter increment,
//! so a create that targets an existing record must fail distinctly
//! ([`RemoteStoreError::AlreadyExists`]) rather than overwrite.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use seenmark_core::{
    Clock, ItemId, NewSeenRecord, RemoteStoreError, SeenQuery, SeenRecord, SystemClock, UserId,
};

/// How a store supports idempotent creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Read the record, then create it. Two writers can both pass the read;
    /// the loser's create fails with `AlreadyExists`.
    #[default]
    CheckThenCreate,
    /// The store creates atomically only if absent. No race window.
    Conditional,
}

/// Result of [`SeenRecordStore::create_if_absent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(SeenRecord),
    AlreadyExists,
}

impl CreateOutcome {
    pub fn created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

/// Async access to the remote seen-record store.
#[async_trait]
pub trait SeenRecordStore: Send + Sync {
    /// Fetch the record for `(user_id, item_id)`.
    async fn get(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
    ) -> Result<Option<SeenRecord>, RemoteStoreError>;

    /// Create a record, stamping `seen_at` with the store's clock.
    ///
    /// Fails with [`RemoteStoreError::AlreadyExists`] if the record exists.
    async fn create(&self, record: NewSeenRecord) -> Result<SeenRecord, RemoteStoreError>;

    /// Bulk read of one user's records, most recent first.
    async fn query(
        &self,
        user_id: &UserId,
        query: &SeenQuery,
    ) -> Result<Vec<SeenRecord>, RemoteStoreError>;

    fn write_mode(&self) -> WriteMode {
        WriteMode::CheckThenCreate
    }

    /// Create the record only if it does not exist yet.
    ///
    /// The default is the two-step read then create, with a lost race folded
    /// into `AlreadyExists`. Stores reporting [`WriteMode::Conditional`]
    /// override this with an atomic operation.
    async fn create_if_absent(
        &self,
        record: NewSeenRecord,
    ) -> Result<CreateOutcome, RemoteStoreError> {
        if self.get(&record.user_id, &record.item_id).await?.is_some() {
            return Ok(CreateOutcome::AlreadyExists);
        }
        match self.create(record).await {
            Ok(created) => Ok(CreateOutcome::Created(created)),
            Err(e) if e.is_conflict() => Ok(CreateOutcome::AlreadyExists),
            Err(e) => Err(e),
        }
    }
}

/// Snapshot of how often each store operation was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCallCounts {
    pub gets: u64,
    pub creates: u64,
    pub queries: u64,
    pub conditional_creates: u64,
}

impl StoreCallCounts {
    pub fn total(&self) -> u64 {
        self.gets + self.creates + self.queries + self.conditional_creates
    }
}

#[derive(Debug, Default)]
struct CallCounters {
    gets: AtomicU64,
    creates: AtomicU64,
    queries: AtomicU64,
    conditional_creates: AtomicU64,
}

type RecordMap = HashMap<UserId, HashMap<ItemId, SeenRecord>>;

/// In-memory seen-record store.
///
/// Used for development and tests. `seen_at` comes from the injected clock,
/// standing in for a server timestamp.
pub struct InMemorySeenStore {
    records: RwLock<RecordMap>,
    clock: Arc<dyn Clock>,
    write_mode: WriteMode,
    calls: CallCounters,
}

impl Default for InMemorySeenStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemorySeenStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            clock,
            write_mode: WriteMode::default(),
            calls: CallCounters::default(),
        }
    }

    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    pub fn calls(&self) -> StoreCallCounts {
        StoreCallCounts {
            gets: self.calls.gets.load(Ordering::SeqCst),
            creates: self.calls.creates.load(Ordering::SeqCst),
            queries: self.calls.queries.load(Ordering::SeqCst),
            conditional_creates: self.calls.conditional_creates.load(Ordering::SeqCst),
        }
    }

    pub fn reset_calls(&self) {
        self.calls.gets.store(0, Ordering::SeqCst);
        self.calls.creates.store(0, Ordering::SeqCst);
        self.calls.queries.store(0, Ordering::SeqCst);
        self.calls.conditional_creates.store(0, Ordering::SeqCst);
    }

    /// Total number of records across all users.
    pub fn record_count(&self) -> usize {
        self.records
            .read()
            .map(|records| records.values().map(HashMap::len).sum())
            .unwrap_or(0)
    }

    /// All records for one user, most recent first.
    pub fn records_for(&self, user_id: &UserId) -> Vec<SeenRecord> {
        let mut found: Vec<SeenRecord> = self
            .records
            .read()
            .ok()
            .and_then(|records| records.get(user_id).map(|items| items.values().cloned().collect()))
            .unwrap_or_default();
        found.sort_by(|a, b| b.seen_at.cmp(&a.seen_at));
        found
    }

    /// Seed a record as-is, bypassing the counters and the clock.
    pub fn insert_record(&self, record: SeenRecord) -> Result<(), RemoteStoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| RemoteStoreError::LockPoisoned)?;
        records
            .entry(record.user_id.clone())
            .or_default()
            .insert(record.item_id.clone(), record);
        Ok(())
    }

    /// Insert under an already-held write lock. `None` if the record exists.
    fn insert_new(records: &mut RecordMap, record: SeenRecord) -> Option<SeenRecord> {
        let items = records.entry(record.user_id.clone()).or_default();
        if items.contains_key(&record.item_id) {
            return None;
        }
        items.insert(record.item_id.clone(), record.clone());
        Some(record)
    }
}

#[async_trait]
impl SeenRecordStore for InMemorySeenStore {
    async fn get(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
    ) -> Result<Option<SeenRecord>, RemoteStoreError> {
        self.calls.gets.fetch_add(1, Ordering::SeqCst);
        let records = self
            .records
            .read()
            .map_err(|_| RemoteStoreError::LockPoisoned)?;
        Ok(records
            .get(user_id)
            .and_then(|items| items.get(item_id))
            .cloned())
    }

    async fn create(&self, record: NewSeenRecord) -> Result<SeenRecord, RemoteStoreError> {
        self.calls.creates.fetch_add(1, Ordering::SeqCst);
        let user_id = record.user_id.clone();
        let item_id = record.item_id.clone();
        let stamped = record.into_record(self.clock.now());

        let mut records = self
            .records
            .write()
            .map_err(|_| RemoteStoreError::LockPoisoned)?;
        Self::insert_new(&mut records, stamped)
            .ok_or(RemoteStoreError::AlreadyExists { user_id, item_id })
    }

    async fn query(
        &self,
        user_id: &UserId,
        query: &SeenQuery,
    ) -> Result<Vec<SeenRecord>, RemoteStoreError> {
        self.calls.queries.fetch_add(1, Ordering::SeqCst);
        let records = self
            .records
            .read()
            .map_err(|_| RemoteStoreError::LockPoisoned)?;
        let mut matching: Vec<SeenRecord> = records
            .get(user_id)
            .map(|items| {
                items
                    .values()
                    .filter(|record| query.matches(record))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        matching.sort_by(|a, b| b.seen_at.cmp(&a.seen_at));
        matching.truncate(query.limit);
        Ok(matching)
    }

    fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    async fn create_if_absent(
        &self,
        record: NewSeenRecord,
    ) -> Result<CreateOutcome, RemoteStoreError> {
        self.calls.conditional_creates.fetch_add(1, Ordering::SeqCst);
        let stamped = record.into_record(self.clock.now());
        let mut records = self
            .records
            .write()
            .map_err(|_| RemoteStoreError::LockPoisoned)?;
        Ok(match Self::insert_new(&mut records, stamped) {
            Some(created) => CreateOutcome::Created(created),
            None => CreateOutcome::AlreadyExists,
        })
    }
}
