//! Process-local persistent-tier backend.

use std::collections::HashMap;
use std::sync::RwLock;

use seenmark_core::PersistenceError;

use super::traits::SeenPersistence;
use super::user_key::UserScopedKey;

/// In-memory stand-in for durable storage.
///
/// Values survive as long as this struct does, so dropping a `DedupCache`
/// and building a new one over the same `Arc<InMemoryPersistence>` simulates
/// a reload of the persistent tier.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with a stored map.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite a raw value, bypassing the cache's encoding.
    pub fn put_raw(&self, key: &UserScopedKey, value: impl Into<Vec<u8>>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.encode(), value.into());
        }
    }

    /// Read a raw value as stored.
    pub fn get_raw(&self, key: &UserScopedKey) -> Option<Vec<u8>> {
        self.entries.read().ok()?.get(&key.encode()).cloned()
    }
}

impl SeenPersistence for InMemoryPersistence {
    fn read(&self, key: &UserScopedKey) -> Result<Option<Vec<u8>>, PersistenceError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| PersistenceError::LockPoisoned)?;
        Ok(entries.get(&key.encode()).cloned())
    }

    fn write(&self, key: &UserScopedKey, value: &[u8]) -> Result<(), PersistenceError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| PersistenceError::LockPoisoned)?;
        entries.insert(key.encode(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &UserScopedKey) -> Result<bool, PersistenceError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| PersistenceError::LockPoisoned)?;
        Ok(entries.remove(&key.encode()).is_some())
    }
}
