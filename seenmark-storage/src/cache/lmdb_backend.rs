//! LMDB-backed persistent tier.
//!
//! Uses the heed crate (Rust bindings for LMDB) so a user's seen map
//! survives process restarts. Every value is keyed by [`UserScopedKey`].
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for `read` and user scans
//! - Write transactions for `write` and `remove`

use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use seenmark_core::{PersistenceError, UserId};

use super::traits::SeenPersistence;
use super::user_key::UserScopedKey;

fn backend_error(e: heed::Error) -> PersistenceError {
    PersistenceError::Backend {
        reason: e.to_string(),
    }
}

/// LMDB-backed persistent tier.
///
/// # Example
///
/// ```ignore
/// use seenmark_storage::cache::{DedupCache, LmdbPersistence};
///
/// let backend = Arc::new(LmdbPersistence::new("/var/lib/app/seen", 64)?);
/// let cache = DedupCache::new(backend, clock, CacheConfig::default());
/// ```
pub struct LmdbPersistence {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
}

impl LmdbPersistence {
    /// Open (or create) an LMDB environment.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, PersistenceError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(backend_error)?;

        let mut wtxn = env.write_txn().map_err(backend_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(backend_error)?;
        wtxn.commit().map_err(backend_error)?;

        Ok(Self { env, db })
    }

    /// List every user with a stored seen map.
    pub fn stored_users(&self) -> Result<Vec<UserId>, PersistenceError> {
        let prefix = UserScopedKey::namespace_prefix();
        let rtxn = self.env.read_txn().map_err(backend_error)?;
        let iter = self.db.iter(&rtxn).map_err(backend_error)?;

        let mut users = Vec::new();
        for result in iter {
            let (key, _) = result.map_err(backend_error)?;
            if !key.starts_with(&prefix) {
                continue;
            }
            if let Some(decoded) = UserScopedKey::decode(key) {
                users.push(decoded.user_id().clone());
            }
        }
        Ok(users)
    }
}

impl SeenPersistence for LmdbPersistence {
    fn read(&self, key: &UserScopedKey) -> Result<Option<Vec<u8>>, PersistenceError> {
        let encoded = key.encode();
        let rtxn = self.env.read_txn().map_err(backend_error)?;
        let value = self
            .db
            .get(&rtxn, &encoded)
            .map_err(backend_error)?
            .map(|bytes| bytes.to_vec());
        Ok(value)
    }

    fn write(&self, key: &UserScopedKey, value: &[u8]) -> Result<(), PersistenceError> {
        let encoded = key.encode();
        let mut wtxn = self.env.write_txn().map_err(backend_error)?;
        self.db
            .put(&mut wtxn, &encoded, value)
            .map_err(backend_error)?;
        wtxn.commit().map_err(backend_error)
    }

    fn remove(&self, key: &UserScopedKey) -> Result<bool, PersistenceError> {
        let encoded = key.encode();
        let mut wtxn = self.env.write_txn().map_err(backend_error)?;
        let deleted = self.db.delete(&mut wtxn, &encoded).map_err(backend_error)?;
        wtxn.commit().map_err(backend_error)?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_backend() -> (LmdbPersistence, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let backend =
            LmdbPersistence::new(temp_dir.path(), 10).expect("backend creation should succeed");
        (backend, temp_dir)
    }

    #[test]
    fn test_write_and_read() {
        let (backend, _temp_dir) = create_test_backend();
        let key = UserScopedKey::new(&UserId::new("u1"));

        backend
            .write(&key, br#"{"p1":{"timestamp":1}}"#)
            .expect("write should succeed");
        let value = backend.read(&key).expect("read should succeed");
        assert_eq!(value, Some(br#"{"p1":{"timestamp":1}}"#.to_vec()));
    }

    #[test]
    fn test_read_nonexistent() {
        let (backend, _temp_dir) = create_test_backend();
        let key = UserScopedKey::new(&UserId::new("nobody"));
        assert!(backend.read(&key).expect("read should succeed").is_none());
    }

    #[test]
    fn test_overwrite_and_remove() {
        let (backend, _temp_dir) = create_test_backend();
        let key = UserScopedKey::new(&UserId::new("u1"));

        backend.write(&key, b"first").expect("write should succeed");
        backend.write(&key, b"second").expect("write should succeed");
        assert_eq!(
            backend.read(&key).expect("read should succeed"),
            Some(b"second".to_vec())
        );

        assert!(backend.remove(&key).expect("remove should succeed"));
        assert!(!backend.remove(&key).expect("remove should succeed"));
        assert!(backend.read(&key).expect("read should succeed").is_none());
    }

    #[test]
    fn test_user_isolation() {
        let (backend, _temp_dir) = create_test_backend();
        let alice = UserScopedKey::new(&UserId::new("alice"));
        let bob = UserScopedKey::new(&UserId::new("bob"));

        backend.write(&alice, b"a").expect("write should succeed");
        assert!(
            backend.read(&bob).expect("read should succeed").is_none(),
            "bob should not see alice's map"
        );
    }

    #[test]
    fn test_stored_users() {
        let (backend, _temp_dir) = create_test_backend();
        for user in ["u1", "u2", "u3"] {
            backend
                .write(&UserScopedKey::new(&UserId::new(user)), b"{}")
                .expect("write should succeed");
        }

        let mut users = backend.stored_users().expect("scan should succeed");
        users.sort();
        assert_eq!(
            users,
            vec![UserId::new("u1"), UserId::new("u2"), UserId::new("u3")]
        );
    }

    #[test]
    fn test_survives_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let key = UserScopedKey::new(&UserId::new("u1"));
        {
            let backend = LmdbPersistence::new(temp_dir.path(), 10).expect("open should succeed");
            backend.write(&key, b"kept").expect("write should succeed");
        }

        let reopened = LmdbPersistence::new(temp_dir.path(), 10).expect("reopen should succeed");
        assert_eq!(
            reopened.read(&key).expect("read should succeed"),
            Some(b"kept".to_vec())
        );
    }
}
