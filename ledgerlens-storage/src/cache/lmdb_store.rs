//! LMDB-backed durable store.
//!
//! Uses the heed crate (Rust bindings for LMDB). Each namespace is a single
//! key in one unnamed database, holding the JSON-encoded snapshot document.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. Loads use read transactions and saves
//! use write transactions, so concurrent readers always see a whole snapshot.

use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use ledgerlens_core::StoreError;
use serde_json::Value;

use super::traits::DurableStore;

fn txn_err(e: heed::Error) -> StoreError {
    StoreError::Transaction {
        reason: e.to_string(),
    }
}

/// LMDB-backed durable store.
///
/// # Example
///
/// ```ignore
/// use ledgerlens_storage::cache::{LmdbStore, TieredCache};
///
/// let store = Arc::new(LmdbStore::new("/var/lib/ledgerlens", 64)?);
/// let cache = TieredCache::open(&config.cache, store, Arc::new(SystemClock));
/// ```
pub struct LmdbStore {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbStore {
    /// Open (or create) an LMDB environment in `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, StoreError> {
        let display = path.as_ref().display().to_string();
        std::fs::create_dir_all(&path).map_err(|e| StoreError::Io {
            namespace: display.clone(),
            reason: e.to_string(),
        })?;

        // SAFETY: the environment is opened once per directory by this store
        // and never concurrently re-opened within the process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| StoreError::Io {
            namespace: display,
            reason: e.to_string(),
        })?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, None).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;

        Ok(Self { env, db })
    }

    /// Drop the document stored under `namespace`. Returns whether one existed.
    pub fn remove(&self, namespace: &str) -> Result<bool, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let deleted = self
            .db
            .delete(&mut wtxn, namespace.as_bytes())
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(deleted)
    }
}

impl std::fmt::Debug for LmdbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbStore")
            .field("path", &self.env.path())
            .finish()
    }
}

impl DurableStore for LmdbStore {
    fn load(&self, namespace: &str) -> Result<Option<Value>, StoreError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let Some(bytes) = self.db.get(&rtxn, namespace.as_bytes()).map_err(txn_err)? else {
            return Ok(None);
        };
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(namespace, error = %e, "Ignoring corrupt durable snapshot");
                Ok(None)
            }
        }
    }

    fn save(&self, namespace: &str, value: &Value) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Serialization {
            namespace: namespace.to_string(),
            reason: e.to_string(),
        })?;
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .put(&mut wtxn, namespace.as_bytes(), &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }
}
