//! In-memory durable store, for hosts without persistence and for tests.

use ledgerlens_core::StoreError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use super::traits::DurableStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, Value>>,
    fail_saves: AtomicBool,
    saves: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` fail, simulating a full or revoked store.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }
}

impl DurableStore for MemoryStore {
    fn load(&self, namespace: &str) -> Result<Option<Value>, StoreError> {
        let documents = self.documents.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(documents.get(namespace).cloned())
    }

    fn save(&self, namespace: &str, value: &Value) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                namespace: namespace.to_string(),
                reason: "store unavailable".to_string(),
            });
        }
        let mut documents = self.documents.write().map_err(|_| StoreError::LockPoisoned)?;
        documents.insert(namespace.to_string(), value.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
