//! Durable store trait and cache statistics.

use ledgerlens_core::StoreError;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// Best-effort durable key/value store supplied by the host environment.
///
/// Implementations must tolerate absence (first run) by returning
/// `Ok(None)`, and should report corrupt payloads as absence as well.
/// Writes replace the whole namespace.
pub trait DurableStore: Send + Sync {
    /// Load the document stored under `namespace`, if any.
    fn load(&self, namespace: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the document stored under `namespace`.
    fn save(&self, namespace: &str, value: &Value) -> Result<(), StoreError>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from the fresh band.
    pub fresh_hits: u64,
    /// Reads served from the stale band.
    pub stale_hits: u64,
    /// Reads that had to wait for a fetch.
    pub misses: u64,
    /// Completed refreshes that installed a value.
    pub refreshes: u64,
    /// Refreshes that failed and left the existing entry in place.
    pub refresh_failures: u64,
    /// Durable snapshot writes that failed and were swallowed.
    pub durable_write_failures: u64,
    /// Number of entries currently in memory.
    pub entry_count: u64,
}

impl CacheStats {
    /// Share of reads served without waiting (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.fresh_hits + self.stale_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    pub fresh_hits: AtomicU64,
    pub stale_hits: AtomicU64,
    pub misses: AtomicU64,
    pub refreshes: AtomicU64,
    pub refresh_failures: AtomicU64,
    pub durable_write_failures: AtomicU64,
}

impl CacheCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, entry_count: u64) -> CacheStats {
        CacheStats {
            fresh_hits: self.fresh_hits.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            durable_write_failures: self.durable_write_failures.load(Ordering::Relaxed),
            entry_count,
        }
    }
}
