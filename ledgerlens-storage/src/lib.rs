//! LedgerLens Storage - Tiered Cache and Durable Stores
//!
//! The stale-while-revalidate cache that sits between readers and the
//! remote, plus the durable stores its snapshots are written to.

pub mod cache;

pub use cache::{
    CacheEntry, CacheKey, CacheLookup, CachePolicy, CacheRead, CacheSnapshot, CacheStats,
    CacheStatus, DurableStore, FreshnessPolicy, JsonFileStore, LmdbStore, MemoryStore, Served,
    TieredCache,
};
