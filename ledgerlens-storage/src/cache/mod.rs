//! Tiered cache with explicit freshness bands and a durable snapshot tier.
//!
//! # Design Philosophy
//!
//! A cache that hides its staleness leads to subtle bugs. Every read here is
//! classified into a [`CacheStatus`] band, and values handed to callers come
//! wrapped in [`CacheRead<T>`], which records when they were written and
//! whether a background refresh is running.
//!
//! # Durability
//!
//! The in-memory tier is authoritative while the process runs. A
//! [`DurableStore`] receives coalesced whole-namespace snapshots and is read
//! once, at construction, so a restart serves cached data without touching
//! the network. Store failures are logged and never reach readers.
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(JsonFileStore::new("/var/lib/ledgerlens"));
//! let cache = TieredCache::open(&config.cache, store, Arc::new(SystemClock));
//!
//! let read = cache
//!     .get_or_refresh(&CacheKey::for_request(&request), move || fetch(request))
//!     .await?;
//! if read.is_revalidating() {
//!     tracing::debug!("serving stale data while refreshing");
//! }
//! ```

pub mod entry;
pub mod file_store;
pub mod freshness;
pub mod key;
pub mod lmdb_store;
pub mod memory_store;
pub mod tiered;
pub mod traits;

pub use entry::{CacheEntry, CacheSnapshot};
pub use file_store::JsonFileStore;
pub use freshness::{CachePolicy, CacheRead, CacheStatus, FreshnessPolicy, Served};
pub use key::{class, CacheKey};
pub use lmdb_store::LmdbStore;
pub use memory_store::MemoryStore;
pub use tiered::{CacheLookup, TieredCache};
pub use traits::{CacheStats, DurableStore};
