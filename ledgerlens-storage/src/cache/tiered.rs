//! Stale-while-revalidate cache with a durable snapshot tier.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use ledgerlens_core::{CacheConfig, Clock, ReadError, StoreError};
use serde_json::Value;

use super::entry::{CacheEntry, CacheSnapshot};
use super::freshness::{CachePolicy, CacheRead, CacheStatus, Served};
use super::key::CacheKey;
use super::traits::{CacheCounters, CacheStats, DurableStore};

type RefreshOutput = Result<(Value, DateTime<Utc>), ReadError>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutput>>;

/// Outcome of a synchronous [`TieredCache::get`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup {
    pub status: CacheStatus,
    /// Present for `Fresh` and `Stale`; `None` on `Miss`.
    pub value: Option<Value>,
    pub written_at: Option<DateTime<Utc>>,
}

impl CacheLookup {
    fn miss() -> Self {
        Self {
            status: CacheStatus::Miss,
            value: None,
            written_at: None,
        }
    }
}

struct CacheInner {
    entries: DashMap<CacheKey, CacheEntry>,
    /// At most one refresh per key. The id guards removal so a finished
    /// refresh never evicts a newer one registered after an invalidation.
    inflight: DashMap<CacheKey, (u64, SharedRefresh)>,
    next_refresh_id: AtomicU64,
    policy: CachePolicy,
    version: RwLock<String>,
    namespace: String,
    store: Option<Arc<dyn DurableStore>>,
    clock: Arc<dyn Clock>,
    counters: CacheCounters,
    persist_pending: AtomicBool,
    persist_lock: Mutex<()>,
}

/// Two-tier cache: an in-memory map in front of a durable snapshot.
///
/// Reads are classified into fresh, stale and miss bands by the age of the
/// entry under its key class's [`FreshnessPolicy`](super::FreshnessPolicy).
/// Every install is tagged with the current version and never moves an
/// entry's `written_at` backwards. Durable writes are coalesced, run off the
/// caller's path, and their failures are logged and swallowed.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct TieredCache {
    inner: Arc<CacheInner>,
}

impl TieredCache {
    /// A cache with no durable tier.
    pub fn in_memory(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self::build(config, None, clock)
    }

    /// Open a cache backed by `store`, hydrating it from the snapshot stored
    /// under the configured namespace.
    ///
    /// Entries written under another version, entries already past their
    /// stale band, and malformed snapshots are ignored.
    pub fn open(config: &CacheConfig, store: Arc<dyn DurableStore>, clock: Arc<dyn Clock>) -> Self {
        let cache = Self::build(config, Some(Arc::clone(&store)), clock);
        cache.hydrate(store.as_ref());
        cache
    }

    fn build(
        config: &CacheConfig,
        store: Option<Arc<dyn DurableStore>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                inflight: DashMap::new(),
                next_refresh_id: AtomicU64::new(0),
                policy: CachePolicy::from_config(config),
                version: RwLock::new(config.version.clone()),
                namespace: config.namespace.clone(),
                store,
                clock,
                counters: CacheCounters::default(),
                persist_pending: AtomicBool::new(false),
                persist_lock: Mutex::new(()),
            }),
        }
    }

    fn hydrate(&self, store: &dyn DurableStore) {
        let namespace = &self.inner.namespace;
        let document = match store.load(namespace) {
            Ok(Some(document)) => document,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(namespace = %namespace, error = %e, "Cache hydration failed");
                return;
            }
        };
        let snapshot: CacheSnapshot = match serde_json::from_value(document) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(namespace = %namespace, error = %e, "Discarding malformed cache snapshot");
                return;
            }
        };

        let version = self.version();
        let now = self.inner.clock.now();
        let mut restored = 0usize;
        for entry in snapshot.entries {
            if entry.version != version {
                continue;
            }
            let policy = self.inner.policy.for_class(entry.key.class());
            if policy.classify_at(entry.written_at, now) == CacheStatus::Miss {
                continue;
            }
            if self.install(entry.key, entry.value, entry.written_at, &version) {
                restored += 1;
            }
        }
        tracing::debug!(
            namespace = %namespace,
            restored,
            snapshot_version = %snapshot.version,
            "Hydrated cache from durable store"
        );
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Classify the entry for `key` at the current time.
    ///
    /// Pure lookup: no refresh is scheduled and no statistics are recorded.
    pub fn get(&self, key: &CacheKey) -> CacheLookup {
        let Some(entry) = self.inner.entries.get(key) else {
            return CacheLookup::miss();
        };
        let policy = self.inner.policy.for_class(key.class());
        match policy.classify_at(entry.written_at, self.inner.clock.now()) {
            CacheStatus::Miss => CacheLookup::miss(),
            status => CacheLookup {
                status,
                value: Some(entry.value.clone()),
                written_at: Some(entry.written_at),
            },
        }
    }

    /// Serve `key` under the stale-while-revalidate contract.
    ///
    /// * fresh: returned as is, `fetch` is not called.
    /// * stale: returned as is; a background refresh is started unless one is
    ///   already running for the key.
    /// * miss: waits for a refresh (joining a running one if any). On failure
    ///   the error is returned and any existing entry is left untouched.
    ///
    /// Refreshes run as detached tasks, so dropping the returned future does
    /// not cancel one. `fetch` must be called inside a Tokio runtime.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        key: &CacheKey,
        fetch: F,
    ) -> Result<CacheRead<Value>, ReadError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ReadError>> + Send + 'static,
    {
        let lookup = self.get(key);
        match (lookup.status, lookup.value, lookup.written_at) {
            (CacheStatus::Fresh, Some(value), Some(written_at)) => {
                CacheCounters::bump(&self.inner.counters.fresh_hits);
                Ok(CacheRead::new(value, written_at, Served::Fresh))
            }
            (CacheStatus::Stale, Some(value), Some(written_at)) => {
                CacheCounters::bump(&self.inner.counters.stale_hits);
                drop(self.refresh(key, fetch));
                Ok(CacheRead::new(value, written_at, Served::Stale))
            }
            _ => {
                CacheCounters::bump(&self.inner.counters.misses);
                let (value, written_at) = self.refresh(key, fetch).await?;
                Ok(CacheRead::new(value, written_at, Served::Fetched))
            }
        }
    }

    /// Fetch `key` regardless of its freshness band and wait for the result.
    ///
    /// Joins a refresh already running for the key instead of starting a
    /// second one, so two fetches of one key never race to install.
    pub async fn revalidate<F, Fut>(
        &self,
        key: &CacheKey,
        fetch: F,
    ) -> Result<CacheRead<Value>, ReadError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ReadError>> + Send + 'static,
    {
        let (value, written_at) = self.refresh(key, fetch).await?;
        Ok(CacheRead::new(value, written_at, Served::Fetched))
    }

    /// Join the running refresh for `key`, or start one.
    fn refresh<F, Fut>(&self, key: &CacheKey, fetch: F) -> SharedRefresh
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ReadError>> + Send + 'static,
    {
        if let Some(running) = self.inner.inflight.get(key) {
            return running.1.clone();
        }

        // Read before locking the inflight shard; invalidate_all takes the
        // version lock first.
        let version = self.version();
        let vacant = match self.inner.inflight.entry(key.clone()) {
            Entry::Occupied(running) => return running.get().1.clone(),
            Entry::Vacant(vacant) => vacant,
        };

        let id = self.inner.next_refresh_id.fetch_add(1, Ordering::Relaxed);
        let this = self.clone();
        let task_key = key.clone();
        // Stamped at dispatch: the value reflects remote state no newer than
        // this instant, however long the fetch takes.
        let dispatched_at = self.inner.clock.now();
        let pending = fetch();

        tracing::debug!(key = %key, "Starting cache refresh");
        let handle = tokio::spawn(async move {
            let outcome = match pending.await {
                Ok(value) => {
                    if this.install(task_key.clone(), value.clone(), dispatched_at, &version) {
                        CacheCounters::bump(&this.inner.counters.refreshes);
                        this.schedule_persist();
                    } else {
                        tracing::debug!(key = %task_key, "Refresh result superseded by a newer write");
                    }
                    Ok((value, dispatched_at))
                }
                Err(e) => {
                    CacheCounters::bump(&this.inner.counters.refresh_failures);
                    tracing::warn!(key = %task_key, error = %e, "Cache refresh failed");
                    Err(e)
                }
            };
            this.inner
                .inflight
                .remove_if(&task_key, |_, (running_id, _)| *running_id == id);
            outcome
        });

        let shared = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(ReadError::transient(format!("refresh task aborted: {e}"))),
            }
        }
        .boxed()
        .shared();
        vacant.insert((id, shared.clone()));
        shared
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Install `value` for `key`, stamped with the current time.
    pub fn put(&self, key: CacheKey, value: Value) -> bool {
        let written_at = self.inner.clock.now();
        self.put_at(key, value, written_at)
    }

    /// Install `value` for `key` as of `written_at`.
    ///
    /// Returns `false` and leaves the entry alone if it already holds a
    /// newer write.
    pub fn put_at(&self, key: CacheKey, value: Value, written_at: DateTime<Utc>) -> bool {
        let version = self.version();
        let installed = self.install(key, value, written_at, &version);
        if installed {
            self.schedule_persist();
        }
        installed
    }

    /// Install under `expected_version`, unless the cache was invalidated
    /// to another version in the meantime.
    fn install(
        &self,
        key: CacheKey,
        value: Value,
        written_at: DateTime<Utc>,
        expected_version: &str,
    ) -> bool {
        let current = self.inner.version.read().unwrap_or_else(|p| p.into_inner());
        if *current != expected_version {
            tracing::debug!(key = %key, "Dropping write from a superseded cache version");
            return false;
        }
        let candidate = CacheEntry {
            key: key.clone(),
            value,
            written_at,
            version: current.clone(),
        };
        match self.inner.entries.entry(key) {
            Entry::Occupied(mut existing) => {
                if !existing.get().accepts(written_at) {
                    return false;
                }
                existing.insert(candidate);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(candidate);
            }
        }
        true
    }

    /// Switch to `version_tag`, discarding every entry written under any
    /// other tag. Returns how many entries were dropped.
    ///
    /// Running refreshes are detached from their keys; their results are
    /// not installed.
    pub fn invalidate_all(&self, version_tag: impl Into<String>) -> usize {
        let dropped = {
            let mut version = self.inner.version.write().unwrap_or_else(|p| p.into_inner());
            *version = version_tag.into();
            let before = self.inner.entries.len();
            self.inner.entries.retain(|_, entry| entry.version == *version);
            self.inner.inflight.clear();
            before - self.inner.entries.len()
        };
        tracing::info!(version = %self.version(), dropped, "Cache invalidated");
        self.schedule_persist();
        dropped
    }

    // ------------------------------------------------------------------------
    // Durable tier
    // ------------------------------------------------------------------------

    /// Queue a snapshot write. Writes requested while one is queued are
    /// folded into it.
    fn schedule_persist(&self) {
        if self.inner.store.is_none() {
            return;
        }
        if self.inner.persist_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let this = self.clone();
                handle.spawn_blocking(move || {
                    this.inner.persist_pending.store(false, Ordering::Release);
                    let _ = this.persist();
                });
            }
            Err(_) => {
                self.inner.persist_pending.store(false, Ordering::Release);
                let _ = self.persist();
            }
        }
    }

    fn persist(&self) -> Result<(), StoreError> {
        let Some(store) = &self.inner.store else {
            return Ok(());
        };
        let _guard = self.inner.persist_lock.lock().unwrap_or_else(|p| p.into_inner());

        let snapshot = self.snapshot();
        let result = serde_json::to_value(&snapshot)
            .map_err(|e| StoreError::Serialization {
                namespace: self.inner.namespace.clone(),
                reason: e.to_string(),
            })
            .and_then(|document| store.save(&self.inner.namespace, &document));

        if let Err(e) = &result {
            CacheCounters::bump(&self.inner.counters.durable_write_failures);
            tracing::warn!(
                namespace = %self.inner.namespace,
                error = %e,
                "Durable cache write failed"
            );
        }
        result
    }

    /// Write the current snapshot synchronously.
    ///
    /// Failures are still counted and logged, and also returned here so
    /// shutdown paths can report them.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.persist()
    }

    /// Copy of the entries written under the current version.
    pub fn snapshot(&self) -> CacheSnapshot {
        let version = self.version();
        let mut entries: Vec<CacheEntry> = self
            .inner
            .entries
            .iter()
            .filter(|entry| entry.version == version)
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        CacheSnapshot { version, entries }
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    pub fn version(&self) -> String {
        self.inner
            .version
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.inner.policy
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Number of refreshes currently running.
    pub fn pending_refreshes(&self) -> usize {
        self.inner.inflight.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.counters.snapshot(self.inner.entries.len() as u64)
    }
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("namespace", &self.inner.namespace)
            .field("version", &self.version())
            .field("entries", &self.inner.entries.len())
            .field("durable", &self.inner.store.is_some())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
