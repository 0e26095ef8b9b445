//! The read surface exposed to the application layer.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use ledgerlens_core::{LensConfig, ReadError, ReadRequest, ReadResult, ViewTransport};
use ledgerlens_storage::cache::class;
use ledgerlens_storage::{CacheKey, CacheLookup, CacheRead, CacheStats, CacheStatus, TieredCache};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::batch::BatchExecutor;
use crate::gate::RequestGate;
use crate::retry::RetryPolicy;

struct ReaderInner {
    transport: Arc<dyn ViewTransport>,
    batch: BatchExecutor,
    cache: TieredCache,
}

/// Cached, retried, rate-limited reads against one remote endpoint.
///
/// Every network call funnels through the same [`RequestGate`], whether it
/// comes from a direct read, a batch window, or a background refresh.
/// Cloning is cheap; clones share the gate and the cache.
#[derive(Clone)]
pub struct ChainReader {
    inner: Arc<ReaderInner>,
}

impl ChainReader {
    /// Build a reader with its own gate. Must be called inside a Tokio
    /// runtime, which hosts the gate's dispatcher.
    pub fn new(transport: Arc<dyn ViewTransport>, cache: TieredCache, config: &LensConfig) -> Self {
        let gate = RequestGate::from_config(&config.gate);
        let retry = RetryPolicy::new(gate, &config.retry);
        let batch = BatchExecutor::new(retry, &config.batch);
        Self::with_executor(transport, cache, batch)
    }

    /// Build a reader around an existing executor, e.g. to share one gate
    /// between several readers of the same endpoint.
    pub fn with_executor(
        transport: Arc<dyn ViewTransport>,
        cache: TieredCache,
        batch: BatchExecutor,
    ) -> Self {
        Self {
            inner: Arc::new(ReaderInner {
                transport,
                batch,
                cache,
            }),
        }
    }

    pub fn cache(&self) -> &TieredCache {
        &self.inner.cache
    }

    pub fn executor(&self) -> &BatchExecutor {
        &self.inner.batch
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Single cached, retried read.
    pub async fn read(&self, request: &ReadRequest) -> Result<ReadResult, ReadError> {
        Ok(self.read_in(class::VIEW, request).await?.into_value())
    }

    /// Read `request` under key class `key_class`, keeping the cache
    /// metadata (written-at, whether a refresh is running).
    pub async fn read_in(
        &self,
        key_class: &str,
        request: &ReadRequest,
    ) -> Result<CacheRead<Value>, ReadError> {
        let key = CacheKey::in_class(key_class, request);
        self.inner
            .cache
            .get_or_refresh(&key, self.fetcher(request))
            .await
    }

    /// Read and decode into `T`. A shape mismatch is `Malformed`.
    pub async fn read_as<T: DeserializeOwned>(&self, request: &ReadRequest) -> Result<T, ReadError> {
        let value = self.read(request).await?;
        serde_json::from_value(value).map_err(|e| {
            let error = ReadError::from(e);
            tracing::error!(function = request.function(), error = %error, "View result did not decode");
            error
        })
    }

    /// Fetch from the remote regardless of freshness, and install the
    /// result. Still retried and rate-limited; joins a refresh of the same
    /// request that is already running.
    pub async fn read_fresh(&self, request: &ReadRequest) -> Result<ReadResult, ReadError> {
        let key = CacheKey::for_request(request);
        Ok(self
            .inner
            .cache
            .revalidate(&key, self.fetcher(request))
            .await?
            .into_value())
    }

    /// Bounded-concurrency batch read. Results are in request order and
    /// each fails or succeeds on its own.
    pub async fn read_batch(&self, requests: &[ReadRequest]) -> Vec<Result<ReadResult, ReadError>> {
        self.read_batch_in(class::VIEW, requests).await
    }

    /// Batch read under key class `key_class`.
    ///
    /// Requests the cache can answer (fresh or stale) are served at once;
    /// only misses are dispatched in windows.
    pub async fn read_batch_in(
        &self,
        key_class: &str,
        requests: &[ReadRequest],
    ) -> Vec<Result<ReadResult, ReadError>> {
        let mut results: Vec<Option<Result<ReadResult, ReadError>>> = vec![None; requests.len()];
        let mut misses = Vec::new();

        for (index, request) in requests.iter().enumerate() {
            let key = CacheKey::in_class(key_class, request);
            if self.inner.cache.get(&key).status == CacheStatus::Miss {
                misses.push(index);
                continue;
            }
            let read = self
                .inner
                .cache
                .get_or_refresh(&key, self.fetcher(request))
                .await;
            results[index] = Some(read.map(CacheRead::into_value));
        }

        if !misses.is_empty() {
            tracing::debug!(
                requested = requests.len(),
                misses = misses.len(),
                "Batch read dispatching cache misses"
            );
            let fetched = self
                .inner
                .batch
                .settle(misses.iter().map(|&index| self.read_in(key_class, &requests[index])))
                .await;
            for (index, outcome) in misses.into_iter().zip(fetched) {
                results[index] = Some(outcome.map(CacheRead::into_value));
            }
        }

        results
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(ReadError::transient("batch slot not settled"))))
            .collect()
    }

    /// Synchronous cache lookup for `request`. Never touches the network.
    pub fn peek(&self, request: &ReadRequest) -> CacheLookup {
        self.inner.cache.get(&CacheKey::for_request(request))
    }

    /// Drop every cached entry not written under `version_tag`.
    pub fn invalidate_all(&self, version_tag: impl Into<String>) -> usize {
        self.inner.cache.invalidate_all(version_tag)
    }

    /// A detached fetch of `request`: owns everything it needs so it can
    /// outlive the caller that started it.
    fn fetcher(
        &self,
        request: &ReadRequest,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<ReadResult, ReadError>> {
        let transport = Arc::clone(&self.inner.transport);
        let retry = self.inner.batch.retry().clone();
        let request = request.clone();
        move || {
            async move {
                tracing::debug!(function = request.function(), "Calling view");
                retry.execute(|| transport.call_view(&request)).await
            }
            .boxed()
        }
    }
}

impl std::fmt::Debug for ChainReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainReader")
            .field("cache", &self.inner.cache)
            .field("batch", &self.inner.batch)
            .finish()
    }
}
