//! One-stop facade over the read layer.

use std::sync::Arc;

use ledgerlens_core::{
    ActivityRecord, Clock, LensConfig, LensResult, Page, ReadError, ReadRequest, ReadResult,
    Subject, SystemClock, ViewTransport,
};
use ledgerlens_storage::{CacheStats, DurableStore, TieredCache};

use crate::activity::{ActivityCatalog, LogPaginator, ProvisionalKey, ViewCatalog};
use crate::reader::ChainReader;

/// The read layer as the application sees it: cached reads, batch reads,
/// activity pages and optimistic injection, over one gate and one cache.
#[derive(Debug)]
pub struct LedgerLens {
    reader: ChainReader,
    paginator: LogPaginator,
}

impl LedgerLens {
    /// Validate `config` and wire every component. Hydrates the cache from
    /// `store` when one is given. Must be called inside a Tokio runtime.
    pub fn new(
        transport: Arc<dyn ViewTransport>,
        store: Option<Arc<dyn DurableStore>>,
        config: &LensConfig,
    ) -> LensResult<Self> {
        Self::with_clock(transport, store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        transport: Arc<dyn ViewTransport>,
        store: Option<Arc<dyn DurableStore>>,
        config: &LensConfig,
        clock: Arc<dyn Clock>,
    ) -> LensResult<Self> {
        let catalog = Arc::new(ViewCatalog::from_config(&config.activity));
        Self::with_catalog(transport, store, config, clock, catalog)
    }

    /// Like [`with_clock`](Self::with_clock), with a custom activity catalog.
    pub fn with_catalog(
        transport: Arc<dyn ViewTransport>,
        store: Option<Arc<dyn DurableStore>>,
        config: &LensConfig,
        clock: Arc<dyn Clock>,
        catalog: Arc<dyn ActivityCatalog>,
    ) -> LensResult<Self> {
        config.validate()?;
        let cache = match store {
            Some(store) => TieredCache::open(&config.cache, store, Arc::clone(&clock)),
            None => TieredCache::in_memory(&config.cache, Arc::clone(&clock)),
        };
        let reader = ChainReader::new(transport, cache, config);
        let paginator = LogPaginator::new(reader.clone(), catalog, &config.activity, clock);
        tracing::info!(
            namespace = %config.cache.namespace,
            version = %config.cache.version,
            cached = reader.cache().len(),
            "Read layer ready"
        );
        Ok(Self { reader, paginator })
    }

    pub fn reader(&self) -> &ChainReader {
        &self.reader
    }

    pub fn paginator(&self) -> &LogPaginator {
        &self.paginator
    }

    pub async fn read(&self, request: &ReadRequest) -> Result<ReadResult, ReadError> {
        self.reader.read(request).await
    }

    pub async fn read_batch(&self, requests: &[ReadRequest]) -> Vec<Result<ReadResult, ReadError>> {
        self.reader.read_batch(requests).await
    }

    pub async fn get_activity_page(&self, subject: &Subject, page: u64, page_size: u64) -> Page {
        self.paginator.get_activity_page(subject, page, page_size).await
    }

    /// Optimistically show a record the application already knows about.
    pub fn inject(&self, record: ActivityRecord) -> ProvisionalKey {
        self.paginator.inject(record)
    }

    pub fn invalidate_all(&self, version_tag: impl Into<String>) -> usize {
        self.reader.invalidate_all(version_tag)
    }

    pub fn stats(&self) -> CacheStats {
        self.reader.stats()
    }

    /// Write the cache snapshot now. Call on shutdown.
    pub fn flush(&self) -> LensResult<()> {
        Ok(self.reader.cache().flush()?)
    }
}
