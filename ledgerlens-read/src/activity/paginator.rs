//! Pagination over the remote activity log.
//!
//! Two discovery strategies converge on one [`Page`] shape:
//!
//! * **Indexed**: an authoritative count plus the full id list. Ids are
//!   sorted descending, sliced, and each id in the slice is resolved to its
//!   record through the batch executor. Records are immutable, so their
//!   cache entries never go stale. Items keep id-descending order, which is
//!   also the tie-break for equal timestamps.
//! * **Event scan**: the most recent raw events, filtered to the subject and
//!   stably sorted by timestamp descending, so equal timestamps keep the
//!   event source's order. `total_items` and `has_next` are heuristics here:
//!   the remote offers no count on this path.
//!
//! Indexed failures fall through to the event scan. When both fail the
//! result is an empty page, never an error: no activity is a normal state.

use std::sync::Arc;

use ledgerlens_core::{ActivityConfig, ActivityRecord, Clock, Page, PageSource, ReadError, Subject};
use ledgerlens_storage::cache::class;

use super::catalog::ActivityCatalog;
use super::provisional::{ProvisionalKey, ProvisionalLedger};
use crate::reader::ChainReader;

/// Why the indexed strategy did not produce a page.
enum IndexedMiss {
    /// The remote reports no records for the subject.
    Empty,
    Failed(ReadError),
}

impl From<ReadError> for IndexedMiss {
    fn from(error: ReadError) -> Self {
        Self::Failed(error)
    }
}

pub struct LogPaginator {
    reader: ChainReader,
    catalog: Arc<dyn ActivityCatalog>,
    provisional: ProvisionalLedger,
    config: ActivityConfig,
}

impl LogPaginator {
    pub fn new(
        reader: ChainReader,
        catalog: Arc<dyn ActivityCatalog>,
        config: &ActivityConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reader,
            catalog,
            provisional: ProvisionalLedger::new(clock, config.provisional_ttl()),
            config: config.clone(),
        }
    }

    pub fn reader(&self) -> &ChainReader {
        &self.reader
    }

    pub fn provisional(&self) -> &ProvisionalLedger {
        &self.provisional
    }

    /// Show `record` on page 1 of every matching subject until the remote
    /// confirms it. Pass `id == 0` when the real id is not known yet.
    pub fn inject(&self, record: ActivityRecord) -> ProvisionalKey {
        self.provisional.inject(record)
    }

    /// Page `page` (1-based; 0 is read as 1) of `subject`'s activity, newest
    /// first. `page_size` is clamped to `1..=max_page_size`.
    pub async fn get_activity_page(&self, subject: &Subject, page: u64, page_size: u64) -> Page {
        let page = page.max(1);
        let page_size = page_size.max(1).min(self.config.max_page_size.max(1));

        let mut result = match self.indexed_page(subject, page, page_size).await {
            Ok(found) => Some(found),
            Err(IndexedMiss::Empty) if !self.config.fallback_on_empty => None,
            Err(miss) => {
                if let IndexedMiss::Failed(error) = &miss {
                    tracing::warn!(
                        subject = %subject.label(),
                        page,
                        error = %error,
                        "Indexed activity lookup failed, scanning events"
                    );
                }
                match self.scan_page(subject, page, page_size).await {
                    Ok(found) => Some(found),
                    Err(error) => {
                        tracing::warn!(
                            subject = %subject.label(),
                            page,
                            error = %error,
                            "Event scan failed, returning empty page"
                        );
                        None
                    }
                }
            }
        }
        .unwrap_or_else(|| Page::empty(page, page_size));

        self.provisional.merge_into(subject, &mut result);
        result
    }

    async fn indexed_page(
        &self,
        subject: &Subject,
        page: u64,
        page_size: u64,
    ) -> Result<Page, IndexedMiss> {
        let count_request = self.catalog.count_request(subject);
        let count_value = self.reader.read_in(class::COUNT, &count_request).await?;
        let count = self.catalog.decode_count(count_value.value())?;
        if count == 0 {
            return Err(IndexedMiss::Empty);
        }

        let ids_request = self.catalog.ids_request(subject);
        let ids_value = self.reader.read_in(class::IDS, &ids_request).await?;
        let mut ids = self.catalog.decode_ids(ids_value.value())?;
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.dedup();
        // Confirmed anywhere in the log, not just on this page.
        self.provisional.reconcile_ids(&ids);

        let total_items = count.max(ids.len() as u64);
        let start = usize::try_from((page - 1).saturating_mul(page_size)).unwrap_or(usize::MAX);
        let end = start.saturating_add(page_size as usize).min(ids.len());
        let slice = ids.get(start..end).unwrap_or(&[]);

        let mut items = Vec::with_capacity(slice.len());
        if !slice.is_empty() {
            let requests: Vec<_> = slice
                .iter()
                .map(|&id| self.catalog.record_request(id))
                .collect();
            let resolved = self.reader.read_batch_in(class::RECORD, &requests).await;

            let mut last_error = None;
            for (id, outcome) in slice.iter().zip(resolved) {
                match outcome.and_then(|value| self.catalog.decode_record(value)) {
                    Ok(record) => items.push(record),
                    Err(error) => {
                        tracing::warn!(id, error = %error, "Skipping unresolved activity record");
                        last_error = Some(error);
                    }
                }
            }
            if items.is_empty() {
                if let Some(error) = last_error {
                    return Err(IndexedMiss::Failed(error));
                }
            }
        }

        Ok(Page {
            items,
            page_index: page,
            page_size,
            total_items,
            has_next: page.saturating_mul(page_size) < total_items,
            has_prev: page > 1,
            source: PageSource::Indexed,
        })
    }

    async fn scan_page(&self, subject: &Subject, page: u64, page_size: u64) -> Result<Page, ReadError> {
        let limit = page
            .saturating_mul(page_size)
            .saturating_mul(self.config.overfetch);
        let request = self.catalog.events_request(limit);
        let events = self.reader.read_in(class::EVENTS, &request).await?;
        let mut records: Vec<ActivityRecord> = self
            .catalog
            .decode_events(events.into_value())?
            .into_iter()
            .filter(|record| subject.matches(record))
            .collect();
        self.provisional.reconcile(&records);

        // Stable: equal timestamps keep event-source order.
        records.sort_by(|a, b| b.timestamp_seconds.cmp(&a.timestamp_seconds));

        let skip = usize::try_from((page - 1).saturating_mul(page_size)).unwrap_or(usize::MAX);
        let items: Vec<ActivityRecord> = records
            .into_iter()
            .skip(skip)
            .take(page_size as usize)
            .collect();

        let len = items.len() as u64;
        Ok(Page {
            source: if items.is_empty() {
                PageSource::Empty
            } else {
                PageSource::EventScan
            },
            items,
            page_index: page,
            page_size,
            total_items: len,
            has_next: len == page_size,
            has_prev: page > 1,
        })
    }
}

impl std::fmt::Debug for LogPaginator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogPaginator")
            .field("config", &self.config)
            .field("provisional", &self.provisional.len())
            .finish()
    }
}
