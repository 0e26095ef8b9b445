//! Locally injected records awaiting confirmation by the remote.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ledgerlens_core::{ActivityRecord, Clock, Page, RecordOrigin, Subject};
use uuid::Uuid;

/// Identity of a provisional record: the real id when the caller knew it,
/// otherwise the client-assigned temporary id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisionalKey {
    Id(u64),
    Temp(Uuid),
}

#[derive(Debug, Clone)]
struct ProvisionalEntry {
    record: ActivityRecord,
    injected_at: DateTime<Utc>,
}

/// Records the application knows about before the remote reflects them.
///
/// A provisional record is shown until a confirmed record with the same id,
/// or with the same kind and transaction hash, is observed, or until it
/// outlives its TTL.
#[derive(Debug)]
pub struct ProvisionalLedger {
    entries: DashMap<ProvisionalKey, ProvisionalEntry>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl ProvisionalLedger {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            ttl,
        }
    }

    /// Accept `record` as provisional. An `id` of zero means the real id is
    /// not known yet. Re-injecting the same real id replaces the earlier one.
    pub fn inject(&self, mut record: ActivityRecord) -> ProvisionalKey {
        let temp_id = Uuid::new_v4();
        record.origin = RecordOrigin::Provisional { temp_id };
        let key = if record.id == 0 {
            ProvisionalKey::Temp(temp_id)
        } else {
            ProvisionalKey::Id(record.id)
        };
        tracing::debug!(?key, kind = ?record.kind, "Injected provisional record");
        self.entries.insert(
            key,
            ProvisionalEntry {
                record,
                injected_at: self.clock.now(),
            },
        );
        key
    }

    pub fn remove(&self, key: &ProvisionalKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every provisional record that `confirmed` now covers.
    /// Returns how many were dropped.
    pub fn reconcile(&self, confirmed: &[ActivityRecord]) -> usize {
        if confirmed.is_empty() || self.entries.is_empty() {
            return 0;
        }
        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            !confirmed.iter().any(|record| {
                if let ProvisionalKey::Id(id) = key {
                    if *id == record.id {
                        return true;
                    }
                }
                !record.transaction_hash.is_empty()
                    && record.fingerprint() == entry.record.fingerprint()
            })
        });
        let dropped = before - self.entries.len();
        if dropped > 0 {
            tracing::debug!(dropped, "Provisional records confirmed by remote");
        }
        dropped
    }

    /// Drop provisional records whose real id appears in `ids`, the full id
    /// list the remote reports. Returns how many were dropped.
    pub fn reconcile_ids(&self, ids: &[u64]) -> usize {
        if ids.is_empty() || self.entries.is_empty() {
            return 0;
        }
        let before = self.entries.len();
        self.entries.retain(|key, _| match key {
            ProvisionalKey::Id(id) => !ids.contains(id),
            ProvisionalKey::Temp(_) => true,
        });
        let dropped = before - self.entries.len();
        if dropped > 0 {
            tracing::debug!(dropped, "Provisional records listed by remote");
        }
        dropped
    }

    /// Pending records for `subject`, newest first. Expired entries are
    /// purged on the way.
    pub fn pending(&self, subject: &Subject) -> Vec<ActivityRecord> {
        self.expire();
        let mut records: Vec<ActivityRecord> = self
            .entries
            .iter()
            .filter(|entry| subject.matches(&entry.record))
            .map(|entry| entry.record.clone())
            .collect();
        records.sort_by(|a, b| {
            b.timestamp_seconds
                .cmp(&a.timestamp_seconds)
                .then(b.id.cmp(&a.id))
        });
        records
    }

    /// Reconcile against `page`, then put the remaining pending records for
    /// `subject` at the head of page 1. Later pages are left alone.
    pub fn merge_into(&self, subject: &Subject, page: &mut Page) {
        self.reconcile(&page.items);
        if page.page_index != 1 {
            return;
        }
        let pending = self.pending(subject);
        if pending.is_empty() {
            return;
        }
        page.total_items += pending.len() as u64;
        page.items.splice(0..0, pending);
    }

    fn expire(&self) {
        let now = self.clock.now();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| {
            now.signed_duration_since(entry.injected_at)
                .to_std()
                .map(|age| age < ttl)
                .unwrap_or(true)
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
