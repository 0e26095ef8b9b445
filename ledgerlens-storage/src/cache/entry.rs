//! Cache entries and the durable snapshot format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::key::CacheKey;

/// One cached value.
///
/// `written_at` never moves backwards for a key: an install older than the
/// current entry is discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: Value,
    pub written_at: DateTime<Utc>,
    /// Version tag the entry was written under.
    pub version: String,
}

impl CacheEntry {
    /// Whether `candidate_written_at` may replace this entry.
    pub fn accepts(&self, candidate_written_at: DateTime<Utc>) -> bool {
        candidate_written_at >= self.written_at
    }
}

/// Document persisted under the cache namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    pub version: String,
    pub entries: Vec<CacheEntry>,
}
