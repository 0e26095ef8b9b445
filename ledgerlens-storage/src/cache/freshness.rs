//! Freshness bands for cache reads.
//!
//! Every entry falls in exactly one band at a given instant: `Fresh` entries
//! are served with no network activity, `Stale` entries are served while a
//! background refresh runs, and anything older (or absent) is a `Miss` that
//! blocks the caller until a refresh completes.

use super::key::class;
use chrono::{DateTime, Utc};
use ledgerlens_core::{CacheClassConfig, CacheConfig};
use std::collections::HashMap;
use std::time::Duration;

/// Age band of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheStatus {
    Fresh,
    Stale,
    Miss,
}

/// Age thresholds for one class of keys.
///
/// `fresh` if `age < fresh_for`, `stale` if `fresh_for <= age < stale_for`,
/// `miss` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub fresh_for: Duration,
    pub stale_for: Duration,
}

impl FreshnessPolicy {
    pub fn new(fresh_for: Duration, stale_for: Duration) -> Self {
        Self {
            fresh_for,
            stale_for: stale_for.max(fresh_for),
        }
    }

    /// Never leaves the fresh band. For records, which are immutable.
    pub fn immutable() -> Self {
        Self {
            fresh_for: Duration::MAX,
            stale_for: Duration::MAX,
        }
    }

    pub fn classify(&self, age: Duration) -> CacheStatus {
        if age < self.fresh_for {
            CacheStatus::Fresh
        } else if age < self.stale_for {
            CacheStatus::Stale
        } else {
            CacheStatus::Miss
        }
    }

    /// Band of an entry written at `written_at`, observed at `now`.
    ///
    /// Entries stamped in the future (clock adjustments) count as age zero.
    pub fn classify_at(&self, written_at: DateTime<Utc>, now: DateTime<Utc>) -> CacheStatus {
        self.classify(age_between(written_at, now))
    }
}

impl From<CacheClassConfig> for FreshnessPolicy {
    fn from(bands: CacheClassConfig) -> Self {
        Self::new(bands.fresh_for(), bands.stale_for())
    }
}

pub(crate) fn age_between(written_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(written_at)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Freshness policies keyed by key class.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    default: FreshnessPolicy,
    classes: HashMap<String, FreshnessPolicy>,
}

impl CachePolicy {
    pub fn new(default: FreshnessPolicy) -> Self {
        Self {
            default,
            classes: HashMap::new(),
        }
    }

    /// Records never change once assigned an id, so their class starts out
    /// immutable; an explicit `[cache.classes.record]` entry still wins.
    pub fn from_config(config: &CacheConfig) -> Self {
        let mut policy = Self::new(FreshnessPolicy::new(
            Duration::from_millis(config.fresh_ms),
            Duration::from_millis(config.stale_ms),
        ))
        .with_class(class::RECORD, FreshnessPolicy::immutable());
        for (class, bands) in &config.classes {
            policy.classes.insert(class.clone(), (*bands).into());
        }
        policy
    }

    pub fn with_class(mut self, class: impl Into<String>, policy: FreshnessPolicy) -> Self {
        self.classes.insert(class.into(), policy);
        self
    }

    pub fn for_class(&self, class: &str) -> FreshnessPolicy {
        self.classes.get(class).copied().unwrap_or(self.default)
    }
}

/// How a value handed out by [`get_or_refresh`](super::TieredCache::get_or_refresh)
/// was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
    /// From the fresh band, no network activity.
    Fresh,
    /// From the stale band; a background refresh was scheduled.
    Stale,
    /// Fetched on the caller's behalf after a miss.
    Fetched,
}

/// Result of a cache read, carrying staleness metadata.
///
/// The value is an owned copy; mutating it never touches the cache.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    written_at: DateTime<Utc>,
    served: Served,
}

impl<T> CacheRead<T> {
    pub fn new(value: T, written_at: DateTime<Utc>, served: Served) -> Self {
        Self {
            value,
            written_at,
            served,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// When the served value was installed.
    pub fn written_at(&self) -> DateTime<Utc> {
        self.written_at
    }

    pub fn served(&self) -> Served {
        self.served
    }

    /// Whether the value came from the cache rather than a fetch.
    pub fn was_cache_hit(&self) -> bool {
        !matches!(self.served, Served::Fetched)
    }

    /// Whether a background refresh is running for this value. The UI shows
    /// its subtle "refreshing" state while this is true.
    pub fn is_revalidating(&self) -> bool {
        matches!(self.served, Served::Stale)
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            written_at: self.written_at,
            served: self.served,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
