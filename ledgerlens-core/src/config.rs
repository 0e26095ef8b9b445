//! Configuration loading for the read layer.
//!
//! All fields are required in a config file. `LensConfig::defaults()` builds
//! the documented design defaults for programmatic use.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Spacing enforced between the starts of consecutive remote calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateConfig {
    pub min_spacing_ms: u64,
}

/// Exponential backoff with a hard ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub cap_delay_ms: u64,
    /// Upper bound of additive jitter; zero disables it.
    pub jitter_ms: u64,
}

/// Windowed batch dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub inter_batch_delay_ms: u64,
}

/// Age bands for one class of cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheClassConfig {
    pub fresh_ms: u64,
    pub stale_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Durable-store namespace the cache snapshots into.
    pub namespace: String,
    /// Entries tagged with any other version are dropped on hydration.
    pub version: String,
    pub fresh_ms: u64,
    pub stale_ms: u64,
    /// Per key-class overrides (`count`, `ids`, `record`, `events`, `view`, ...).
    pub classes: BTreeMap<String, CacheClassConfig>,
}

/// View functions and paging limits for the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivityConfig {
    pub count_view: String,
    pub ids_view: String,
    pub record_view: String,
    pub events_view: String,
    pub overfetch: u64,
    pub max_page_size: u64,
    pub fallback_on_empty: bool,
    pub provisional_ttl_ms: u64,
}

/// Master configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LensConfig {
    pub gate: GateConfig,
    pub retry: RetryConfig,
    pub batch: BatchConfig,
    pub cache: CacheConfig,
    pub activity: ActivityConfig,
}

impl LensConfig {
    /// Design defaults: 1 s spacing, 3 attempts backing off 2 s to 30 s,
    /// windows of 4 with 1.5 s pauses, 60 s fresh / 300 s stale.
    pub fn defaults() -> Self {
        let mut classes = BTreeMap::new();
        classes.insert(
            "count".to_string(),
            CacheClassConfig {
                fresh_ms: 15_000,
                stale_ms: 120_000,
            },
        );
        classes.insert(
            "ids".to_string(),
            CacheClassConfig {
                fresh_ms: 15_000,
                stale_ms: 120_000,
            },
        );
        classes.insert(
            "events".to_string(),
            CacheClassConfig {
                fresh_ms: 30_000,
                stale_ms: 180_000,
            },
        );

        Self {
            gate: GateConfig {
                min_spacing_ms: 1_000,
            },
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 2_000,
                cap_delay_ms: 30_000,
                jitter_ms: 0,
            },
            batch: BatchConfig {
                batch_size: 4,
                inter_batch_delay_ms: 1_500,
            },
            cache: CacheConfig {
                namespace: "ledgerlens.cache".to_string(),
                version: "1".to_string(),
                fresh_ms: 60_000,
                stale_ms: 300_000,
                classes,
            },
            activity: ActivityConfig {
                count_view: "get_activity_count".to_string(),
                ids_view: "get_activity_ids".to_string(),
                record_view: "get_activity".to_string(),
                events_view: "get_recent_events".to_string(),
                overfetch: 3,
                max_page_size: 100,
                fallback_on_empty: true,
                provisional_ttl_ms: 600_000,
            },
        }
    }

    /// Read, parse and validate a TOML config file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: LensConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be >= 1"));
        }
        if self.retry.cap_delay_ms < self.retry.base_delay_ms {
            return Err(invalid(
                "retry.cap_delay_ms",
                "must be >= retry.base_delay_ms",
            ));
        }
        if self.batch.batch_size == 0 {
            return Err(invalid("batch.batch_size", "must be >= 1"));
        }
        if self.cache.namespace.trim().is_empty() {
            return Err(invalid("cache.namespace", "must not be empty"));
        }
        if self.cache.version.trim().is_empty() {
            return Err(invalid("cache.version", "must not be empty"));
        }
        if self.cache.stale_ms < self.cache.fresh_ms {
            return Err(invalid("cache.stale_ms", "must be >= cache.fresh_ms"));
        }
        for (class, bands) in &self.cache.classes {
            if bands.stale_ms < bands.fresh_ms {
                return Err(ConfigError::InvalidValue {
                    field: format!("cache.classes.{class}.stale_ms"),
                    reason: "must be >= fresh_ms".to_string(),
                });
            }
        }
        for (field, value) in [
            ("activity.count_view", &self.activity.count_view),
            ("activity.ids_view", &self.activity.ids_view),
            ("activity.record_view", &self.activity.record_view),
            ("activity.events_view", &self.activity.events_view),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }
        if self.activity.overfetch == 0 {
            return Err(invalid("activity.overfetch", "must be >= 1"));
        }
        if self.activity.max_page_size == 0 {
            return Err(invalid("activity.max_page_size", "must be >= 1"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

impl GateConfig {
    pub fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_ms)
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn cap_delay(&self) -> Duration {
        Duration::from_millis(self.cap_delay_ms)
    }
}

impl BatchConfig {
    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }
}

impl CacheClassConfig {
    pub fn fresh_for(&self) -> Duration {
        Duration::from_millis(self.fresh_ms)
    }

    pub fn stale_for(&self) -> Duration {
        Duration::from_millis(self.stale_ms)
    }
}

impl CacheConfig {
    /// Bands for a key class, falling back to the cache-wide bands.
    pub fn bands_for(&self, class: &str) -> CacheClassConfig {
        self.classes.get(class).copied().unwrap_or(CacheClassConfig {
            fresh_ms: self.fresh_ms,
            stale_ms: self.stale_ms,
        })
    }
}

impl ActivityConfig {
    pub fn provisional_ttl(&self) -> Duration {
        Duration::from_millis(self.provisional_ttl_ms)
    }
}

// =============================================================================
// TESTS
// =============================================================================
