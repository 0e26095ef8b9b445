//! Error types for LedgerLens operations

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use thiserror::Error;

// =============================================================================
// READ ERRORS
// =============================================================================

/// Failure of a single view read, classified by how the read layer reacts to it.
///
/// `RateLimited`, `TransientNetwork` and `CrossOriginBlocked` are absorbed by
/// the retry policy up to its attempt ceiling. `RemoteRejected` and
/// `Malformed` surface immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("Rate limited by remote: {message}")]
    RateLimited { message: String },

    #[error("Transient network failure: {message}")]
    TransientNetwork { message: String },

    #[error("Request blocked by cross-origin policy: {message}")]
    CrossOriginBlocked { message: String },

    #[error("Remote rejected request: {message}")]
    RemoteRejected { message: String },

    #[error("Malformed response: {message}")]
    Malformed { message: String },
}

/// Discriminant of a [`ReadError`], cheap to copy into log fields and stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadErrorKind {
    RateLimited,
    TransientNetwork,
    CrossOriginBlocked,
    RemoteRejected,
    Malformed,
}

impl fmt::Display for ReadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RateLimited => "rate_limited",
            Self::TransientNetwork => "transient_network",
            Self::CrossOriginBlocked => "cross_origin_blocked",
            Self::RemoteRejected => "remote_rejected",
            Self::Malformed => "malformed",
        };
        f.write_str(name)
    }
}

static RATE_LIMIT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b429\b|rate[\s_-]?limit|too many requests|quota|throttl")
        .expect("Invalid rate limit regex")
});

static CROSS_ORIGIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bcors\b|cross[\s-]?origin|access-control-allow-origin|blocked by")
        .expect("Invalid cross-origin regex")
});

static TRANSIENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)time[\s_-]?d?\s?out|connection (reset|refused|closed|aborted)|econnreset|econnrefused|dns|enotfound|network|failed to fetch|temporarily unavailable|\b50[234]\b",
    )
    .expect("Invalid transient network regex")
});

static MALFORMED_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)decod|pars(e|ing)|deserializ|invalid type|unexpected (token|end)|malformed")
        .expect("Invalid malformed regex")
});

impl ReadError {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited {
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientNetwork {
            message: message.into(),
        }
    }

    pub fn cross_origin(message: impl Into<String>) -> Self {
        Self::CrossOriginBlocked {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::RemoteRejected {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Classify an untyped transport message.
    ///
    /// Order matters: a rate-limit message that also mentions the network is
    /// still a rate limit, and a CORS failure usually reads like a network
    /// failure in browsers. Unrecognized messages are treated as an explicit
    /// remote rejection so they are never retried blindly.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        if RATE_LIMIT_PATTERN.is_match(&message) {
            Self::RateLimited { message }
        } else if CROSS_ORIGIN_PATTERN.is_match(&message) {
            Self::CrossOriginBlocked { message }
        } else if TRANSIENT_PATTERN.is_match(&message) {
            Self::TransientNetwork { message }
        } else if MALFORMED_PATTERN.is_match(&message) {
            Self::Malformed { message }
        } else {
            Self::RemoteRejected { message }
        }
    }

    pub fn kind(&self) -> ReadErrorKind {
        match self {
            Self::RateLimited { .. } => ReadErrorKind::RateLimited,
            Self::TransientNetwork { .. } => ReadErrorKind::TransientNetwork,
            Self::CrossOriginBlocked { .. } => ReadErrorKind::CrossOriginBlocked,
            Self::RemoteRejected { .. } => ReadErrorKind::RemoteRejected,
            Self::Malformed { .. } => ReadErrorKind::Malformed,
        }
    }

    /// Whether the retry policy may attempt the read again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ReadErrorKind::RateLimited
                | ReadErrorKind::TransientNetwork
                | ReadErrorKind::CrossOriginBlocked
        )
    }

    pub fn message(&self) -> &str {
        match self {
            Self::RateLimited { message }
            | Self::TransientNetwork { message }
            | Self::CrossOriginBlocked { message }
            | Self::RemoteRejected { message }
            | Self::Malformed { message } => message,
        }
    }
}

impl From<serde_json::Error> for ReadError {
    fn from(err: serde_json::Error) -> Self {
        Self::malformed(err.to_string())
    }
}

// =============================================================================
// STORE ERRORS
// =============================================================================

/// Durable key/value store errors.
///
/// These never reach readers: the cache logs and swallows them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store I/O failed for namespace {namespace}: {reason}")]
    Io { namespace: String, reason: String },

    #[error("Store serialization failed for namespace {namespace}: {reason}")]
    Serialization { namespace: String, reason: String },

    #[error("Store transaction failed: {reason}")]
    Transaction { reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

// =============================================================================
// CONFIG ERRORS
// =============================================================================

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse {
            reason: err.to_string(),
        }
    }
}

/// Master error type for all LedgerLens errors.
#[derive(Debug, Clone, Error)]
pub enum LensError {
    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for LedgerLens operations.
pub type LensResult<T> = Result<T, LensError>;

// =============================================================================
// TESTS
// =============================================================================
