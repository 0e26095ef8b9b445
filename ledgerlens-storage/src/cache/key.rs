//! Cache keys.
//!
//! A key is a class (which selects the freshness policy) plus an identity.
//! Keys for view requests are derived from the request itself, so two
//! equivalent requests always land on the same entry.

use ledgerlens_core::ReadRequest;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between class and identity in the encoded form.
const SEPARATOR: char = '|';

/// Well-known key classes.
pub mod class {
    pub const VIEW: &str = "view";
    pub const COUNT: &str = "count";
    pub const IDS: &str = "ids";
    pub const RECORD: &str = "record";
    pub const EVENTS: &str = "events";
}

/// A cache key scoped to a key class.
///
/// Only constructible through [`CacheKey::new`] and friends, which sanitize
/// the class so the encoded form always splits back unambiguously.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey {
    inner: KeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct KeyInner {
    class: String,
    identity: String,
}

impl CacheKey {
    pub fn new(class: impl Into<String>, identity: impl Into<String>) -> Self {
        let class = class.into().replace(SEPARATOR, "_");
        Self {
            inner: KeyInner {
                class,
                identity: identity.into(),
            },
        }
    }

    /// Key for a view request in the generic `view` class.
    pub fn for_request(request: &ReadRequest) -> Self {
        Self::in_class(class::VIEW, request)
    }

    /// Key for a view request in a specific class.
    pub fn in_class(class: &str, request: &ReadRequest) -> Self {
        Self::new(class, request.cache_identity())
    }

    pub fn class(&self) -> &str {
        &self.inner.class
    }

    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    /// Encoded form used in durable snapshots: `class|identity`.
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.inner.class, SEPARATOR, self.inner.identity)
    }

    /// Parse an encoded key. Returns `None` if the separator is missing.
    pub fn decode(encoded: &str) -> Option<Self> {
        let (class, identity) = encoded.split_once(SEPARATOR)?;
        Some(Self::new(class, identity))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.encode()
    }
}

impl TryFrom<String> for CacheKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CacheKey::decode(&value).ok_or_else(|| format!("cache key without class: {value:?}"))
    }
}
