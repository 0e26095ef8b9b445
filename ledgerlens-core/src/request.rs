//! Read request descriptors and their cache identity.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Decoded return value of a view call. Opaque to the read layer.
pub type ReadResult = Value;

/// An immutable descriptor of a single view query.
///
/// Two requests are equivalent when their function identifier and arguments
/// are structurally equal; the optional cache key override takes no part in
/// equivalence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadRequest {
    function: String,
    args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cache_key: Option<String>,
}

impl ReadRequest {
    pub fn new(function: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            function: function.into(),
            args,
            cache_key: None,
        }
    }

    /// A request with no arguments.
    pub fn call(function: impl Into<String>) -> Self {
        Self::new(function, Vec::new())
    }

    /// Replace the derived cache identity with an explicit one.
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// The explicit cache key override, if one was set.
    pub fn cache_key_override(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }

    /// Deterministic identity used to key cache entries.
    ///
    /// Object keys are sorted before hashing, so structurally equal arguments
    /// share a digest whatever order their maps were built in.
    pub fn cache_identity(&self) -> String {
        if let Some(key) = &self.cache_key {
            return key.clone();
        }
        let mut canonical = String::new();
        write_canonical(&Value::Array(self.args.clone()), &mut canonical);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{}:{}", self.function, hex::encode(hasher.finalize()))
    }

    pub fn is_equivalent(&self, other: &ReadRequest) -> bool {
        self.function == other.function && self.args == other.args
    }
}

/// Compact JSON with object keys in lexicographic order at every depth.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

impl PartialEq for ReadRequest {
    fn eq(&self, other: &Self) -> bool {
        self.is_equivalent(other)
    }
}

impl Eq for ReadRequest {}
