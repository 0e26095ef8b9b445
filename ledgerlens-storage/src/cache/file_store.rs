//! JSON-file durable store: one file per namespace.

use ledgerlens_core::StoreError;
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::traits::DurableStore;

/// Stores each namespace as `<dir>/<namespace>.json`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `namespace`.
    pub fn path_for(&self, namespace: &str) -> PathBuf {
        let file_name: String = namespace
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

impl DurableStore for JsonFileStore {
    fn load(&self, namespace: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(namespace);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| StoreError::Io {
            namespace: namespace.to_string(),
            reason: e.to_string(),
        })?;
        match serde_json::from_str::<Value>(&contents) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(
                    namespace,
                    path = %path.display(),
                    error = %e,
                    "Ignoring corrupt durable snapshot"
                );
                Ok(None)
            }
        }
    }

    fn save(&self, namespace: &str, value: &Value) -> Result<(), StoreError> {
        let io_err = |e: std::io::Error| StoreError::Io {
            namespace: namespace.to_string(),
            reason: e.to_string(),
        };
        std::fs::create_dir_all(&self.dir).map_err(io_err)?;
        let contents = serde_json::to_vec(value).map_err(|e| StoreError::Serialization {
            namespace: namespace.to_string(),
            reason: e.to_string(),
        })?;
        let path = self.path_for(namespace);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents).map_err(io_err)?;
        std::fs::rename(&tmp, &path).map_err(io_err)?;
        Ok(())
    }
}
