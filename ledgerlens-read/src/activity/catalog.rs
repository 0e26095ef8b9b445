//! Mapping from activity queries to view requests.

use ledgerlens_core::lenient;
use ledgerlens_core::{ActivityConfig, ActivityRecord, ReadError, ReadRequest, Subject};
use serde_json::{json, Value};

/// Knows which view calls answer activity questions and how to decode them.
///
/// The paginator only talks to the remote through this trait, so a
/// deployment with different view names or payload shapes supplies its own
/// catalog instead of touching pagination.
pub trait ActivityCatalog: Send + Sync {
    /// Total number of records for `subject`.
    fn count_request(&self, subject: &Subject) -> ReadRequest;

    /// Every record id for `subject`, in any order.
    fn ids_request(&self, subject: &Subject) -> ReadRequest;

    /// A single record by id.
    fn record_request(&self, id: u64) -> ReadRequest;

    /// The `limit` most recent raw events, across all subjects.
    fn events_request(&self, limit: u64) -> ReadRequest;

    fn decode_count(&self, value: &Value) -> Result<u64, ReadError> {
        lenient::u64_from_value(value)
            .ok_or_else(|| ReadError::malformed(format!("activity count is not an integer: {value}")))
    }

    fn decode_ids(&self, value: &Value) -> Result<Vec<u64>, ReadError> {
        lenient::u64_list_from_value(value)
            .ok_or_else(|| ReadError::malformed("activity ids are not an integer list"))
    }

    fn decode_record(&self, value: Value) -> Result<ActivityRecord, ReadError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Decode an event page. Events that do not map to a record are
    /// skipped; only a payload that is not a list at all is an error.
    fn decode_events(&self, value: Value) -> Result<Vec<ActivityRecord>, ReadError> {
        let Value::Array(events) = value else {
            return Err(ReadError::malformed("event log payload is not a list"));
        };
        let mut records = Vec::with_capacity(events.len());
        for event in events {
            match serde_json::from_value::<ActivityRecord>(event) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable event"),
            }
        }
        Ok(records)
    }
}

/// Catalog driven by the view names in [`ActivityConfig`].
///
/// Subjects are passed as `["dao", address]`, `["user", address]` or
/// `["global"]`; records by `[id]`; events by `[limit]`.
#[derive(Debug, Clone)]
pub struct ViewCatalog {
    count_view: String,
    ids_view: String,
    record_view: String,
    events_view: String,
}

impl ViewCatalog {
    pub fn from_config(config: &ActivityConfig) -> Self {
        Self {
            count_view: config.count_view.clone(),
            ids_view: config.ids_view.clone(),
            record_view: config.record_view.clone(),
            events_view: config.events_view.clone(),
        }
    }

    fn subject_args(subject: &Subject) -> Vec<Value> {
        match subject {
            Subject::Dao { address } => vec![json!("dao"), json!(address.to_ascii_lowercase())],
            Subject::User { address } => vec![json!("user"), json!(address.to_ascii_lowercase())],
            Subject::Global => vec![json!("global")],
        }
    }
}

impl ActivityCatalog for ViewCatalog {
    fn count_request(&self, subject: &Subject) -> ReadRequest {
        ReadRequest::new(&self.count_view, Self::subject_args(subject))
    }

    fn ids_request(&self, subject: &Subject) -> ReadRequest {
        ReadRequest::new(&self.ids_view, Self::subject_args(subject))
    }

    fn record_request(&self, id: u64) -> ReadRequest {
        ReadRequest::new(&self.record_view, vec![json!(id)])
    }

    fn events_request(&self, limit: u64) -> ReadRequest {
        ReadRequest::new(&self.events_view, vec![json!(limit)])
    }
}
