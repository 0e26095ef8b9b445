//! Activity log data model.
//!
//! Records are immutable once the remote assigns them an id. The read layer
//! only retrieves and orders them; pages are derived views that are never
//! cached themselves.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lenient;

// ============================================================================
// RECORDS
// ============================================================================

/// Kind of a notable event in the remote activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    DaoCreated,
    ProposalCreated,
    VoteCast,
    ProposalExecuted,
    MemberJoined,
    MemberLeft,
    Deposit,
    Withdrawal,
    /// Any kind this client does not know yet.
    #[serde(other)]
    Unknown,
}

/// Where a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordOrigin {
    /// Observed from the remote source.
    #[default]
    Confirmed,
    /// Injected locally before the remote reflects it.
    Provisional { temp_id: Uuid },
}

impl RecordOrigin {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional { .. })
    }
}

/// One immutable entry of the remote activity log.
///
/// Identity is `id`. A provisional record whose real id is not known yet
/// carries `id == 0`, which the remote never assigns; its identity is the
/// `temp_id` of its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    #[serde(deserialize_with = "lenient::deserialize_u64")]
    pub id: u64,
    pub kind: ActivityKind,
    pub subject_address: String,
    pub dao_address: String,
    #[serde(deserialize_with = "lenient::deserialize_u64")]
    pub timestamp_seconds: u64,
    /// Decimal amount as the remote renders it, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    pub transaction_hash: String,
    #[serde(default, skip_serializing_if = "RecordOrigin::is_confirmed")]
    pub origin: RecordOrigin,
}

impl ActivityRecord {
    pub fn is_provisional(&self) -> bool {
        self.origin.is_provisional()
    }

    /// Natural key used to recognise the confirmed twin of a provisional
    /// record whose real id was unknown at injection time.
    pub fn fingerprint(&self) -> (ActivityKind, String) {
        (self.kind, self.transaction_hash.to_ascii_lowercase())
    }
}

// ============================================================================
// SUBJECTS
// ============================================================================

/// Whose activity a page lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Subject {
    Dao { address: String },
    User { address: String },
    Global,
}

impl Subject {
    pub fn dao(address: impl Into<String>) -> Self {
        Self::Dao {
            address: address.into(),
        }
    }

    pub fn user(address: impl Into<String>) -> Self {
        Self::User {
            address: address.into(),
        }
    }

    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Dao { address } | Self::User { address } => Some(address),
            Self::Global => None,
        }
    }

    /// Stable label used in cache keys and logs.
    pub fn label(&self) -> String {
        match self {
            Self::Dao { address } => format!("dao:{}", address.to_ascii_lowercase()),
            Self::User { address } => format!("user:{}", address.to_ascii_lowercase()),
            Self::Global => "global".to_string(),
        }
    }

    /// Whether a record belongs to this subject. Addresses compare
    /// case-insensitively.
    pub fn matches(&self, record: &ActivityRecord) -> bool {
        match self {
            Self::Dao { address } => record.dao_address.eq_ignore_ascii_case(address),
            Self::User { address } => record.subject_address.eq_ignore_ascii_case(address),
            Self::Global => true,
        }
    }
}

// ============================================================================
// PAGES
// ============================================================================

/// Which discovery strategy produced a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSource {
    /// Authoritative count plus id list.
    Indexed,
    /// Event-log scan; totals and `has_next` are heuristics.
    EventScan,
    /// Neither strategy produced data.
    Empty,
}

/// A derived, disposable view of one page of activity, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub items: Vec<ActivityRecord>,
    pub page_index: u64,
    pub page_size: u64,
    pub total_items: u64,
    pub has_next: bool,
    pub has_prev: bool,
    pub source: PageSource,
}

impl Page {
    /// A renderable page with no items.
    pub fn empty(page_index: u64, page_size: u64) -> Self {
        Self {
            items: Vec::new(),
            page_index,
            page_size,
            total_items: 0,
            has_next: false,
            has_prev: page_index > 1,
            source: PageSource::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.items.iter().map(|r| r.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_decodes_stringified_integers() {
        let record: ActivityRecord = serde_json::from_value(json!({
            "id": "17",
            "kind": "vote_cast",
            "subjectAddress": "0xAbC",
            "daoAddress": "0xdao",
            "timestampSeconds": 1_700_000_000u64,
            "transactionHash": "0xhash"
        }))
        .expect("record should decode");
        assert_eq!(record.id, 17);
        assert_eq!(record.kind, ActivityKind::VoteCast);
        assert_eq!(record.amount, None);
        assert!(record.origin.is_confirmed());
    }

    #[test]
    fn test_unknown_kind_is_tolerated() {
        let kind: ActivityKind = serde_json::from_value(json!("treasury_swept")).unwrap();
        assert_eq!(kind, ActivityKind::Unknown);
    }

    #[test]
    fn test_confirmed_origin_not_serialized() {
        let record = ActivityRecord {
            id: 1,
            kind: ActivityKind::Deposit,
            subject_address: "a".into(),
            dao_address: "d".into(),
            timestamp_seconds: 1,
            amount: Some("12.5".into()),
            transaction_hash: "0x1".into(),
            origin: RecordOrigin::Confirmed,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("origin").is_none());
        assert_eq!(value["amount"], json!("12.5"));
    }

    #[test]
    fn test_subject_matching_ignores_case() {
        let record = ActivityRecord {
            id: 3,
            kind: ActivityKind::MemberJoined,
            subject_address: "0xUSER".into(),
            dao_address: "0xDAO".into(),
            timestamp_seconds: 10,
            amount: None,
            transaction_hash: "0x3".into(),
            origin: RecordOrigin::Confirmed,
        };
        assert!(Subject::dao("0xdao").matches(&record));
        assert!(Subject::user("0xuser").matches(&record));
        assert!(!Subject::dao("0xother").matches(&record));
        assert!(Subject::Global.matches(&record));
    }

    #[test]
    fn test_subject_serde_shape() {
        let subject: Subject = serde_json::from_value(json!({"kind": "dao", "address": "0x1"})).unwrap();
        assert_eq!(subject, Subject::dao("0x1"));
        let global: Subject = serde_json::from_value(json!({"kind": "global"})).unwrap();
        assert_eq!(global, Subject::Global);
        assert_eq!(global.label(), "global");
    }

    #[test]
    fn test_empty_page() {
        let page = Page::empty(2, 10);
        assert!(page.is_empty());
        assert!(page.has_prev);
        assert!(!page.has_next);
        assert_eq!(page.source, PageSource::Empty);
    }
}
