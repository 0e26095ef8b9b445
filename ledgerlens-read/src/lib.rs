//! LedgerLens Read - Resilient Read Layer
//!
//! Rate-limited, retried and cached reads against a remote view endpoint,
//! plus pagination over its append-only activity log.
//!
//! All outbound calls funnel through one [`RequestGate`]; [`RetryPolicy`]
//! and [`BatchExecutor`] build on it, and [`ChainReader`] puts the
//! [`TieredCache`](ledgerlens_storage::TieredCache) in front of all three.

pub mod activity;
pub mod batch;
pub mod gate;
pub mod lens;
pub mod reader;
pub mod retry;

pub use activity::{
    ActivityCatalog, LogPaginator, ProvisionalKey, ProvisionalLedger, ViewCatalog,
};
pub use batch::BatchExecutor;
pub use gate::RequestGate;
pub use lens::LedgerLens;
pub use reader::ChainReader;
pub use retry::RetryPolicy;
