//! LedgerLens Core - Read Layer Types
//!
//! Data model, error taxonomy, configuration and the transport seam shared by
//! the storage and read crates. No scheduling or caching logic lives here.

pub mod activity;
pub mod clock;
pub mod config;
pub mod error;
pub mod lenient;
pub mod request;
pub mod transport;

pub use activity::{ActivityKind, ActivityRecord, Page, PageSource, RecordOrigin, Subject};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ActivityConfig, BatchConfig, CacheClassConfig, CacheConfig, GateConfig, LensConfig,
    RetryConfig,
};
pub use error::{ConfigError, LensError, LensResult, ReadError, ReadErrorKind, StoreError};
pub use request::{ReadRequest, ReadResult};
pub use transport::ViewTransport;
