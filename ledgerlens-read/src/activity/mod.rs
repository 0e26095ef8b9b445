//! Activity log: discovery, pagination and optimistic injection.

pub mod catalog;
pub mod paginator;
pub mod provisional;

pub use catalog::{ActivityCatalog, ViewCatalog};
pub use paginator::LogPaginator;
pub use provisional::{ProvisionalKey, ProvisionalLedger};
