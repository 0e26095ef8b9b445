//! The remote read transport consumed by the read layer.
//!
//! Encoding of contract arguments and decoding of return values belong to
//! the implementor; the read layer only schedules, retries and caches calls.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ReadError;
use crate::request::{ReadRequest, ReadResult};

/// A side-effect-free view call against the remote state machine.
///
/// Implementations should report failures with a classified [`ReadError`];
/// transports that only see raw messages can use [`ReadError::classify`].
#[async_trait]
pub trait ViewTransport: Send + Sync {
    async fn call_view(&self, request: &ReadRequest) -> Result<ReadResult, ReadError>;
}

#[async_trait]
impl<T: ViewTransport + ?Sized> ViewTransport for Arc<T> {
    async fn call_view(&self, request: &ReadRequest) -> Result<ReadResult, ReadError> {
        (**self).call_view(request).await
    }
}
