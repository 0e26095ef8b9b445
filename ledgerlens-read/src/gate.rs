//! Serialized request throttle.
//!
//! Every outbound view call passes through one [`RequestGate`]. Callers queue
//! for a dispatch permit; a single dispatcher task hands permits out in FIFO
//! order, at least `min_spacing` apart. The dispatcher is the only writer of
//! the "last dispatch" cursor.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ledgerlens_core::{GateConfig, ReadError};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Handle to a request gate. Clones share one queue and one cursor.
#[derive(Debug, Clone)]
pub struct RequestGate {
    queue: mpsc::UnboundedSender<oneshot::Sender<Instant>>,
    min_spacing: Duration,
    dispatched: Arc<AtomicU64>,
}

impl RequestGate {
    /// Start a gate and its dispatcher task.
    ///
    /// Must be called inside a Tokio runtime. The dispatcher stops once every
    /// handle is dropped.
    pub fn new(min_spacing: Duration) -> Self {
        let (queue, requests) = mpsc::unbounded_channel();
        let dispatched = Arc::new(AtomicU64::new(0));
        tokio::spawn(dispatch(requests, min_spacing, Arc::clone(&dispatched)));
        Self {
            queue,
            min_spacing,
            dispatched,
        }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(config.min_spacing())
    }

    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Number of permits handed out so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Wait for this caller's turn. Returns the dispatch instant.
    ///
    /// Dropping the returned future before it resolves gives the slot up
    /// without advancing the cursor.
    pub async fn acquire(&self) -> Result<Instant, ReadError> {
        let (permit_tx, permit_rx) = oneshot::channel();
        self.queue
            .send(permit_tx)
            .map_err(|_| ReadError::transient("request gate closed"))?;
        permit_rx
            .await
            .map_err(|_| ReadError::transient("request gate closed"))
    }

    /// Run `task` once the gate dispatches it.
    ///
    /// The gate only decides when a task starts; the task's own outcome is
    /// returned unchanged and never affects later dispatches.
    pub async fn submit<Fut, T>(&self, task: Fut) -> Result<T, ReadError>
    where
        Fut: Future<Output = Result<T, ReadError>>,
    {
        self.acquire().await?;
        task.await
    }
}

async fn dispatch(
    mut requests: mpsc::UnboundedReceiver<oneshot::Sender<Instant>>,
    min_spacing: Duration,
    dispatched: Arc<AtomicU64>,
) {
    let mut last_dispatch: Option<Instant> = None;
    while let Some(waiter) = requests.recv().await {
        if waiter.is_closed() {
            continue;
        }
        if let Some(last) = last_dispatch {
            tokio::time::sleep_until(last + min_spacing).await;
        }
        let now = Instant::now();
        if waiter.send(now).is_ok() {
            last_dispatch = Some(now);
            let total = dispatched.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::debug!(dispatched = total, "Request gate dispatched call");
        }
    }
    tracing::debug!("Request gate closed");
}
