//! Windowed batch execution with per-task settlement.

use std::future::Future;
use std::time::Duration;

use futures_util::future::join_all;
use ledgerlens_core::{BatchConfig, ReadError};

use crate::retry::RetryPolicy;

/// Issues many independent reads in windows of at most `batch_size`.
///
/// A window is dispatched concurrently and fully settled before the next
/// one starts, after `inter_batch_delay`. One task's failure never cancels
/// or fails its siblings.
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    retry: RetryPolicy,
    batch_size: usize,
    inter_batch_delay: Duration,
}

impl BatchExecutor {
    pub fn new(retry: RetryPolicy, config: &BatchConfig) -> Self {
        Self {
            retry,
            batch_size: config.batch_size.max(1),
            inter_batch_delay: config.inter_batch_delay(),
        }
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn inter_batch_delay(&self) -> Duration {
        self.inter_batch_delay
    }

    /// Run each task under the retry policy, window by window.
    ///
    /// Results come back in task order.
    pub async fn run_batch<F, Fut, T>(&self, tasks: Vec<F>) -> Vec<Result<T, ReadError>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ReadError>>,
    {
        self.settle(tasks.into_iter().map(|task| self.retry.execute(task)))
            .await
    }

    /// Settle already-built futures in windows. Futures are lazy, so none
    /// starts before its window does.
    pub async fn settle<I, Fut, T>(&self, futures: I) -> Vec<Result<T, ReadError>>
    where
        I: IntoIterator<Item = Fut>,
        Fut: Future<Output = Result<T, ReadError>>,
    {
        let mut pending = futures.into_iter().peekable();
        let mut results = Vec::new();
        let mut window_index = 0usize;

        while pending.peek().is_some() {
            if window_index > 0 {
                tokio::time::sleep(self.inter_batch_delay).await;
            }
            let window: Vec<Fut> = pending.by_ref().take(self.batch_size).collect();
            tracing::debug!(window = window_index, size = window.len(), "Dispatching batch window");
            results.extend(join_all(window).await);
            window_index += 1;
        }

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            tracing::debug!(total = results.len(), failed, "Batch settled with failures");
        }
        results
    }
}
