//! Classification-aware retry with capped exponential backoff.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ledgerlens_core::{ReadError, ReadErrorKind, RetryConfig};

use crate::gate::RequestGate;

/// Retries a read through the shared [`RequestGate`].
///
/// Retryable failures (rate limit, transient network, cross-origin) are
/// retried up to `max_attempts` total attempts, sleeping
/// `min(base * 2^n, cap)` before retry `n` (zero-based). Every attempt is
/// dispatched through the gate again, so sustained failures never exceed
/// the gate's rate. Other failures return at once.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    gate: RequestGate,
    max_attempts: u32,
    base_delay: Duration,
    cap_delay: Duration,
    jitter_ms: u64,
}

impl RetryPolicy {
    pub fn new(gate: RequestGate, config: &RetryConfig) -> Self {
        Self {
            gate,
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            cap_delay: config.cap_delay(),
            jitter_ms: config.jitter_ms,
        }
    }

    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before the zero-based retry `retry`, without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.cap_delay)
            .min(self.cap_delay)
    }

    /// Run `task` until it succeeds, fails permanently, or runs out of
    /// attempts. The last error is returned unchanged.
    pub async fn execute<F, Fut, T>(&self, mut task: F) -> Result<T, ReadError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ReadError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let error = match self.gate.submit(task()).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_retryable() || attempt >= self.max_attempts {
                if error.kind() == ReadErrorKind::Malformed {
                    tracing::error!(error = %error, "Malformed view response");
                } else if error.is_retryable() {
                    tracing::warn!(attempt, error = %error, "Read failed after exhausting retries");
                }
                return Err(error);
            }

            let delay = jittered(self.backoff(attempt - 1), self.jitter_ms);
            tracing::warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                kind = %error.kind(),
                error = %error,
                "Retrying read"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn jittered(base: Duration, jitter_ms: u64) -> Duration {
    if jitter_ms == 0 {
        return base;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_nanos(0))
        .subsec_nanos() as u64;
    base.saturating_add(Duration::from_millis(nanos % jitter_ms))
}
