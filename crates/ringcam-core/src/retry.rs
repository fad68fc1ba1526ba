//! Exponential backoff with jitter for retry loops.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::ApiError;

/// Growth factor between consecutive waits.
const BACKOFF_MULTIPLIER: u32 = 2;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    /// Delay before retry number `retry` (0-based), without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = BACKOFF_MULTIPLIER.saturating_pow(retry.min(16));
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Delay with up to 50% random jitter added, still capped at `max`.
    pub fn delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        let jitter_ms = u64::try_from(base.as_millis() / 2).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        base.saturating_add(Duration::from_millis(jitter)).min(self.max)
    }

    /// Sleep for the jittered delay, returning early if `cancel` fires.
    pub async fn wait(&self, retry: u32, cancel: &CancellationToken) -> Result<(), ApiError> {
        let delay = self.delay(retry);
        debug!(retry, delay_ms = delay.as_millis() as u64, "Backing off");
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = cancel.cancelled() => Err(ApiError::Cancelled),
        }
    }
}
