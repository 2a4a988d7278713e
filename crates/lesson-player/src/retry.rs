//! Bounded retry with exponential backoff for remote calls.
//!
//! Used for the single manifest reconnect attempt and for remote progress
//! writes. Whether an error is worth another attempt is decided by
//! [`PlayerError::is_retryable`].

use std::future::Future;
use std::time::Duration;

use rand::RngExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{PlayerError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Upper bound for any single delay, jitter included.
    pub max_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    /// A policy that gives up after the first failure.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if !self.jitter {
            return delay;
        }

        let spread_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX) / 2;
        let headroom_ms =
            u64::try_from(self.max_delay.saturating_sub(delay).as_millis()).unwrap_or(0);
        let limit = spread_ms.min(headroom_ms);
        if limit == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::rng().random_range(0..limit))
    }
}

/// Run `operation` until it succeeds, fails permanently, runs out of
/// attempts, or `token` is cancelled.
///
/// `what` names the operation in log output.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    what: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        if token.is_cancelled() {
            return Err(PlayerError::Cancelled);
        }

        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() || attempt >= policy.max_retries {
            return Err(err);
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            operation = what,
            attempt = attempt + 1,
            max = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying after transient error"
        );
        tokio::select! {
            _ = token.cancelled() => return Err(PlayerError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
