//! Exponential backoff shared by the collector and the summarizer.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Upper bound on a single backoff sleep.
const MAX_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Multiply each delay by a random factor in 0.8..=1.2.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(800),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub const fn fixed(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            jitter: false,
        }
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`.
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let factor = 1_u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor).min(MAX_DELAY);

        if self.jitter {
            let scale = rand::rng().random_range(0.8..=1.2);
            delay.mul_f64(scale)
        } else {
            delay
        }
    }

    /// Whether retry number `retry` (1-based) is still allowed.
    #[must_use]
    pub const fn can_retry(&self, retry: u32) -> bool {
        retry <= self.max_retries
    }
}

/// Sleep for `delay` unless `cancel` fires first. Returns `false` when
/// cancelled.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
