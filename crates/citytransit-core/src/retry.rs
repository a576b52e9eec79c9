//! Retry policy for upstream calls.
//!
//! Retries apply to server errors and transport failures only; client
//! errors and decode failures are surfaced immediately.

use std::time::Duration;

use crate::cache::CachePolicy;

/// Backoff schedule between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// The initial backoff duration.
    pub base: Duration,
    /// The multiplicative factor for each subsequent retry.
    pub factor: f64,
    /// The maximum duration to wait between retries.
    pub max: Duration,
    /// Whether to apply random jitter (+/- 50%) to the delay.
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2.0,
            max: Duration::from_secs(8),
            jitter: false,
        }
    }
}

impl Backoff {
    /// Delay before retry `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        let scale = self.factor.powi(attempt as i32);
        let seconds = self.base.as_secs_f64() * scale;
        let mut delay = Duration::from_secs_f64(seconds.min(self.max.as_secs_f64()));

        if self.jitter {
            let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
            let random_offset = fastrand::u64(0..=(jitter_ms * 2));
            let total_ms = delay.as_millis() as i64 + (random_offset as i64 - jitter_ms as i64);
            delay = Duration::from_millis(total_ms.max(0) as u64);
        }

        delay
    }
}

/// Retry budget for one upstream call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Budget for a read under the given cache policy.
    ///
    /// Offline devices get no retries; cache-first reads race a fallback
    /// on a short timer and get a single retry; everything else gets the
    /// full 1s/2s/4s ladder.
    pub fn for_policy(policy: CachePolicy, offline: bool) -> Self {
        if offline {
            return Self::no_retry();
        }
        match policy {
            CachePolicy::CacheFirst => Self {
                max_retries: 1,
                ..Self::default()
            },
            _ => Self::default(),
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}
