// Opt-in retry policies for callers that layer retries on top of steps.
// Nothing in the engine retries by default.

use rand::Rng;
use std::time::Duration;

/// Retry strategy trait for calculating retry delays
pub trait RetryStrategy: Send + Sync {
    /// Delay before retry number `attempt` (0-based), or `None` once the
    /// strategy gives up
    fn next_delay(&self, attempt: u32) -> Option<Duration>;

    fn should_retry(&self, attempt: u32) -> bool {
        self.next_delay(attempt).is_some()
    }
}

/// Exponential backoff with proportional jitter.
/// Doubles from `base_delay` up to `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    max_retries: u32,
    jitter_factor: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            max_retries: 3,
            jitter_factor: 0.1,
        }
    }
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(
        base_delay: Duration,
        max_delay: Duration,
        max_retries: u32,
        jitter_factor: f64,
    ) -> Self {
        Self {
            base_delay,
            max_delay,
            max_retries,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    fn base_delay_ms(&self, attempt: u32) -> u64 {
        let base = self.base_delay.as_millis() as u64;
        let factor = 2_u64.checked_pow(attempt).unwrap_or(u64::MAX);
        base.saturating_mul(factor)
            .min(self.max_delay.as_millis() as u64)
    }

    fn jitter_ms(&self, delay_ms: u64) -> u64 {
        let range = (delay_ms as f64 * self.jitter_factor) as u64;
        if range == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..=range)
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let delay_ms = self.base_delay_ms(attempt);
        Some(Duration::from_millis(delay_ms + self.jitter_ms(delay_ms)))
    }
}

/// Fixed delay retry strategy
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_retries: u32,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_retries: u32) -> Self {
        Self { delay, max_retries }
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_retries).then_some(self.delay)
    }
}
