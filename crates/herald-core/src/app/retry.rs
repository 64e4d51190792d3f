//! Retry policy for the visibility + commit tail.

use std::time::Duration;

/// Default pause between attempts. Must stay longer than the ledger's
/// minimum write interval so a retry is never wasted on a rate limit.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(120);

/// Retry policy for the publish tail.
///
/// The default is a fixed interval with no attempt bound: the tail runs until
/// the ledger accepts the write or the run is cancelled.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    /// Backoff multiplier. `1.0` keeps the delay fixed.
    pub multiplier: f64,

    /// Upper bound for a single delay.
    pub max_delay: Option<Duration>,

    /// Total attempts allowed. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            multiplier: 1.0,
            max_delay: None,
            max_attempts: None,
        }
    }

    pub fn exponential(base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay: Some(max_delay),
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Delay before the next attempt.
    ///
    /// # Arguments
    /// * `attempts` - Number of attempts already made (1-indexed).
    ///
    /// delay = base_delay * multiplier^(attempts - 1), capped at `max_delay`.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(attempts.saturating_sub(1) as i32);
        let delay = Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Whether another attempt may follow `attempts` failed ones.
    pub fn allows_retry_after(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_BACKOFF)
    }
}
