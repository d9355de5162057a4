use std::time::Duration;

use rand::Rng;

use crate::error::ConfigError;

/// Backoff applied between retries of a conflicted write.
///
/// Retries never stop; the policy only decides how long to wait before the
/// next attempt. Attempt counters are owned by the caller and reset once a
/// write goes through.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Upper bound for any single delay.
    pub max_delay: Duration,

    /// Growth factor per attempt.
    pub multiplier: f64,

    /// Randomize each delay into `[d/2, d]` so racing writers drift apart.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(250),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Retry on the next tick, no waiting.
    pub const fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.multiplier >= 1.0) {
            return Err(ConfigError::RetryMultiplier(self.multiplier.to_string()));
        }
        if self.initial_delay > self.max_delay {
            return Err(ConfigError::RetryDelays);
        }
        Ok(())
    }

    /// Delay for the given attempt (0-based) before jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        let exponent = attempt.min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());

        // powi overflows to infinity for large attempts; min() above maps that
        // to max_delay, which is always finite.
        Duration::from_secs_f64(capped)
    }

    /// Delay for the given attempt, with jitter if enabled.
    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.backoff(attempt);
        if !self.jitter || base.is_zero() {
            return base;
        }

        let nanos = u64::try_from(base.as_nanos()).unwrap_or(u64::MAX);
        Duration::from_nanos(rng.gen_range(nanos / 2..=nanos))
    }
}
