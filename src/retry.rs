//! Retry policy for downstream operations
//!
//! Exponential backoff with a uniform jitter band. The jittered delay is a
//! pure function of (attempt, jitter sample) so tests can pin the sample;
//! only the sampling wrapper touches the RNG.

use std::time::Duration;

use rand::Rng;

/// Retry configuration for transport-class failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling on the exponential delay, applied before jitter.
    pub max_delay: Duration,
    /// Exponential growth factor.
    pub multiplier: f64,
    /// Jitter band as a fraction of the capped delay (0.25 = ±25 %).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (zero-based), with a fresh jitter sample.
    pub fn delay(&self, attempt: u32) -> Duration {
        let sample = rand::thread_rng().gen_range(-1.0..=1.0);
        self.delay_with_jitter(attempt, sample)
    }

    /// Pure core of [`delay`]: `jitter` is a uniform sample in [-1, 1].
    ///
    /// The result is `min(base · multiplierⁿ, max) · (1 + band · jitter)`,
    /// clipped to non-negative.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let exponential = self.base_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = exponential.min(self.max_delay.as_secs_f64());
        let jittered = capped * (1.0 + self.jitter * jitter.clamp(-1.0, 1.0));
        Duration::from_secs_f64(jittered.max(0.0))
    }
}
