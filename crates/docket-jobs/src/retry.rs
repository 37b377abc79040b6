//! Backoff policies for re-admitted jobs.
//!
//! The number of retries is bounded by the queue's `retry_limit`; a policy
//! only decides how long a failed job waits before it becomes eligible for
//! promotion again.

use crate::config::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    /// Re-admit immediately.
    None,
    /// Fixed delay between attempts.
    Fixed,
    /// Exponential backoff with optional jitter.
    #[default]
    Exponential,
    /// Linear backoff.
    Linear,
}

/// Retry backoff policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Backoff strategy.
    pub strategy: RetryStrategy,

    /// Initial delay in milliseconds.
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds.
    pub max_delay_ms: u64,

    /// Backoff multiplier (exponential only).
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0). Zero disables jitter.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    /// Re-admits failed jobs without delay.
    #[must_use]
    pub fn none() -> Self {
        Self {
            strategy: RetryStrategy::None,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Creates a fixed delay policy.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        let delay_ms = duration_millis(delay);
        Self {
            strategy: RetryStrategy::Fixed,
            initial_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Creates an exponential backoff policy: 500ms, 1s, 2s, ... capped at 5 minutes.
    #[must_use]
    pub fn exponential() -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            initial_delay_ms: 500,
            max_delay_ms: 300_000,
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }

    /// Creates a linear backoff policy.
    #[must_use]
    pub fn linear(increment: Duration) -> Self {
        Self {
            strategy: RetryStrategy::Linear,
            initial_delay_ms: duration_millis(increment),
            max_delay_ms: 300_000,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = duration_millis(delay);
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = duration_millis(delay);
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enables jitter.
    #[must_use]
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Disables jitter.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }

    /// Delay before the given retry (1-based) may be promoted.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = match self.strategy {
            RetryStrategy::None => return Duration::ZERO,
            RetryStrategy::Fixed => self.initial_delay_ms,
            RetryStrategy::Exponential => {
                let exp = attempt.saturating_sub(1).min(63) as i32;
                let delay = self.initial_delay_ms as f64 * self.multiplier.powi(exp);
                if delay.is_finite() {
                    delay as u64
                } else {
                    u64::MAX
                }
            }
            RetryStrategy::Linear => self.initial_delay_ms.saturating_mul(u64::from(attempt)),
        };

        let capped_delay = base_delay.min(self.max_delay_ms);

        let final_delay = if self.jitter_factor > 0.0 {
            let jitter_range = (capped_delay as f64 * self.jitter_factor) as u64;
            let jitter = rand_jitter(jitter_range);
            capped_delay
                .saturating_add(jitter)
                .saturating_sub(jitter_range / 2)
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            strategy: config.strategy,
            initial_delay_ms: config.initial_delay_ms,
            max_delay_ms: config.max_delay_ms,
            multiplier: config.multiplier,
            jitter_factor: config.jitter_factor.clamp(0.0, 1.0),
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Pseudo-random jitter from the clock, fed through an LCG step.
#[allow(clippy::cast_possible_truncation)]
fn rand_jitter(range: u64) -> u64 {
    use std::time::SystemTime;

    if range == 0 {
        return 0;
    }

    let seed = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    let a: u64 = 6_364_136_223_846_793_005;
    let c: u64 = 1_442_695_040_888_963_407;

    let random = seed.wrapping_mul(a).wrapping_add(c);
    random % range
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_backoff() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(5), Duration::ZERO);
    }

    #[test]
    fn test_fixed_backoff() {
        let policy = RetryPolicy::fixed(Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(250));
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy::exponential().without_jitter();

        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::linear(Duration::from_secs(1));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(3000));
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = RetryPolicy::exponential()
            .with_max_delay(Duration::from_secs(10))
            .without_jitter();

        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let policy = RetryPolicy::fixed(Duration::from_millis(1000)).with_jitter(0.2);
        for _ in 0..20 {
            let delay = policy.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(900));
            assert!(delay <= Duration::from_millis(1100));
        }
    }

    #[test]
    fn test_from_config() {
        let config = RetryConfig {
            strategy: RetryStrategy::Linear,
            initial_delay_ms: 200,
            max_delay_ms: 500,
            multiplier: 1.0,
            jitter_factor: 3.0,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.strategy, RetryStrategy::Linear);
        assert!((policy.jitter_factor - 1.0).abs() < f64::EPSILON);
        assert!(policy.delay_for_attempt(10) <= Duration::from_millis(750));
    }
}
