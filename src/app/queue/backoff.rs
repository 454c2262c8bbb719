//! Retry policy and backoff calculation

use std::time::Duration;

use crate::constants::limits;
use crate::errors::ConfigError;

/// Backoff calculation utilities
pub struct BackoffCalculator;

impl BackoffCalculator {
    /// Calculate retry delay with exponential backoff
    ///
    /// `retry_count` starts at 0 for the first retry. The result is capped at
    /// `max_delay` before jitter is applied.
    pub fn calculate_retry_delay(
        retry_count: u32,
        base_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    ) -> Duration {
        let delay_millis = base_delay.as_millis() as f64 * multiplier.powi(retry_count as i32);
        let capped = delay_millis.min(max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Spread a delay by up to ±`jitter_factor` to avoid synchronized retries
    pub fn with_jitter(delay: Duration, jitter_factor: f64) -> Duration {
        let millis = delay.as_millis() as u64;
        let jitter_range = (millis as f64 * jitter_factor) as u64;
        if jitter_range == 0 {
            return delay;
        }
        let jitter = fastrand::u64(0..=jitter_range * 2);
        Duration::from_millis((millis + jitter).saturating_sub(jitter_range))
    }
}

/// Bounded retry budget for transient job failures
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per job including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: limits::MAX_ATTEMPTS,
            base_delay: Duration::from_millis(limits::RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_secs(limits::MAX_BACKOFF_SECS),
            multiplier: limits::BACKOFF_MULTIPLIER,
            jitter_factor: limits::BACKOFF_JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Policy with no waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Whether a job that has made `attempts` attempts may try again
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before the attempt following `attempts` completed attempts
    pub fn delay_after(&self, attempts: u32) -> Duration {
        let base = BackoffCalculator::calculate_retry_delay(
            attempts.saturating_sub(1),
            self.base_delay,
            self.max_delay,
            self.multiplier,
        );
        BackoffCalculator::with_jitter(base, self.jitter_factor)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_attempts".to_string(),
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }
        if self.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "backoff_multiplier".to_string(),
                value: self.multiplier.to_string(),
                reason: "must be at least 1.0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::InvalidValue {
                field: "jitter_factor".to_string(),
                value: self.jitter_factor.to_string(),
                reason: "must be between 0.0 and 1.0".to_string(),
            });
        }
        if self.base_delay > self.max_delay {
            return Err(ConfigError::InvalidValue {
                field: "retry_base_delay".to_string(),
                value: format!("{:?}", self.base_delay),
                reason: "must not exceed retry_max_delay".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_growth_and_cap() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(30);
        assert_eq!(
            BackoffCalculator::calculate_retry_delay(0, base, max, 2.0),
            Duration::from_millis(100)
        );
        assert_eq!(
            BackoffCalculator::calculate_retry_delay(2, base, max, 2.0),
            Duration::from_millis(400)
        );
        assert_eq!(
            BackoffCalculator::calculate_retry_delay(20, base, max, 2.0),
            max
        );
    }

    #[test]
    fn test_jitter_bounds() {
        let delay = Duration::from_millis(1000);
        for _ in 0..100 {
            let jittered = BackoffCalculator::with_jitter(delay, 0.1);
            assert!(jittered >= Duration::from_millis(900));
            assert!(jittered <= Duration::from_millis(1100));
        }
        assert_eq!(BackoffCalculator::with_jitter(delay, 0.0), delay);
    }

    #[test]
    fn test_policy_budget() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));

        let no_wait = RetryPolicy::immediate(3);
        assert_eq!(no_wait.delay_after(1), Duration::ZERO);
        assert_eq!(no_wait.delay_after(2), Duration::ZERO);
    }

    #[test]
    fn test_policy_validation() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::immediate(0).validate().is_err());

        let policy = RetryPolicy {
            jitter_factor: 1.5,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }
}
