//! Shared request rate gate
//!
//! Every remote call made during a sync (listing pages, file metadata, byte
//! transfers) acquires a permit from one token bucket before going out. The
//! gate is cheap to clone; all clones share the same bucket.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Jitter, Quota, RateLimiter};

use crate::errors::ConfigError;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket shared by all workers
#[derive(Debug, Clone)]
pub struct RateGate {
    limiter: Arc<DirectLimiter>,
    jitter: Duration,
}

impl RateGate {
    /// Creates a gate allowing `requests_per_second` with the given burst
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the rate is zero
    pub fn new(requests_per_second: u32, burst: u32, jitter: Duration) -> Result<Self, ConfigError> {
        let rate = NonZeroU32::new(requests_per_second).ok_or_else(|| ConfigError::InvalidValue {
            field: "rate_limit_rps".to_string(),
            value: requests_per_second.to_string(),
            reason: "Rate limit must be non-zero".to_string(),
        })?;
        let mut quota = Quota::per_second(rate);
        if let Some(burst) = NonZeroU32::new(burst) {
            quota = quota.allow_burst(burst);
        }

        Ok(Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            jitter,
        })
    }

    /// Gate that never makes callers wait in practice (for tests)
    pub fn unlimited() -> Self {
        let quota = Quota::per_second(NonZeroU32::MAX);
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            jitter: Duration::ZERO,
        }
    }

    /// Wait until a request may be issued
    pub async fn acquire(&self) {
        if self.jitter.is_zero() {
            self.limiter.until_ready().await;
        } else {
            self.limiter
                .until_ready_with_jitter(Jitter::up_to(self.jitter))
                .await;
        }
    }

    /// Take a permit only if one is immediately available
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_zero_rate_rejected() {
        let result = RateGate::new(0, 1, Duration::ZERO);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    /// Test that clones share one bucket
    ///
    /// A burst of one is consumed through one clone and must be unavailable
    /// through the other.
    #[test]
    fn test_clones_share_budget() {
        let gate = RateGate::new(1, 1, Duration::ZERO).unwrap();
        let other = gate.clone();

        assert!(gate.try_acquire());
        assert!(!other.try_acquire());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let gate = RateGate::new(20, 1, Duration::ZERO).unwrap();
        let start = Instant::now();
        for _ in 0..3 {
            gate.acquire().await;
        }
        // Two refills at 50ms each
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_unlimited_gate() {
        let gate = RateGate::unlimited();
        for _ in 0..100 {
            gate.acquire().await;
        }
    }
}
