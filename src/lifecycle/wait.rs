//! # Wait Policy
//!
//! Bounded polling used while waiting for Vault to become unsealed after init.
//!
//! The sleep is behind the [`Sleeper`] trait so tests can drive the loop without
//! real delays.

use async_trait::async_trait;
use std::time::Duration;

use crate::constants::{DEFAULT_UNSEAL_WAIT_INTERVAL_SECS, DEFAULT_UNSEAL_WAIT_MAX_ATTEMPTS};

/// Fixed-interval polling with an upper bound on attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Delay between two polls
    pub interval: Duration,
    /// Maximum number of polls before giving up
    pub max_attempts: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_UNSEAL_WAIT_INTERVAL_SECS),
            max_attempts: DEFAULT_UNSEAL_WAIT_MAX_ATTEMPTS,
        }
    }
}

impl WaitPolicy {
    #[must_use]
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Total time the policy may spend sleeping
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

/// Source of delays for polling loops
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = WaitPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(2));
        assert_eq!(policy.deadline(), Duration::from_secs(600));
    }

    #[test]
    fn test_zero_attempts_polls_once() {
        let policy = WaitPolicy::new(Duration::from_millis(10), 0);
        assert_eq!(policy.max_attempts, 1);
    }
}
