//! Delivery retry schedule

use std::time::Duration;

use super::config::NetworkConfig;

/// Exponential backoff for one message's delivery attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub factor: u32,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            base: config.retry_base(),
            factor: config.retry_factor.max(1),
            max_attempts: config.retry_max_attempts.max(1),
        }
    }

    /// Wait before attempt number `attempt` (1-based)
    ///
    /// The first attempt goes out immediately; attempt n waits
    /// `base * factor^(n-2)`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let multiplier = self.factor.saturating_pow(attempt - 2);
        self.base.saturating_mul(multiplier)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&NetworkConfig::default())
    }
}
