//! Retry policy for optimistic transactions

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a conflicting transaction is retried
///
/// Only conflicts are retried. Delay doubles per attempt starting from
/// `base_delay_ms` and is capped at `max_delay_ms`.
///
/// # Example
/// ```ignore
/// let retry = RetryConfig::new().with_max_retries(8).with_base_delay_ms(1);
/// db.transaction_with_retry(retry, |txn| { ... })?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (0 = single attempt)
    pub max_retries: usize,
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound on any single delay, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay_ms: 1,
            max_delay_ms: 50,
        }
    }
}

impl RetryConfig {
    /// Default policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Single attempt, conflicts surface immediately
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Set maximum number of retries
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set base delay
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set delay cap
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Backoff before retry number `attempt` (0-based)
    pub(crate) fn calculate_delay(&self, attempt: usize) -> Duration {
        // 1 << 63 is the largest shift a u64 takes
        let multiplier = 1u64 << attempt.min(63);
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_then_caps() {
        let retry = RetryConfig::new()
            .with_base_delay_ms(2)
            .with_max_delay_ms(10);
        assert_eq!(retry.calculate_delay(0), Duration::from_millis(2));
        assert_eq!(retry.calculate_delay(1), Duration::from_millis(4));
        assert_eq!(retry.calculate_delay(2), Duration::from_millis(8));
        assert_eq!(retry.calculate_delay(3), Duration::from_millis(10));
        assert_eq!(retry.calculate_delay(500), Duration::from_millis(10));
    }

    #[test]
    fn test_no_retry() {
        let retry = RetryConfig::no_retry();
        assert_eq!(retry.max_retries, 0);
        assert_eq!(retry.base_delay_ms, RetryConfig::default().base_delay_ms);
    }

    #[test]
    fn test_zero_base_delay_never_sleeps() {
        let retry = RetryConfig::new().with_base_delay_ms(0);
        assert_eq!(retry.calculate_delay(40), Duration::ZERO);
    }
}
