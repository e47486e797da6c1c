//! Retry delays with exponential backoff.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first retry (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay cap (in milliseconds)
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,   // 1 second base delay
            max_delay_ms: 300_000, // 5 minute cap
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay_ms: base_delay.as_millis() as u64,
            max_delay_ms: max_delay.as_millis() as u64,
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Calculate the delay before the next attempt.
    ///
    /// `base_delay * 2^attempts`, saturating, capped at `max_delay`.
    pub fn calculate_delay(&self, attempts: u32) -> Duration {
        let multiplier = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// Calculate backoff delay using the default policy (1s doubling, capped at 5 minutes).
pub fn calculate_backoff(attempts: u32) -> Duration {
    RetryPolicy::default().calculate_delay(attempts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay(), Duration::from_secs(1));
        assert_eq!(policy.max_delay(), Duration::from_secs(300));
    }

    #[test]
    fn test_exponential_growth() {
        let delays: Vec<u64> = (0..6).map(|i| calculate_backoff(i).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32]);
    }

    #[test]
    fn test_cap_at_max() {
        // 2^9 = 512s is past the 300s ceiling
        assert_eq!(calculate_backoff(8), Duration::from_secs(256));
        assert_eq!(calculate_backoff(9), Duration::from_secs(300));
        assert_eq!(calculate_backoff(63), Duration::from_secs(300));
        assert_eq!(calculate_backoff(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn test_custom_policy() {
        let policy = RetryPolicy::new(Duration::from_millis(10), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(0), Duration::from_millis(10));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(80));
        assert_eq!(policy.calculate_delay(4), Duration::from_millis(100));
    }

    #[test]
    fn test_zero_base_never_waits() {
        let policy = RetryPolicy::new(Duration::ZERO, Duration::from_secs(1));
        assert_eq!(policy.calculate_delay(10), Duration::ZERO);
    }

    proptest! {
        #[test]
        fn prop_backoff_is_monotonic_and_capped(attempts in 0u32..200) {
            let current = calculate_backoff(attempts);
            let next = calculate_backoff(attempts + 1);
            prop_assert!(next >= current);
            prop_assert!(current <= Duration::from_secs(300));
            prop_assert_eq!(current, calculate_backoff(attempts));
        }
    }
}
