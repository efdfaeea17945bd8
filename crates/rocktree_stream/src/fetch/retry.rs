//! Bounded exponential backoff for transient fetch failures.

use std::time::Duration;

use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Total attempts per request, including the first.
  pub max_attempts: u32,
  /// Delay after the first failed attempt.
  pub base_delay_ms: u64,
  /// Upper bound for any single delay.
  pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay_ms: 200,
      max_delay_ms: 5_000,
    }
  }
}

impl RetryPolicy {
  /// Whether another attempt may follow attempt number `attempt` (1-based).
  #[inline]
  pub fn should_retry(&self, attempt: u32) -> bool {
    attempt < self.max_attempts
  }

  /// Delay before the attempt following attempt number `attempt`.
  pub fn delay_after(&self, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(32);
    let delay = self.base_delay_ms.saturating_mul(1u64 << shift);
    Duration::from_millis(delay.min(self.max_delay_ms))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_backoff_doubles_until_cap() {
    let policy = RetryPolicy {
      max_attempts: 10,
      base_delay_ms: 100,
      max_delay_ms: 1_000,
    };
    assert_eq!(policy.delay_after(1), Duration::from_millis(100));
    assert_eq!(policy.delay_after(2), Duration::from_millis(200));
    assert_eq!(policy.delay_after(4), Duration::from_millis(800));
    assert_eq!(policy.delay_after(5), Duration::from_millis(1_000));
    assert_eq!(policy.delay_after(64), Duration::from_millis(1_000));
  }

  #[test]
  fn test_attempt_limit() {
    let policy = RetryPolicy::default();
    assert!(policy.should_retry(1));
    assert!(policy.should_retry(2));
    assert!(!policy.should_retry(3));
  }
}
