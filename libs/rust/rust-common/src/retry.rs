//! Exponential backoff with a pinned retry ceiling.
//!
//! The delay for attempt `n` is `base * 2^n`. Once `n` passes the largest
//! exponent whose delay still fits under `max`, the attempt counter is pinned
//! at that exponent and `max` is returned, so a long run of failures keeps
//! retrying at a steady cadence instead of overflowing.

use std::time::Duration;

const FACTOR: u32 = 2;

/// Backoff policy measured in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base_secs: u64,
    max_secs: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_secs: 2,
            max_secs: 60,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy from base and maximum delays in seconds.
    #[must_use]
    pub const fn new(base_secs: u64, max_secs: u64) -> Self {
        Self {
            base_secs,
            max_secs,
        }
    }

    /// Base delay.
    #[must_use]
    pub const fn base(&self) -> Duration {
        Duration::from_secs(self.base_secs)
    }

    /// Maximum delay.
    #[must_use]
    pub const fn max(&self) -> Duration {
        Duration::from_secs(self.max_secs)
    }

    /// Highest exponent allowed before the delay is pinned at `max`.
    ///
    /// Recomputed on every call so a policy rebuilt from new settings never
    /// carries a stale ceiling. Negative when `max` is below `base`, in which
    /// case every attempt is pinned.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn max_retry_count(&self) -> i64 {
        if self.base_secs == 0 {
            return 0;
        }
        let ratio = self.max_secs as f64 / self.base_secs as f64;
        (ratio.ln() / f64::from(FACTOR).ln()) as i64
    }

    /// Delay for the given attempt, pinning the attempt counter at the ceiling.
    /// The result never exceeds `max`.
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_common::BackoffPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = BackoffPolicy::default();
    /// let mut attempt = 3;
    /// assert_eq!(policy.delay_for_attempt(&mut attempt), Duration::from_secs(16));
    ///
    /// let mut attempt = 9;
    /// assert_eq!(policy.delay_for_attempt(&mut attempt), Duration::from_secs(60));
    /// assert_eq!(attempt, 4);
    /// ```
    pub fn delay_for_attempt(&self, attempt: &mut u32) -> Duration {
        let ceiling = self.max_retry_count();
        if i64::from(*attempt) > ceiling {
            *attempt = u32::try_from(ceiling.max(0)).unwrap_or(u32::MAX);
            return self.max();
        }
        let multiplier = u64::from(FACTOR).saturating_pow(*attempt);
        Duration::from_secs(self.base_secs.saturating_mul(multiplier).min(self.max_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_sequence() {
        let policy = BackoffPolicy::default();
        let mut attempt = 0;
        let mut delays = Vec::new();
        for _ in 0..8 {
            delays.push(policy.delay_for_attempt(&mut attempt).as_secs());
            attempt += 1;
        }
        assert_eq!(delays, vec![2, 4, 8, 16, 32, 60, 60, 60]);
    }

    #[test]
    fn test_max_retry_count_truncates() {
        assert_eq!(BackoffPolicy::new(2, 60).max_retry_count(), 4);
        assert_eq!(BackoffPolicy::new(1, 64).max_retry_count(), 6);
        assert_eq!(BackoffPolicy::new(5, 5).max_retry_count(), 0);
    }

    #[test]
    fn test_pinning_on_equal_base_and_max() {
        let policy = BackoffPolicy::new(5, 5);
        let mut attempt = 0;
        assert_eq!(policy.delay_for_attempt(&mut attempt), Duration::from_secs(5));
        attempt = 1;
        assert_eq!(policy.delay_for_attempt(&mut attempt), Duration::from_secs(5));
        assert_eq!(attempt, 0);
    }

    #[test]
    fn test_max_below_base_always_pinned() {
        let policy = BackoffPolicy::new(10, 5);
        assert_eq!(policy.max_retry_count(), -1);

        let mut attempt = 0;
        assert_eq!(policy.delay_for_attempt(&mut attempt), Duration::from_secs(5));
        assert_eq!(attempt, 0);
        attempt = 1;
        assert_eq!(policy.delay_for_attempt(&mut attempt), Duration::from_secs(5));
        assert_eq!(attempt, 0);
    }

    #[test]
    fn test_max_just_below_base_still_capped() {
        let policy = BackoffPolicy::new(10, 8);
        assert_eq!(policy.max_retry_count(), 0);
        let mut attempt = 0;
        assert_eq!(policy.delay_for_attempt(&mut attempt), Duration::from_secs(8));
    }

    proptest! {
        #[test]
        fn prop_delay_never_exceeds_max(
            base in 1u64..30,
            max in 1u64..630,
            attempt in 0u32..200,
        ) {
            let policy = BackoffPolicy::new(base, max);
            let mut attempt = attempt;
            let delay = policy.delay_for_attempt(&mut attempt);
            prop_assert!(delay <= policy.max());
            prop_assert!(i64::from(attempt) <= policy.max_retry_count().max(0));
        }
    }
}
