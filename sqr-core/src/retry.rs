use std::time::Duration;

/// Configuration for retry behavior with exponential backoff.
///
/// Defines how many attempts an operation gets and how long to wait between
/// them. The replication queue schedules the delay instead of sleeping in
/// its worker, so a backing-off task never stalls the pipeline.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts (including the initial one)
    pub max_attempts: u32,

    /// Initial backoff duration in milliseconds
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    pub max_backoff_ms: u64,

    /// Multiplier applied to backoff after each retry
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_backoff_ms: u64,
        max_backoff_ms: u64,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms,
            max_backoff_ms,
            backoff_multiplier,
        }
    }

    /// Returns a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Returns a policy optimized for quick transient failures (tests).
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
            backoff_multiplier: 2.0,
        }
    }

    /// Returns the policy used to re-attach dropped change-feed
    /// subscriptions: effectively unlimited attempts, 1s to 60s backoff.
    pub fn resubscribe() -> Self {
        Self {
            max_attempts: u32::MAX,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
        }
    }

    /// Calculates the backoff duration for a given attempt number (0-indexed).
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let backoff_ms = (self.initial_backoff_ms as f64
            * self.backoff_multiplier.powi(attempt.min(64) as i32))
            .min(self.max_backoff_ms as f64) as u64;
        Duration::from_millis(backoff_ms)
    }
}

impl Default for RetryPolicy {
    /// Three attempts, 5 second base delay, doubling up to one minute.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 5_000,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::new(5, 100, 1_000, 2.0);

        assert_eq!(policy.backoff_duration(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_duration(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_duration(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_duration(10), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_duration(u32::MAX), Duration::from_millis(1_000));
    }

    #[test]
    fn default_matches_replication_contract() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff_duration(0), Duration::from_millis(5_000));
    }

    #[test]
    fn no_retry_allows_single_attempt() {
        assert_eq!(RetryPolicy::no_retry().max_attempts, 1);
    }
}
