use std::time::Duration;

use notifier_core::RetrySettings;

/// Exponential backoff for failed deliveries, without jitter.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_factor: f64,
    pub max_interval: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            initial_interval: Duration::from_millis(settings.initial_interval_ms),
            backoff_factor: settings.backoff_factor,
            max_interval: Duration::from_millis(settings.max_interval_ms),
            max_retries: settings.max_retries,
        }
    }
}

impl RetryPolicy {
    /// Wait after the `failures`-th consecutive failure:
    /// `initial * factor^(failures-1)`, capped at `max_interval`.
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let ms = self.initial_interval.as_millis() as f64 * self.backoff_factor.powi(exponent);
        let capped = ms.min(self.max_interval.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// The initial attempt plus `max_retries` retries have all failed.
    pub fn is_exhausted(&self, failures: u32) -> bool {
        failures > self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(initial_ms: u64, factor: f64, max_ms: u64, retries: u32) -> RetryPolicy {
        RetryPolicy::from(&RetrySettings {
            initial_interval_ms: initial_ms,
            backoff_factor: factor,
            max_interval_ms: max_ms,
            max_retries: retries,
        })
    }

    #[test]
    fn exponential_backoff() {
        let p = policy(100, 2.0, 30_000, 5);
        assert_eq!(p.delay(1), Duration::from_millis(100));
        assert_eq!(p.delay(2), Duration::from_millis(200));
        assert_eq!(p.delay(3), Duration::from_millis(400));
    }

    #[test]
    fn capped_at_max() {
        let p = policy(1_000, 2.0, 5_000, 50);
        assert_eq!(p.delay(10), Duration::from_secs(5));
        assert_eq!(p.delay(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn factor_one_is_constant() {
        let p = policy(250, 1.0, 30_000, 3);
        assert_eq!(p.delay(1), p.delay(4));
    }

    #[test]
    fn zero_failures_uses_initial() {
        let p = policy(300, 3.0, 30_000, 3);
        assert_eq!(p.delay(0), Duration::from_millis(300));
    }

    #[test]
    fn exhausted_after_retry_budget() {
        let p = policy(100, 2.0, 1_000, 2);
        assert!(!p.is_exhausted(1));
        assert!(!p.is_exhausted(2));
        assert!(p.is_exhausted(3));

        let no_retries = policy(100, 2.0, 1_000, 0);
        assert!(no_retries.is_exhausted(1));
    }

    #[test]
    fn defaults_follow_settings() {
        let p = RetryPolicy::default();
        assert_eq!(p.initial_interval, Duration::from_millis(500));
        assert_eq!(p.max_interval, Duration::from_secs(30));
        assert_eq!(p.max_retries, 5);
    }
}
