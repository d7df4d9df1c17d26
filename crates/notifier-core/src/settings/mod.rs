//! Notifier settings.
//!
//! Settings come from three layers (in priority order):
//! 1. **Compiled defaults**: [`NotifierSettings::default()`]
//! 2. **Settings file**: JSON, missing fields keep their defaults
//! 3. **Environment variables**: `NOTIFIER_*` overrides (highest priority)
//!
//! Settings are read once when the notifier starts; there is no reload.

mod loader;

pub use loader::{apply_env_overrides, load_settings_from_path, parse_u64_range, parse_usize_range};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings type for the session notifier.
///
/// ```json
/// {
///   "pollIntervalMs": 100,
///   "threadCount": 4,
///   "retry": { "maxRetries": 5 }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotifierSettings {
    /// Upper bound on how long a worker sleeps without being woken.
    pub poll_interval_ms: u64,
    /// Number of notifier workers (shards). Fixed for the pool lifetime.
    pub thread_count: usize,
    /// Delivery retry policy.
    pub retry: RetrySettings,
    /// Driver transport timeouts.
    pub transport: TransportSettings,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            thread_count: 4,
            retry: RetrySettings::default(),
            transport: TransportSettings::default(),
        }
    }
}

impl NotifierSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Correct out-of-range values in place.
    ///
    /// Called automatically during loading. Invalid values are corrected
    /// with a warning rather than rejected.
    pub fn validate(&mut self) {
        if self.thread_count == 0 {
            tracing::warn!("thread_count must be at least 1, using 1");
            self.thread_count = 1;
        }
        if self.poll_interval_ms == 0 {
            tracing::warn!("poll_interval_ms must be positive, using 1");
            self.poll_interval_ms = 1;
        }

        let retry = &mut self.retry;
        if !(retry.backoff_factor >= 1.0) {
            tracing::warn!(
                "backoff_factor ({}) below 1.0, using 1.0",
                retry.backoff_factor
            );
            retry.backoff_factor = 1.0;
        }
        if retry.max_interval_ms < retry.initial_interval_ms {
            tracing::warn!(
                "max_interval_ms ({}) < initial_interval_ms ({}), correcting",
                retry.max_interval_ms,
                retry.initial_interval_ms
            );
            retry.max_interval_ms = retry.initial_interval_ms;
        }

        let transport = &mut self.transport;
        if transport.connect_timeout_ms == 0 {
            transport.connect_timeout_ms = TransportSettings::default().connect_timeout_ms;
        }
        if transport.call_timeout_ms == 0 {
            transport.call_timeout_ms = TransportSettings::default().call_timeout_ms;
        }
    }
}

/// Retry policy for failed deliveries.
///
/// After the f-th consecutive failure a context waits
/// `min(initial * factor^(f-1), max)` before trying again. Once the failures
/// exceed `max_retries` the session is reported as timed out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    pub initial_interval_ms: u64,
    pub backoff_factor: f64,
    pub max_interval_ms: u64,
    pub max_retries: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_interval_ms: 500,
            backoff_factor: 2.0,
            max_interval_ms: 30_000,
            max_retries: 5,
        }
    }
}

/// Timeouts for the driver transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    pub connect_timeout_ms: u64,
    pub call_timeout_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 2_000,
            call_timeout_ms: 5_000,
        }
    }
}

impl TransportSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = NotifierSettings::default();
        assert_eq!(s.poll_interval_ms, 100);
        assert_eq!(s.thread_count, 4);
        assert_eq!(s.retry.max_retries, 5);
        assert_eq!(s.retry.initial_interval_ms, 500);
        assert_eq!(s.transport.call_timeout(), Duration::from_secs(5));
        assert_eq!(s.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let s: NotifierSettings =
            serde_json::from_str(r#"{"threadCount": 8, "retry": {"maxRetries": 2}}"#).unwrap();
        assert_eq!(s.thread_count, 8);
        assert_eq!(s.retry.max_retries, 2);
        assert_eq!(s.retry.initial_interval_ms, 500);
        assert_eq!(s.poll_interval_ms, 100);
    }

    #[test]
    fn validate_fixes_zero_thread_count_and_interval() {
        let mut s = NotifierSettings {
            thread_count: 0,
            poll_interval_ms: 0,
            ..Default::default()
        };
        s.validate();
        assert_eq!(s.thread_count, 1);
        assert_eq!(s.poll_interval_ms, 1);
    }

    #[test]
    fn validate_fixes_retry_invariants() {
        let mut s = NotifierSettings::default();
        s.retry.backoff_factor = 0.5;
        s.retry.initial_interval_ms = 2_000;
        s.retry.max_interval_ms = 1_000;
        s.validate();
        assert!((s.retry.backoff_factor - 1.0).abs() < f64::EPSILON);
        assert_eq!(s.retry.max_interval_ms, 2_000);
    }

    #[test]
    fn validate_rejects_nan_factor() {
        let mut s = NotifierSettings::default();
        s.retry.backoff_factor = f64::NAN;
        s.validate();
        assert!((s.retry.backoff_factor - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn validate_restores_zero_timeouts() {
        let mut s = NotifierSettings::default();
        s.transport.connect_timeout_ms = 0;
        s.transport.call_timeout_ms = 0;
        s.validate();
        assert_eq!(s.transport, TransportSettings::default());
    }
}
