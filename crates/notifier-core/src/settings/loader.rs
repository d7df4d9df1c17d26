//! Settings loading with environment variable overrides.

use std::path::Path;

use tracing::debug;

use super::NotifierSettings;
use crate::errors::SettingsError;

/// Load settings from a JSON file, apply env overrides, then validate.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<NotifierSettings, SettingsError> {
    let mut settings = if path.exists() {
        debug!(?path, "loading notifier settings from file");
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str::<NotifierSettings>(&content)?
    } else {
        debug!(?path, "settings file not found, using defaults");
        NotifierSettings::default()
    };

    apply_env_overrides(&mut settings);
    settings.validate();
    Ok(settings)
}

/// Apply `NOTIFIER_*` environment overrides. Invalid values are ignored
/// with a warning.
pub fn apply_env_overrides(settings: &mut NotifierSettings) {
    if let Some(v) = read_env_u64("NOTIFIER_POLL_INTERVAL_MS", 1, 3_600_000) {
        settings.poll_interval_ms = v;
    }
    if let Some(v) = read_env_usize("NOTIFIER_THREAD_COUNT", 1, 1024) {
        settings.thread_count = v;
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}
