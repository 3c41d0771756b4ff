//! Settings and configuration module
//!
//! Provides the run configuration consumed by the authenticator with:
//! - Serde defaults and JSON loading
//! - Loading through a host-provided [`SettingsReader`]
//! - Lenient parsing of integers stored as strings

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::portal::core::RandomDelay;

pub const KEY_TIMEOUT: &str = "timeout";
pub const KEY_RETRY_COUNT: &str = "retry_count";
pub const KEY_DELAY_ALWAYS: &str = "delay_always";
pub const KEY_WELCOME_GATEWAY_V3: &str = "welcome_gateway_v3";
pub const KEY_DELAY_MIN_MS: &str = "delay_min_ms";
pub const KEY_DELAY_MAX_MS: &str = "delay_max_ms";
pub const KEY_PROBE_URL: &str = "probe_url";
pub const KEY_NOT_REGISTERED_PREFIXES: &str = "not_registered_prefixes";
pub const KEY_MAX_REDIRECT_HOPS: &str = "max_redirect_hops";
pub const KEY_WAIT_INTERVAL_MS: &str = "wait_interval_ms";
pub const KEY_RETRY_BACKOFF_MS: &str = "retry_backoff_ms";

pub const DEFAULT_PROBE_URL: &str = "http://connectivitycheck.gstatic.com/generate_204";

/// Read-only access to the host's settings store.
///
/// Every getter returns `None` when the key is missing or holds a value of
/// another type; [`AuthConfig::from_settings`] then keeps its default.
pub trait SettingsReader: Send + Sync {
    fn get_bool(&self, name: &str) -> Option<bool>;
    fn get_int(&self, name: &str) -> Option<i64>;
    fn get_string(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid configuration JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Configuration of a single authentication run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Per-request timeout in seconds.
    pub timeout: u64,
    /// Attempts made by retrying requests.
    pub retry_count: u32,
    /// Apply a random delay before every request instead of one explicit wait step.
    pub delay_always: bool,
    /// Handle welcome.wi-fi.ru with its own algorithm instead of bypassing it.
    pub welcome_gateway_v3: bool,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub probe_url: String,
    /// `auth_error_code` prefixes that mean the device must be registered first.
    pub not_registered_prefixes: Vec<String>,
    pub max_redirect_hops: u32,
    /// Pause between two polls of a waiting task.
    pub wait_interval_ms: u64,
    /// Pause between two attempts of a retried request.
    pub retry_backoff_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            timeout: 5,
            retry_count: 3,
            delay_always: false,
            welcome_gateway_v3: true,
            delay_min_ms: 1000,
            delay_max_ms: 3000,
            probe_url: DEFAULT_PROBE_URL.to_string(),
            not_registered_prefixes: vec!["err_device_not_identified".to_string()],
            max_redirect_hops: 10,
            wait_interval_ms: 1000,
            retry_backoff_ms: 1000,
        }
    }
}

impl AuthConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, SettingsError> {
        let config: AuthConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from the host settings, keeping defaults for
    /// anything missing or malformed.
    pub fn from_settings(reader: &dyn SettingsReader) -> Self {
        let mut config = AuthConfig::default();

        if let Some(timeout) = reader.get_int(KEY_TIMEOUT).filter(|value| *value > 0) {
            config.timeout = timeout as u64;
        }
        if let Some(retries) = reader.get_int(KEY_RETRY_COUNT).filter(|value| *value > 0) {
            config.retry_count = retries.min(u32::MAX as i64) as u32;
        }
        if let Some(delay_always) = reader.get_bool(KEY_DELAY_ALWAYS) {
            config.delay_always = delay_always;
        }
        if let Some(v3) = reader.get_bool(KEY_WELCOME_GATEWAY_V3) {
            config.welcome_gateway_v3 = v3;
        }
        if let Some(min) = reader.get_int(KEY_DELAY_MIN_MS).filter(|value| *value >= 0) {
            config.delay_min_ms = min as u64;
        }
        if let Some(max) = reader.get_int(KEY_DELAY_MAX_MS).filter(|value| *value >= 0) {
            config.delay_max_ms = max as u64;
        }
        if config.delay_max_ms < config.delay_min_ms {
            config.delay_max_ms = config.delay_min_ms;
        }
        if let Some(url) = reader.get_string(KEY_PROBE_URL).filter(|value| !value.is_empty()) {
            config.probe_url = url;
        }
        if let Some(prefixes) = reader.get_string(KEY_NOT_REGISTERED_PREFIXES) {
            let parsed: Vec<String> = prefixes
                .split(',')
                .map(str::trim)
                .filter(|prefix| !prefix.is_empty())
                .map(str::to_string)
                .collect();
            if !parsed.is_empty() {
                config.not_registered_prefixes = parsed;
            }
        }
        if let Some(hops) = reader.get_int(KEY_MAX_REDIRECT_HOPS).filter(|value| *value > 0) {
            config.max_redirect_hops = hops.min(u32::MAX as i64) as u32;
        }
        if let Some(interval) = reader.get_int(KEY_WAIT_INTERVAL_MS).filter(|value| *value >= 0) {
            config.wait_interval_ms = interval as u64;
        }
        if let Some(backoff) = reader.get_int(KEY_RETRY_BACKOFF_MS).filter(|value| *value >= 0) {
            config.retry_backoff_ms = backoff as u64;
        }

        config
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.retry_count == 0 {
            return Err(SettingsError::InvalidValue {
                key: KEY_RETRY_COUNT,
                reason: "must be at least 1".into(),
            });
        }
        if self.delay_max_ms < self.delay_min_ms {
            return Err(SettingsError::InvalidValue {
                key: KEY_DELAY_MAX_MS,
                reason: format!("{} is below {}", self.delay_max_ms, self.delay_min_ms),
            });
        }
        if url::Url::parse(&self.probe_url).is_err() {
            return Err(SettingsError::InvalidValue {
                key: KEY_PROBE_URL,
                reason: format!("'{}' is not an absolute URL", self.probe_url),
            });
        }
        Ok(())
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn random_delay(&self) -> RandomDelay {
        RandomDelay::new(self.delay_min_ms, self.delay_max_ms)
    }

    /// Whether a portal error code means "device not registered".
    pub fn is_not_registered(&self, error_code: &str) -> bool {
        self.not_registered_prefixes
            .iter()
            .any(|prefix| error_code.starts_with(prefix.as_str()))
    }
}

/// In-memory [`SettingsReader`] backed by string values, the way most
/// preference stores keep them.
#[derive(Debug, Clone, Default)]
pub struct MapSettings {
    values: HashMap<String, String>,
}

impl MapSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.values.insert(name.into(), value.to_string());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl ToString) {
        self.values.insert(name.into(), value.to_string());
    }
}

impl SettingsReader for MapSettings {
    fn get_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name)?.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        }
    }

    fn get_int(&self, name: &str) -> Option<i64> {
        self.values.get(name)?.trim().parse().ok()
    }

    fn get_string(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_override_defaults() {
        let settings = MapSettings::new()
            .with(KEY_TIMEOUT, 10)
            .with(KEY_RETRY_COUNT, "5")
            .with(KEY_DELAY_ALWAYS, true)
            .with(KEY_WELCOME_GATEWAY_V3, "false")
            .with(KEY_NOT_REGISTERED_PREFIXES, "err_device_not_identified, err_new_code");

        let config = AuthConfig::from_settings(&settings);
        assert_eq!(config.timeout, 10);
        assert_eq!(config.retry_count, 5);
        assert!(config.delay_always);
        assert!(!config.welcome_gateway_v3);
        assert!(config.is_not_registered("err_new_code_42"));
    }

    #[test]
    fn malformed_integers_keep_defaults() {
        let settings = MapSettings::new()
            .with(KEY_TIMEOUT, "five")
            .with(KEY_RETRY_COUNT, "-2");

        let config = AuthConfig::from_settings(&settings);
        assert_eq!(config.timeout, 5);
        assert_eq!(config.retry_count, 3);
    }

    #[test]
    fn json_loading_applies_serde_defaults() {
        let config = AuthConfig::from_json_str(r#"{"retry_count": 2, "delay_always": true}"#)
            .expect("valid config");
        assert_eq!(config.retry_count, 2);
        assert!(config.delay_always);
        assert_eq!(config.probe_url, DEFAULT_PROBE_URL);
    }

    #[test]
    fn json_loading_rejects_zero_retries() {
        let err = AuthConfig::from_json_str(r#"{"retry_count": 0}"#).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::InvalidValue {
                key: KEY_RETRY_COUNT,
                ..
            }
        ));
    }

    #[test]
    fn not_registered_matching_uses_prefixes() {
        let config = AuthConfig::default();
        assert!(config.is_not_registered("err_device_not_identified_x"));
        assert!(!config.is_not_registered("err_server"));
    }
}
