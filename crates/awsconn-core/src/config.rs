//! Configuration for the connection state machine.
//!
//! All values can be overridden through environment variables; see
//! [`ConnectionConfig::from_env`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::{ConnectionError, ConnectionResult};

/// Connection state machine configuration.
///
/// # Examples
///
/// ```
/// use awsconn_core::ConnectionConfig;
///
/// let config = ConnectionConfig::builder().mru_limit(3).build();
/// assert_eq!(config.mru_limit, 3);
/// assert_eq!(config.default_region, "us-east-1");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// Region used when neither the settings nor the profile name one.
    #[builder(default = String::from("us-east-1"))]
    pub default_region: String,

    /// Capacity of each recently-used list.
    #[builder(default = 5)]
    pub mru_limit: usize,

    /// Region ids starting with this prefix are local pseudo-regions.
    #[builder(default = String::from("toolkit-local-"))]
    pub local_region_prefix: String,

    /// Delay before a validation starts resolving (0 = start immediately).
    #[builder(default = 0)]
    pub validation_debounce_ms: u64,

    /// Upper bound for identity resolution (0 = no limit).
    #[builder(default = 30_000)]
    pub validation_timeout_ms: u64,

    /// Buffer size of the state and settings notification channels.
    #[builder(default = 64)]
    pub event_capacity: usize,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            default_region: String::from("us-east-1"),
            mru_limit: 5,
            local_region_prefix: String::from("toolkit-local-"),
            validation_debounce_ms: 0,
            validation_timeout_ms: 30_000,
            event_capacity: 64,
            log_level: String::from("info"),
        }
    }
}

impl ConnectionConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DEFAULT_REGION` | `us-east-1` |
    /// | `MRU_LIMIT` | `5` |
    /// | `LOCAL_REGION_PREFIX` | `toolkit-local-` |
    /// | `VALIDATION_DEBOUNCE_MS` | `0` |
    /// | `VALIDATION_TIMEOUT_MS` | `30000` |
    /// | `EVENT_CAPACITY` | `64` |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// Unparseable numeric values keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("DEFAULT_REGION") {
            config.default_region = v;
        }
        if let Some(v) = env_parse("MRU_LIMIT") {
            config.mru_limit = v;
        }
        if let Ok(v) = std::env::var("LOCAL_REGION_PREFIX") {
            config.local_region_prefix = v;
        }
        if let Some(v) = env_parse("VALIDATION_DEBOUNCE_MS") {
            config.validation_debounce_ms = v;
        }
        if let Some(v) = env_parse("VALIDATION_TIMEOUT_MS") {
            config.validation_timeout_ms = v;
        }
        if let Some(v) = env_parse("EVENT_CAPACITY") {
            config.event_capacity = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// Check that the values can drive a state machine.
    ///
    /// # Errors
    /// Returns [`ConnectionError::Config`] naming the first offending field.
    pub fn validate(&self) -> ConnectionResult<()> {
        if self.default_region.trim().is_empty() {
            return Err(ConnectionError::Config("default_region must not be empty".to_owned()));
        }
        if self.mru_limit == 0 {
            return Err(ConnectionError::Config("mru_limit must be at least 1".to_owned()));
        }
        if self.local_region_prefix.is_empty() {
            return Err(ConnectionError::Config(
                "local_region_prefix must not be empty".to_owned(),
            ));
        }
        Ok(())
    }

    /// Debounce interval, or `None` when validations start immediately.
    #[must_use]
    pub fn validation_debounce(&self) -> Option<Duration> {
        (self.validation_debounce_ms > 0).then(|| Duration::from_millis(self.validation_debounce_ms))
    }

    /// Resolution timeout, or `None` when unbounded.
    #[must_use]
    pub fn validation_timeout(&self) -> Option<Duration> {
        (self.validation_timeout_ms > 0).then(|| Duration::from_millis(self.validation_timeout_ms))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
