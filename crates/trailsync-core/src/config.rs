//! Session configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use trailsync_realtime::ReconnectConfig;

/// Cache key holding the selection list in the legacy raw-array shape
pub const SELECTION_CACHE_KEY: &str = "selectedLearningPaths";

/// Prefix of the wrapped per-page progress keys
pub const PROGRESS_CACHE_PREFIX: &str = "progress:";

/// Top-level configuration for a [`SyncSession`](crate::SyncSession)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Remote store base URL
    pub base_url: String,
    /// Learner identity sent with selection writes
    pub user_id: String,
    /// Quiet period before a selection write, in milliseconds
    pub debounce_ms: u64,
    /// Maximum age of an accepted recommendation, in seconds
    pub recommendation_max_age_secs: u64,
    /// Optional path mapping file (YAML or JSON)
    pub paths_file: Option<PathBuf>,
    /// Local fallback cache
    pub cache: CacheConfig,
    /// Push channel reconnect policy
    pub reconnect: ReconnectConfig,
}

/// Fallback cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Time-to-live of wrapped entries, in seconds
    pub ttl_secs: u64,
    /// Store file; in-memory when unset
    pub file: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            file: None,
        }
    }
}

impl SyncConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML
    ///
    /// # Errors
    /// - `ConfigError::Toml` for syntax errors
    /// - `ConfigError::InvalidValue` if validation fails
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration file
    ///
    /// # Errors
    /// IO errors plus those of [`Self::from_toml_str`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::io_error(path, e))?;
        Self::from_toml_str(&raw)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `ConfigError::InvalidValue` naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::invalid("debounce_ms", "must be greater than zero"));
        }
        if self.reconnect.base_delay_ms == 0 {
            return Err(ConfigError::invalid("reconnect.base_delay_ms", "must be greater than zero"));
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::invalid("cache.ttl_secs", "must be greater than zero"));
        }
        Ok(())
    }

    /// With base URL
    #[inline]
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// With user id
    #[inline]
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// With debounce delay
    #[inline]
    #[must_use]
    pub fn with_debounce(mut self, delay: Duration) -> Self {
        self.debounce_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With reconnect policy
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Debounce window
    #[inline]
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Cache TTL
    #[inline]
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    /// Recommendation freshness window
    #[inline]
    #[must_use]
    pub fn recommendation_max_age(&self) -> Duration {
        Duration::from_secs(self.recommendation_max_age_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3002/api".to_string(),
            user_id: "default-user".to_string(),
            debounce_ms: 500,
            recommendation_max_age_secs: 300,
            paths_file: None,
            cache: CacheConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_behaviour() {
        let config = SyncConfig::new();
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.recommendation_max_age(), Duration::from_secs(300));
        assert_eq!(config.reconnect.base_delay_ms, 1_000);
        assert_eq!(config.reconnect.max_attempts, 5);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SyncConfig::from_toml_str(
            r#"
            base_url = "https://learn.example.com/api"
            user_id = "learner-7"

            [reconnect]
            max_attempts = 8

            [cache]
            file = "/var/tmp/trailsync.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url, "https://learn.example.com/api");
        assert_eq!(config.reconnect.max_attempts, 8);
        assert_eq!(config.reconnect.base_delay_ms, 1_000);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.cache.file.as_deref(), Some(Path::new("/var/tmp/trailsync.json")));
        assert_eq!(config.debounce_ms, 500);
    }

    #[test]
    fn zero_debounce_is_rejected() {
        let err = SyncConfig::from_toml_str("debounce_ms = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "debounce_ms", .. }));
    }

    #[test]
    fn builders_chain() {
        let config = SyncConfig::new()
            .with_user_id("u")
            .with_debounce(Duration::from_millis(50))
            .with_reconnect(ReconnectConfig::new().with_max_attempts(2));
        assert_eq!(config.user_id, "u");
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.reconnect.max_attempts, 2);
    }
}
