//! Error types for trailsync core
//!
//! None of these cross into the host. Remote and data errors are caught at
//! the component boundary and reduced to "no effect" or "fell back to cache".

use std::path::PathBuf;
use std::time::Duration;

/// Remote store failures (the Transient-Network class)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// Remote unreachable
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded its deadline
    #[error("request timed out")]
    Timeout,

    /// Non-2xx response
    #[error("remote returned status {0}")]
    Status(u16),

    /// Body could not be read as JSON
    #[error("invalid response body: {0}")]
    Body(String),
}

impl RemoteError {
    /// Whether a later attempt might succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Status(code) => *code >= 500 || *code == 429,
            Self::Body(_) => false,
        }
    }
}

/// Remote payloads rejected by validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedData {
    /// Payload does not have the expected structure
    #[error("unexpected payload shape: {0}")]
    Shape(String),

    /// Recommendation did not come from an assessment
    #[error("recommendation source '{0}' is not trusted")]
    UntrustedSource(String),

    /// Recommendation is older than allowed
    #[error("recommendation is {age_ms}ms old (max {max_ms}ms)")]
    StaleRecommendation { age_ms: i64, max_ms: i64 },
}

impl MalformedData {
    /// Create stale-recommendation error
    #[must_use]
    pub fn stale(age_ms: i64, max_age: Duration) -> Self {
        Self::StaleRecommendation {
            age_ms,
            max_ms: i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX),
        }
    }
}

impl From<serde_json::Error> for MalformedData {
    fn from(err: serde_json::Error) -> Self {
        Self::Shape(err.to_string())
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading the config file
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or shape error
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Semantically invalid value
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// Path mapping could not be loaded
    #[error("path mapping error: {0}")]
    Paths(#[from] trailsync_paths::PathConfigError),

    /// Cache store could not be opened
    #[error("cache store error: {0}")]
    Store(#[from] trailsync_cache::StoreError),
}

impl ConfigError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create invalid-value error
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}
