//! Error types for path configuration

use std::path::PathBuf;

/// Errors while loading a path mapping
#[derive(Debug, thiserror::Error)]
pub enum PathConfigError {
    /// IO error reading the mapping file
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML syntax or shape error
    #[error("invalid yaml mapping: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON syntax or shape error
    #[error("invalid json mapping: {0}")]
    Json(#[from] serde_json::Error),

    /// Mapping key lacks the path prefix
    #[error("mapping key '{0}' is not a path id")]
    NotAPathId(String),

    /// Path lists another path as one of its items
    #[error("path '{path}' nests path '{nested}'")]
    NestedPath { path: String, nested: String },

    /// Unsupported file extension
    #[error("unsupported mapping format: {0}")]
    UnsupportedFormat(String),
}

impl PathConfigError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
