//! Error types for the cache layer

use std::path::PathBuf;

/// Errors raised by a [`KeyValueStore`](crate::KeyValueStore) backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error reading or writing the backing file
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Value could not be encoded for storage
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Backend-specific failure
    #[error("store error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
