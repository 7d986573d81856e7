//! Path id to item id mapping
//!
//! Read-only configuration: built once at session start and never mutated.

use crate::error::PathConfigError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix that marks an identifier as a path id
pub const PATH_PREFIX: &str = "path-";

const BUILTIN_PATHS: &str = include_str!("../default_paths.yaml");

/// Whether `id` lives in the path namespace
#[inline]
#[must_use]
pub fn is_path_id(id: &str) -> bool {
    id.starts_with(PATH_PREFIX)
}

/// Immutable map from path id to its ordered item ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathMapping {
    paths: IndexMap<String, Vec<String>>,
}

impl PathMapping {
    /// Build mapping from `(path_id, items)` pairs
    ///
    /// # Errors
    /// - `PathConfigError::NotAPathId` for keys without the path prefix
    /// - `PathConfigError::NestedPath` when a path lists another path
    pub fn from_pairs<I, K, V, S>(pairs: I) -> Result<Self, PathConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let paths = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into_iter().map(Into::into).collect()))
            .collect();
        Self { paths }.validated()
    }

    /// Parse mapping from YAML
    ///
    /// # Errors
    /// Returns YAML errors and the validation errors of [`Self::from_pairs`]
    pub fn from_yaml_str(raw: &str) -> Result<Self, PathConfigError> {
        let mapping: Self = serde_yaml::from_str(raw)?;
        mapping.validated()
    }

    /// Parse mapping from JSON
    ///
    /// # Errors
    /// Returns JSON errors and the validation errors of [`Self::from_pairs`]
    pub fn from_json_str(raw: &str) -> Result<Self, PathConfigError> {
        let mapping: Self = serde_json::from_str(raw)?;
        mapping.validated()
    }

    /// Load mapping file, choosing the parser by extension
    ///
    /// # Errors
    /// - `PathConfigError::Io` if the file cannot be read
    /// - `PathConfigError::UnsupportedFormat` for extensions other than
    ///   `yaml`, `yml` and `json`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PathConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| PathConfigError::io_error(path, e))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&raw),
            Some("json") => Self::from_json_str(&raw),
            other => Err(PathConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// The paths shipped with the crate
    ///
    /// # Errors
    /// Only if the bundled file is malformed
    pub fn builtin() -> Result<Self, PathConfigError> {
        Self::from_yaml_str(BUILTIN_PATHS)
    }

    /// Items for `path_id`, in order
    #[inline]
    #[must_use]
    pub fn items(&self, path_id: &str) -> Option<&[String]> {
        self.paths.get(path_id).map(Vec::as_slice)
    }

    /// Whether `path_id` has a mapping
    #[inline]
    #[must_use]
    pub fn contains(&self, path_id: &str) -> bool {
        self.paths.contains_key(path_id)
    }

    /// Path ids in declaration order
    pub fn path_ids(&self) -> impl Iterator<Item = &str> {
        self.paths.keys().map(String::as_str)
    }

    /// Number of paths
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether no paths are configured
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn validated(mut self) -> Result<Self, PathConfigError> {
        for (path, items) in &mut self.paths {
            if !is_path_id(path) {
                return Err(PathConfigError::NotAPathId(path.clone()));
            }
            if let Some(nested) = items.iter().find(|i| is_path_id(i)) {
                return Err(PathConfigError::NestedPath {
                    path: path.clone(),
                    nested: nested.clone(),
                });
            }
            let mut seen = std::collections::HashSet::new();
            items.retain(|item| seen.insert(item.clone()));
        }
        Ok(self)
    }
}
