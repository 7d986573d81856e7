//! trailsync learning paths
//!
//! A path is a named, ordered bundle of items that the learner selects as a
//! single unit. Selecting a path pulls in its items; deselecting it drops
//! them again.
//!
//! # Example
//!
//! ```rust
//! use trailsync_paths::{PathExpander, PathMapping};
//!
//! let mapping = PathMapping::from_yaml_str("path-foundation: [a, b, c]").unwrap();
//! let expander = PathExpander::new(mapping);
//! assert_eq!(expander.expand("path-foundation"), vec!["a", "b", "c"]);
//! assert!(expander.expand("path-unknown").is_empty());
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod expander;
pub mod mapping;

pub use error::PathConfigError;
pub use expander::{PathExpander, Provenance, SelectionTarget};
pub use mapping::{is_path_id, PathMapping, PATH_PREFIX};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
