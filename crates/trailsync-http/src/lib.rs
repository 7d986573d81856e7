//! trailsync HTTP adapters
//!
//! [`HttpRemoteStore`] implements the remote store seam with JSON requests;
//! [`SseTransport`] implements the push transport seam with a server-sent
//! events subscription. Both share the same base URL.
//!
//! # Example
//!
//! ```rust,ignore
//! use trailsync_http::{HttpRemoteStore, SseTransport};
//!
//! let remote = HttpRemoteStore::new("http://localhost:3002/api")?;
//! let transport = SseTransport::new("http://localhost:3002/api")?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod remote;
pub mod sse;

pub use remote::{HttpRemoteStore, DEFAULT_TIMEOUT};
pub use sse::{SseDecoder, SseTransport, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_PENDING};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
