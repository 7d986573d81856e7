//! trailsync realtime channel
//!
//! Maintains a long-lived push subscription for out-of-band progress updates.
//! The subscription silently dies in practice (sleeping laptops, flaky Wi-Fi),
//! so the channel detects failure and reconnects with exponential backoff,
//! capped attempts, and wake/online-triggered revival.
//!
//! # Architecture
//!
//! ```text
//! PushTransport ──PushEvent──→ RealtimeChannel ──(route filter)──→ PushHandler
//!       ↑                            │
//!       └──── open(route) ←── supervisor task (backoff, park, revive)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use trailsync_realtime::{RealtimeChannel, ReconnectConfig, SharedRoute};
//!
//! let route = SharedRoute::new("/katas/intro");
//! let channel = RealtimeChannel::new(transport, handler, Arc::new(route), ReconnectConfig::default());
//! channel.connect("/katas/intro");
//! // ... later, when the OS reports connectivity again:
//! channel.notify_online();
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod channel;
pub mod error;
pub mod state;
pub mod transport;

pub use channel::{EnvironmentSignal, PushHandler, RealtimeChannel};
pub use error::{StateMachineError, TransportError};
pub use state::{allowed_transitions, validate_transition, ChannelState, ReconnectConfig, ReconnectState};
pub use transport::{PushEnvelope, PushEvent, PushStream, PushTransport, RouteSource, SharedRoute};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
