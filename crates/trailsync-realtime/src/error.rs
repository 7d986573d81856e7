//! Error types for the push channel

use crate::state::ChannelState;

/// Failures of the underlying push transport
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Could not open the subscription
    #[error("connect failed: {0}")]
    Connect(String),

    /// Server answered with a non-success status
    #[error("unexpected status {0}")]
    Status(u16),

    /// Stream broke after opening
    #[error("stream error: {0}")]
    Stream(String),

    /// Server closed the stream
    #[error("stream closed by server")]
    Closed,
}

impl TransportError {
    /// Whether the failure happened before the stream opened
    #[inline]
    #[must_use]
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Status(_))
    }
}

/// Illegal channel state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal channel transition: {from:?} -> {to:?}")]
pub struct StateMachineError {
    /// State before the attempted transition
    pub from: ChannelState,
    /// Requested state
    pub to: ChannelState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_classification() {
        assert!(TransportError::Connect("refused".to_string()).is_connect_failure());
        assert!(TransportError::Status(503).is_connect_failure());
        assert!(!TransportError::Closed.is_connect_failure());
    }

    #[test]
    fn state_machine_error_display() {
        let err = StateMachineError {
            from: ChannelState::Disconnected,
            to: ChannelState::Connected,
        };
        assert_eq!(err.to_string(), "illegal channel transition: Disconnected -> Connected");
    }
}
