//! Channel state machine and reconnect bookkeeping

use crate::error::StateMachineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Push channel lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelState {
    /// Not connected and not trying to be
    Disconnected,
    /// Opening the subscription
    Connecting,
    /// Receiving events
    Connected,
    /// Waiting for the next reconnect attempt
    ErrorBackoff,
    /// Gave up; only a wake/online signal restarts it
    TerminatedMaxAttempts,
}

/// Validates a state transition.
///
/// Illegal transitions are reported as errors; with the `strict-debug`
/// feature they panic instead.
pub fn validate_transition(from: ChannelState, to: ChannelState) -> Result<(), StateMachineError> {
    if allowed(from, to) {
        Ok(())
    } else {
        #[cfg(feature = "strict-debug")]
        panic!("Illegal channel transition attempted: {from:?} -> {to:?}");

        Err(StateMachineError { from, to })
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: ChannelState) -> Vec<ChannelState> {
    use ChannelState::*;
    match from {
        Disconnected => vec![Connecting],
        Connecting => vec![Connected, ErrorBackoff, Disconnected],
        Connected => vec![ErrorBackoff, Disconnected],
        ErrorBackoff => vec![Connecting, TerminatedMaxAttempts, Disconnected],
        TerminatedMaxAttempts => vec![Connecting, Disconnected],
    }
}

fn allowed(from: ChannelState, to: ChannelState) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}

/// Reconnect tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Retries before parking in `TerminatedMaxAttempts`
    pub max_attempts: u32,
}

impl ReconnectConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With base delay
    #[inline]
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With max attempts
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_attempts: 5,
        }
    }
}

/// Retry counter and connection flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectState {
    /// Failed attempts since the last successful open
    pub attempts: u32,
    /// Retry budget
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Whether the stream is open
    pub connected: bool,
}

impl ReconnectState {
    /// Fresh state from config
    #[inline]
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            attempts: 0,
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            connected: false,
        }
    }

    /// `base_delay * 2^attempts`, saturating
    #[inline]
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(self.attempts))
    }

    /// Record a failure; returns the delay to wait before retrying, or
    /// `None` once the retry budget is spent
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.connected = false;
        if self.exhausted() {
            return None;
        }
        let delay = self.next_delay();
        self.attempts = self.attempts.saturating_add(1);
        Some(delay)
    }

    /// Record a successful open
    pub fn record_connected(&mut self) {
        self.connected = true;
        self.attempts = 0;
    }

    /// Wake/online signal: resets the budget while disconnected
    ///
    /// # Returns
    /// Whether the counter was reset
    pub fn record_wake(&mut self) -> bool {
        if self.connected {
            return false;
        }
        self.attempts = 0;
        true
    }

    /// Whether the retry budget is spent
    #[inline]
    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}
