//! Session channel state machine.
//!
//! Transitions are strictly monotonic — the state only moves forward,
//! and `Closed` is terminal:
//!
//! ```text
//!  Idle ──► Connected ──► Configured ──► Closing ──► Closed
//!    │          │              ▲ │           ▲
//!    │          └── Config ────┘ └───────────┤
//!    └───────────────────────────────────────┘
//! ```
//!
//! Reaching `Closing` triggers the ordered shutdown of every owned
//! subsystem before the session reaches `Closed`.

use crate::error::SessionError;

/// Lifecycle state of the session channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// Created, waiting for the transport to connect.
    #[default]
    Idle,

    /// Transport connected; awaiting the session configuration.
    Connected,

    /// Configuration accepted; capture and clipboard are running.
    Configured,

    /// Teardown in progress: subsystems are being stopped in reverse
    /// creation order.
    Closing,

    /// Terminal. The channel proxy has been told the transport is gone.
    Closed,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connected => write!(f, "Connected"),
            Self::Configured => write!(f, "Configured"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl ChannelState {
    /// Whether streaming subsystems may be running.
    pub fn is_configured(&self) -> bool {
        matches!(self, Self::Configured)
    }

    /// Whether the session has begun or finished teardown.
    pub fn is_closing_or_closed(&self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }

    /// Whether the session is fully torn down.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connected`.
    ///
    /// Valid from: `Idle`.
    pub fn on_connected(&mut self) -> Result<(), SessionError> {
        match self {
            Self::Idle => {
                *self = Self::Connected;
                Ok(())
            }
            _ => Err(SessionError::State("connect outside Idle")),
        }
    }

    /// Transition to `Configured`.
    ///
    /// Valid from: `Connected` (first configuration) and `Configured`
    /// (re-configuration restarts the pipeline, the state holds).
    pub fn on_configured(&mut self) -> Result<(), SessionError> {
        match self {
            Self::Connected | Self::Configured => {
                *self = Self::Configured;
                Ok(())
            }
            _ => Err(SessionError::State("configure before connect or after close")),
        }
    }

    /// Transition to `Closing`.
    ///
    /// Valid from every state except `Closed`; calling it while already
    /// `Closing` is a no-op so that multiple fatal triggers funnel into
    /// one teardown.
    pub fn begin_closing(&mut self) -> Result<(), SessionError> {
        match self {
            Self::Closed => Err(SessionError::State("close a closed session")),
            _ => {
                *self = Self::Closing;
                Ok(())
            }
        }
    }

    /// Transition to `Closed`.
    ///
    /// Valid from: `Closing`.
    pub fn close(&mut self) -> Result<(), SessionError> {
        match self {
            Self::Closing => {
                *self = Self::Closed;
                Ok(())
            }
            _ => Err(SessionError::State("close before Closing")),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut state = ChannelState::default();
        assert_eq!(state, ChannelState::Idle);

        state.on_connected().unwrap();
        assert_eq!(state, ChannelState::Connected);

        state.on_configured().unwrap();
        assert!(state.is_configured());

        state.begin_closing().unwrap();
        assert!(state.is_closing_or_closed());

        state.close().unwrap();
        assert!(state.is_closed());
    }

    #[test]
    fn reconfigure_keeps_configured() {
        let mut state = ChannelState::Configured;
        state.on_configured().unwrap();
        assert!(state.is_configured());
    }

    #[test]
    fn no_backward_transitions() {
        let mut state = ChannelState::Configured;
        assert!(state.on_connected().is_err());

        let mut state = ChannelState::Closing;
        assert!(state.on_configured().is_err());

        let mut state = ChannelState::Closed;
        assert!(state.begin_closing().is_err());
        assert!(state.on_connected().is_err());
    }

    #[test]
    fn closing_is_idempotent() {
        let mut state = ChannelState::Connected;
        state.begin_closing().unwrap();
        state.begin_closing().unwrap();
        assert_eq!(state, ChannelState::Closing);
    }

    #[test]
    fn configure_requires_connect() {
        let mut state = ChannelState::Idle;
        assert!(state.on_configured().is_err());
    }

    #[test]
    fn close_requires_closing() {
        let mut state = ChannelState::Connected;
        assert!(state.close().is_err());
    }

    #[test]
    fn display_format() {
        assert_eq!(ChannelState::Idle.to_string(), "Idle");
        assert_eq!(ChannelState::Closed.to_string(), "Closed");
    }
}
