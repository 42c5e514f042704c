//! Error types for the Vantage session worker.
//!
//! All fallible operations return `Result<T, SessionError>`.
//! No panics on invalid input — every error is typed, and each variant
//! maps to one row of the session's error-handling table: some end the
//! session, some are logged and absorbed at the call site.

use thiserror::Error;

/// The canonical error type for the session worker.
#[derive(Debug, Error)]
pub enum SessionError {
    // ── Channel errors ───────────────────────────────────────────
    /// The channel proxy reported the transport as gone. Non-fatal at
    /// the call site: producers stop producing, the session closes.
    #[error("transport gone")]
    TransportGone,

    /// An inbound buffer could not be decoded. Fatal — the protocol
    /// framing can no longer be trusted.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    // ── Session errors ───────────────────────────────────────────
    /// The peer's session configuration failed validation. Fatal; a
    /// single failure status is emitted before teardown.
    #[error("unsupported session config: {0}")]
    UnsupportedConfig(&'static str),

    /// A state transition was requested that the channel state machine
    /// does not permit.
    #[error("invalid session state: {0}")]
    State(&'static str),

    // ── Subsystem errors ─────────────────────────────────────────
    /// Frame or cursor encoding failed. Fatal — updates can no longer
    /// be produced reliably.
    #[error("encoder failure: {0}")]
    Encoder(String),

    /// The capture source failed to produce an update. Fatal.
    #[error("capture failure: {0}")]
    Capture(String),

    /// OS input injection failed. Logged by the dispatcher; the
    /// session continues.
    #[error("input injection failed: {0}")]
    Injection(String),

    /// The clipboard device failed. The bridge stops watching; the
    /// session continues without clipboard sync.
    #[error("clipboard failure: {0}")]
    Clipboard(String),

    // ── Plumbing ─────────────────────────────────────────────────
    /// Serialization of an outbound message failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// An internal mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// The I/O layer reported an error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Whether this error terminates the session when it reaches the
    /// orchestrator.
    ///
    /// `TransportGone` also ends the session, but through the orderly
    /// close path rather than as a failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MalformedMessage(_)
                | Self::UnsupportedConfig(_)
                | Self::Encoder(_)
                | Self::Capture(_)
                | Self::Encoding(_)
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for SessionError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        SessionError::ChannelClosed
    }
}

impl From<Box<bincode::ErrorKind>> for SessionError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        SessionError::Encoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let e = SessionError::TransportGone;
        assert!(e.to_string().contains("gone"));

        let e = SessionError::UnsupportedConfig("unknown session type");
        assert!(e.to_string().contains("unknown session type"));
    }

    #[test]
    fn fatality_table() {
        assert!(SessionError::MalformedMessage("x".into()).is_fatal());
        assert!(SessionError::UnsupportedConfig("x").is_fatal());
        assert!(SessionError::Encoder("x".into()).is_fatal());
        assert!(!SessionError::TransportGone.is_fatal());
        assert!(!SessionError::Injection("x".into()).is_fatal());
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: SessionError = io_err.into();
        assert!(matches!(e, SessionError::Io(_)));
    }
}
