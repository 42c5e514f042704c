//! Protocol message taxonomy exchanged over the session channel.
//!
//! # Wire protocol
//!
//! Each wire frame carries exactly one bincode-serialised message. The
//! very first frame after connect is an 8-byte correlation token and is
//! consumed by the transport layer; everything after that is one of the
//! two discriminated unions below.
//!
//! ```text
//! Host ──[ScreenUpdate]──────────────────────► Client   (repeated)
//! Host ──[Clipboard]─────────────────────────► Client
//! Host ──[Status]────────────────────────────► Client
//! Host ──[ConfigRequest]─────────────────────► Client   (once, on connect)
//!
//! Client ──[Config]──────────────────────────► Host     (before streaming)
//! Client ──[Pointer / Key]───────────────────► Host
//! Client ──[Clipboard]───────────────────────► Host
//! ```

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Largest geometry accepted in a session configuration, per axis.
pub const MAX_DIMENSION: u32 = 16_384;

// ── Outbound (host → client) ─────────────────────────────────────

/// Messages produced by the session worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum HostToClient {
    /// An encoded frame delta, optionally paired with an encoded
    /// cursor shape when the shape changed.
    ScreenUpdate {
        frame: Vec<u8>,
        cursor: Option<Vec<u8>>,
    },
    /// A local clipboard change to mirror on the peer.
    Clipboard(ClipboardEvent),
    /// Session status notification.
    Status(StatusCode),
    /// Ask the peer to send its session configuration.
    ConfigRequest,
}

impl HostToClient {
    /// Serialize to bytes for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SessionError> {
        bincode::serialize(self).map_err(|e| SessionError::Encoding(e.to_string()))
    }

    /// Deserialize from a wire frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SessionError> {
        bincode::deserialize(bytes).map_err(|e| SessionError::MalformedMessage(e.to_string()))
    }
}

// ── Inbound (client → host) ──────────────────────────────────────

/// Messages consumed by the session worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClientToHost {
    /// Pointer movement, buttons, or wheel.
    Pointer(PointerEvent),
    /// Keyboard press or release.
    Key(KeyEvent),
    /// A remote clipboard change to apply locally.
    Clipboard(ClipboardEvent),
    /// Negotiated session parameters. Expected once before streaming.
    Config(SessionConfig),
}

impl ClientToHost {
    /// Serialize to bytes for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SessionError> {
        bincode::serialize(self).map_err(|e| SessionError::Encoding(e.to_string()))
    }

    /// Deserialize from a wire frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SessionError> {
        bincode::deserialize(bytes).map_err(|e| SessionError::MalformedMessage(e.to_string()))
    }
}

// ── Session configuration ────────────────────────────────────────

/// Kind of desktop session requested by the peer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SessionType {
    /// Placeholder carried by peers that have not negotiated a type.
    /// Never valid in a configuration.
    #[default]
    Unknown,
    /// Full control: screen streaming plus input and clipboard.
    DesktopManage,
    /// View only: screen streaming, input is dropped.
    DesktopView,
}

impl std::fmt::Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::DesktopManage => write!(f, "desktop-manage"),
            Self::DesktopView => write!(f, "desktop-view"),
        }
    }
}

/// Per-session feature toggles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigOptions {
    /// Mirror clipboard contents between the peers.
    pub clipboard: bool,
    /// Stream cursor shape changes alongside frames.
    pub cursor_shape: bool,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            clipboard: true,
            cursor_shape: true,
        }
    }
}

/// Parameters exchanged exactly once before steady-state streaming.
///
/// The capture pipeline must not start before a configuration passes
/// [`validate`](Self::validate).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub session_type: SessionType,
    /// Desktop width in pixels.
    pub width: u32,
    /// Desktop height in pixels.
    pub height: u32,
    pub options: ConfigOptions,
}

impl SessionConfig {
    /// Build a configuration with default options.
    pub fn new(session_type: SessionType, width: u32, height: u32) -> Self {
        Self {
            session_type,
            width,
            height,
            options: ConfigOptions::default(),
        }
    }

    /// Check that the session type is recognised and the geometry is
    /// sane. A rejected configuration terminates the session — it is
    /// never retried.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.session_type == SessionType::Unknown {
            return Err(SessionError::UnsupportedConfig("unknown session type"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(SessionError::UnsupportedConfig("zero geometry"));
        }
        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err(SessionError::UnsupportedConfig("geometry exceeds maximum"));
        }
        Ok(())
    }

    /// Whether this session kind accepts injected input.
    pub fn accepts_input(&self) -> bool {
        self.session_type == SessionType::DesktopManage
    }
}

// ── Status ───────────────────────────────────────────────────────

/// Status notifications sent from host to client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    /// The received session configuration was rejected.
    InvalidConfig,
    /// The session ended because of a host-side failure.
    SessionAborted,
}

// ── Pointer input ────────────────────────────────────────────────

/// Pointer button bit masks for [`PointerEvent::buttons`].
pub mod pointer_buttons {
    pub const NONE: u8 = 0x00;
    pub const LEFT: u8 = 0x01;
    pub const RIGHT: u8 = 0x02;
    pub const MIDDLE: u8 = 0x04;
}

/// Pointer input event from the controlling peer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PointerEvent {
    /// X position in desktop coordinates.
    pub x: i32,
    /// Y position in desktop coordinates.
    pub y: i32,
    /// Currently held buttons ([`pointer_buttons`] mask).
    pub buttons: u8,
    /// Vertical wheel delta, in lines.
    pub wheel: i16,
}

impl PointerEvent {
    /// A plain movement with no buttons held.
    pub fn moved(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            buttons: pointer_buttons::NONE,
            wheel: 0,
        }
    }

    /// Movement with the given button mask held.
    pub fn with_buttons(x: i32, y: i32, buttons: u8) -> Self {
        Self {
            x,
            y,
            buttons,
            wheel: 0,
        }
    }
}

// ── Keyboard input ───────────────────────────────────────────────

/// Keyboard input event from the controlling peer.
///
/// Keys are identified by USB HID usage codes (page 0x07), which are
/// platform neutral; the injector maps them to OS keycodes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyEvent {
    /// USB HID usage code.
    pub usb_keycode: u32,
    /// `true` for press, `false` for release.
    pub pressed: bool,
}

impl KeyEvent {
    pub fn press(usb_keycode: u32) -> Self {
        Self {
            usb_keycode,
            pressed: true,
        }
    }

    pub fn release(usb_keycode: u32) -> Self {
        Self {
            usb_keycode,
            pressed: false,
        }
    }
}

// ── Clipboard ────────────────────────────────────────────────────

/// Clipboard content exchanged in either direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClipboardEvent {
    /// MIME type of `data`. Only `text/plain` is produced today.
    pub mime_type: String,
    /// Raw clipboard payload.
    pub data: Vec<u8>,
}

impl ClipboardEvent {
    /// Plain-text clipboard content.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            mime_type: "text/plain".to_owned(),
            data: text.into().into_bytes(),
        }
    }

    /// Interpret the payload as UTF-8 text, if it is.
    pub fn as_text(&self) -> Option<&str> {
        if self.mime_type == "text/plain" {
            std::str::from_utf8(&self.data).ok()
        } else {
            None
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_update_roundtrip() {
        let msg = HostToClient::ScreenUpdate {
            frame: vec![1, 2, 3],
            cursor: Some(vec![9, 9]),
        };
        let bytes = msg.to_bytes().unwrap();
        let decoded = HostToClient::from_bytes(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn inbound_roundtrip() {
        let messages = vec![
            ClientToHost::Pointer(PointerEvent::with_buttons(10, 20, pointer_buttons::LEFT)),
            ClientToHost::Key(KeyEvent::press(0x04)),
            ClientToHost::Clipboard(ClipboardEvent::text("hello")),
            ClientToHost::Config(SessionConfig::new(SessionType::DesktopManage, 1920, 1080)),
        ];
        for msg in messages {
            let bytes = msg.to_bytes().unwrap();
            assert_eq!(ClientToHost::from_bytes(&bytes).unwrap(), msg);
        }
    }

    #[test]
    fn garbage_is_malformed() {
        let err = ClientToHost::from_bytes(&[0xFF; 3]).unwrap_err();
        assert!(matches!(err, SessionError::MalformedMessage(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn config_validation() {
        assert!(
            SessionConfig::new(SessionType::DesktopManage, 1920, 1080)
                .validate()
                .is_ok()
        );
        assert!(
            SessionConfig::new(SessionType::Unknown, 1920, 1080)
                .validate()
                .is_err()
        );
        assert!(
            SessionConfig::new(SessionType::DesktopView, 0, 1080)
                .validate()
                .is_err()
        );
        assert!(
            SessionConfig::new(SessionType::DesktopView, MAX_DIMENSION + 1, 1080)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn input_acceptance_by_session_type() {
        assert!(
            SessionConfig::new(SessionType::DesktopManage, 800, 600).accepts_input()
        );
        assert!(
            !SessionConfig::new(SessionType::DesktopView, 800, 600).accepts_input()
        );
    }

    #[test]
    fn clipboard_text_helpers() {
        let ev = ClipboardEvent::text("copy me");
        assert_eq!(ev.as_text(), Some("copy me"));

        let binary = ClipboardEvent {
            mime_type: "image/png".to_owned(),
            data: vec![0x89, 0x50],
        };
        assert_eq!(binary.as_text(), None);
    }
}
