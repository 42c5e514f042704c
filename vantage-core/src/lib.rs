//! # vantage-core
//!
//! Session-side worker library for the Vantage remote desktop host.
//!
//! This crate contains:
//! - **Protocol types**: `HostToClient`, `ClientToHost`, `SessionConfig`, input and clipboard events
//! - **IPC**: `Transport` for length-prefixed framing over a duplex byte stream, and
//!   `ChannelProxy` — the thread-safe send/post/event surface shared across subsystems
//! - **Session**: `DesktopSession`, the orchestrator that owns the capture pipeline,
//!   clipboard bridge, and input injection for one session channel
//! - **Codec**: `VideoEncoder` (block-delta + zstd) and `CursorEncoder` (dedup by digest)
//! - **Capture**: the `FrameSource` seam plus a synthetic `TestPatternSource`
//! - **Input / Clipboard**: injection and clipboard-sync seams with default stand-ins
//! - **State**: the monotonic `ChannelState` machine
//! - **Error**: `SessionError` — typed, `thiserror`-based error hierarchy

pub mod capture;
pub mod clipboard;
pub mod codec;
pub mod error;
pub mod input;
pub mod ipc;
pub mod proto;
pub mod session;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capture::{CaptureUpdate, CursorShape, FrameSource, FrameSourceFactory, RawFrame, TestPatternSource};
pub use clipboard::{ClipboardBridge, ClipboardDevice, IdleClipboard};
pub use codec::{CursorEncoder, VideoEncoder};
pub use error::SessionError;
pub use input::{InputInjector, NullInjector};
pub use ipc::{ChannelProxy, SendAck, Transport, TransportEvent};
pub use proto::{
    ClientToHost, ClipboardEvent, ConfigOptions, HostToClient, KeyEvent, PointerEvent,
    SessionConfig, SessionType, StatusCode,
};
pub use session::{DesktopSession, SessionParts};
pub use state::ChannelState;
