//! Input injection seam.
//!
//! The OS-level injection syscalls live outside this crate. The session
//! dispatcher validates decoded events and hands them to whatever
//! [`InputInjector`] it owns; a failed injection is logged by the
//! dispatcher and never ends the session.

use tracing::debug;

use crate::error::SessionError;
use crate::proto::{KeyEvent, PointerEvent};

/// Applies decoded input events to the local desktop.
pub trait InputInjector: Send {
    /// Apply a pointer event.
    fn inject_pointer(&mut self, event: &PointerEvent) -> Result<(), SessionError>;

    /// Apply a key press or release.
    fn inject_key(&mut self, event: &KeyEvent) -> Result<(), SessionError>;
}

/// Injector that logs and discards every event.
///
/// Used on hosts where no OS injection backend is wired in, and by
/// view-only sessions that must never replay input.
pub struct NullInjector;

impl InputInjector for NullInjector {
    fn inject_pointer(&mut self, event: &PointerEvent) -> Result<(), SessionError> {
        debug!(x = event.x, y = event.y, buttons = event.buttons, "pointer event discarded");
        Ok(())
    }

    fn inject_key(&mut self, event: &KeyEvent) -> Result<(), SessionError> {
        debug!(
            usb_keycode = event.usb_keycode,
            pressed = event.pressed,
            "key event discarded"
        );
        Ok(())
    }
}
