//! Capture-side types and the frame source seam.
//!
//! The OS capture mechanism itself lives outside this crate; the
//! session pulls [`CaptureUpdate`]s from whatever [`FrameSource`] it is
//! handed and never needs to know whether frames come from a desktop
//! duplication API, a virtual display, or the built-in test pattern.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::proto::SessionConfig;

/// Bytes per pixel. Frames are tightly packed 32-bit BGRA.
pub const BYTES_PER_PIXEL: usize = 4;

// ── Frame and cursor types ───────────────────────────────────────

/// A raw, uncompressed desktop frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Tightly packed BGRA pixels, `width * height * 4` bytes.
    pub data: Vec<u8>,
}

impl RawFrame {
    /// A frame filled with one byte value. Handy for tests and the
    /// test pattern source.
    pub fn filled(width: u32, height: u32, fill: u8) -> Self {
        Self {
            width,
            height,
            data: vec![fill; width as usize * height as usize * BYTES_PER_PIXEL],
        }
    }

    /// Whether `other` has the same pixel dimensions.
    pub fn same_geometry(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// A cursor bitmap plus its hotspot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CursorShape {
    pub width: u32,
    pub height: u32,
    pub hotspot_x: u16,
    pub hotspot_y: u16,
    /// Tightly packed BGRA pixels.
    pub data: Vec<u8>,
}

/// One capture cycle's output: a frame, and the cursor if the source
/// reports shapes at all.
#[derive(Debug, Clone)]
pub struct CaptureUpdate {
    pub frame: RawFrame,
    pub cursor: Option<CursorShape>,
}

// ── FrameSource ──────────────────────────────────────────────────

/// Asynchronous producer of capture updates.
///
/// `next_update` must be cancel safe: the capture pipeline drops the
/// pending future when the session shuts down mid-capture.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for and return the next frame / cursor pair.
    async fn next_update(&mut self) -> Result<CaptureUpdate, SessionError>;
}

/// Factory invoked each time a configuration (re)starts the pipeline,
/// sized to the negotiated geometry.
pub type FrameSourceFactory =
    Box<dyn FnMut(&SessionConfig) -> Result<Box<dyn FrameSource>, SessionError> + Send>;

// ── TestPatternSource ────────────────────────────────────────────

/// Synthetic frame source: a horizontal band sweeping down the screen.
///
/// Lets the worker stream end to end on machines where no OS capture
/// backend is wired in.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    tick: u64,
    interval: Duration,
}

impl TestPatternSource {
    /// Create a source producing `fps` frames per second at the given
    /// geometry.
    pub fn new(width: u32, height: u32, fps: u8) -> Self {
        let fps = fps.clamp(1, 60);
        Self {
            width,
            height,
            tick: 0,
            interval: Duration::from_secs_f64(1.0 / f64::from(fps)),
        }
    }

    fn render(&self) -> RawFrame {
        let mut frame = RawFrame::filled(self.width, self.height, 0x20);
        let band_y = (self.tick % u64::from(self.height.max(1))) as usize;
        let row_len = self.width as usize * BYTES_PER_PIXEL;
        let start = band_y * row_len;
        frame.data[start..start + row_len].fill(0xE0);
        frame
    }

    fn arrow_cursor() -> CursorShape {
        CursorShape {
            width: 8,
            height: 8,
            hotspot_x: 0,
            hotspot_y: 0,
            data: vec![0xFF; 8 * 8 * BYTES_PER_PIXEL],
        }
    }
}

#[async_trait]
impl FrameSource for TestPatternSource {
    async fn next_update(&mut self) -> Result<CaptureUpdate, SessionError> {
        tokio::time::sleep(self.interval).await;
        self.tick += 1;
        Ok(CaptureUpdate {
            frame: self.render(),
            cursor: Some(Self::arrow_cursor()),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filled_frame_size() {
        let frame = RawFrame::filled(16, 8, 0);
        assert_eq!(frame.data.len(), 16 * 8 * BYTES_PER_PIXEL);
    }

    #[test]
    fn geometry_comparison() {
        let a = RawFrame::filled(16, 8, 0);
        let b = RawFrame::filled(16, 8, 0xFF);
        let c = RawFrame::filled(8, 8, 0);
        assert!(a.same_geometry(&b));
        assert!(!a.same_geometry(&c));
    }

    #[tokio::test(start_paused = true)]
    async fn pattern_moves_between_frames() {
        let mut source = TestPatternSource::new(32, 32, 60);
        let first = source.next_update().await.unwrap();
        let second = source.next_update().await.unwrap();
        assert_ne!(first.frame.data, second.frame.data);
        assert!(first.cursor.is_some());
    }
}
