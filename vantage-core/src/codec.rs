//! Frame and cursor encoders.
//!
//! Both encoders are stateful and exclusively owned by the capture
//! pipeline task — encode → send → ack forms one serialized chain per
//! frame, so no cross-task sharing is ever needed.
//!
//! ## Video payload layout (before zstd)
//!
//! ```text
//! kind:        u8   (0 = full frame, 1 = delta)
//! width:       u32  (pixels)
//! height:      u32  (pixels)
//! — full —
//! pixels:      [u8] (width * height * 4)
//! — delta —
//! block_count: u32
//! per block:   x: u32, y: u32, w: u32, h: u32, pixels: [u8]
//! ```
//!
//! An unchanged frame encodes to an **empty** byte vector; the caller
//! skips the update entirely.

use crate::capture::{BYTES_PER_PIXEL, CursorShape, RawFrame};
use crate::error::SessionError;

/// Delta comparison tile edge, in pixels.
const BLOCK_SIZE: usize = 64;

/// Above this fraction of dirty blocks a full frame is cheaper.
const FULL_FRAME_RATIO: f64 = 0.80;

/// zstd level; favour speed over ratio for interactive streaming.
const COMPRESSION_LEVEL: i32 = 1;

// ── VideoEncoder ─────────────────────────────────────────────────

/// Diff-based frame encoder.
///
/// Keeps its own copy of the last-encoded frame and emits only the
/// incremental change: dirty `64×64` tiles, or the full frame on the
/// first call, after a geometry change, or when most tiles are dirty.
pub struct VideoEncoder {
    previous: Option<RawFrame>,
    frames_encoded: u64,
}

impl VideoEncoder {
    pub fn new() -> Self {
        Self {
            previous: None,
            frames_encoded: 0,
        }
    }

    /// Number of non-empty deltas produced so far.
    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    /// Encode `frame` against the previously encoded frame.
    ///
    /// Returns an empty vector when nothing changed.
    pub fn encode(&mut self, frame: &RawFrame) -> Result<Vec<u8>, SessionError> {
        let expected = frame.width as usize * frame.height as usize * BYTES_PER_PIXEL;
        if frame.data.len() != expected {
            return Err(SessionError::Encoder(format!(
                "frame buffer is {} bytes, geometry needs {expected}",
                frame.data.len()
            )));
        }

        let payload = match &self.previous {
            Some(prev) if prev.same_geometry(frame) => {
                let blocks = Self::changed_blocks(frame, prev);
                if blocks.is_empty() {
                    self.previous = Some(frame.clone());
                    return Ok(Vec::new());
                }
                let total = Self::block_count(frame.width) * Self::block_count(frame.height);
                if blocks.len() as f64 / total as f64 > FULL_FRAME_RATIO {
                    Self::full_payload(frame)
                } else {
                    Self::delta_payload(frame, &blocks)
                }
            }
            // First frame or resolution change.
            _ => Self::full_payload(frame),
        };

        let compressed = zstd::encode_all(payload.as_slice(), COMPRESSION_LEVEL)
            .map_err(|e| SessionError::Encoder(format!("zstd: {e}")))?;

        self.previous = Some(frame.clone());
        self.frames_encoded += 1;
        Ok(compressed)
    }

    /// Forget the previous frame, forcing the next encode to be full.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    // ── Internal ─────────────────────────────────────────────────

    fn block_count(pixels: u32) -> usize {
        (pixels as usize).div_ceil(BLOCK_SIZE)
    }

    /// Dirty tiles as `(x, y, w, h)` rectangles in pixels.
    fn changed_blocks(current: &RawFrame, previous: &RawFrame) -> Vec<(u32, u32, u32, u32)> {
        let w = current.width as usize;
        let h = current.height as usize;
        let row_len = w * BYTES_PER_PIXEL;

        let mut dirty = Vec::new();
        for by in 0..Self::block_count(current.height) {
            for bx in 0..Self::block_count(current.width) {
                let x0 = bx * BLOCK_SIZE;
                let y0 = by * BLOCK_SIZE;
                let x1 = (x0 + BLOCK_SIZE).min(w);
                let y1 = (y0 + BLOCK_SIZE).min(h);

                let differs = (y0..y1).any(|y| {
                    let left = y * row_len + x0 * BYTES_PER_PIXEL;
                    let right = y * row_len + x1 * BYTES_PER_PIXEL;
                    current.data[left..right] != previous.data[left..right]
                });
                if differs {
                    dirty.push((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32));
                }
            }
        }
        dirty
    }

    fn full_payload(frame: &RawFrame) -> Vec<u8> {
        let mut out = Vec::with_capacity(9 + frame.data.len());
        out.push(0u8);
        out.extend_from_slice(&frame.width.to_le_bytes());
        out.extend_from_slice(&frame.height.to_le_bytes());
        out.extend_from_slice(&frame.data);
        out
    }

    fn delta_payload(frame: &RawFrame, blocks: &[(u32, u32, u32, u32)]) -> Vec<u8> {
        let row_len = frame.width as usize * BYTES_PER_PIXEL;

        let mut out = Vec::new();
        out.push(1u8);
        out.extend_from_slice(&frame.width.to_le_bytes());
        out.extend_from_slice(&frame.height.to_le_bytes());
        out.extend_from_slice(&(blocks.len() as u32).to_le_bytes());

        for &(x, y, w, h) in blocks {
            out.extend_from_slice(&x.to_le_bytes());
            out.extend_from_slice(&y.to_le_bytes());
            out.extend_from_slice(&w.to_le_bytes());
            out.extend_from_slice(&h.to_le_bytes());

            let left = x as usize * BYTES_PER_PIXEL;
            let width_bytes = w as usize * BYTES_PER_PIXEL;
            for row in 0..h as usize {
                let offset = (y as usize + row) * row_len + left;
                out.extend_from_slice(&frame.data[offset..offset + width_bytes]);
            }
        }
        out
    }
}

impl Default for VideoEncoder {
    fn default() -> Self {
        Self::new()
    }
}

// ── CursorEncoder ────────────────────────────────────────────────

/// Cursor shape encoder with change suppression.
///
/// Remembers a digest of the last-encoded shape and emits nothing when
/// the shape has not changed.
pub struct CursorEncoder {
    last_shape: Option<blake3::Hash>,
}

impl CursorEncoder {
    pub fn new() -> Self {
        Self { last_shape: None }
    }

    /// Encode `cursor` if its shape differs from the last one sent.
    pub fn encode(&mut self, cursor: &CursorShape) -> Result<Option<Vec<u8>>, SessionError> {
        let digest = Self::digest(cursor);
        if self.last_shape == Some(digest) {
            return Ok(None);
        }

        let raw = bincode::serialize(cursor)
            .map_err(|e| SessionError::Encoder(format!("cursor serialize: {e}")))?;
        let compressed = zstd::encode_all(raw.as_slice(), COMPRESSION_LEVEL)
            .map_err(|e| SessionError::Encoder(format!("zstd: {e}")))?;

        self.last_shape = Some(digest);
        Ok(Some(compressed))
    }

    fn digest(cursor: &CursorShape) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&cursor.width.to_le_bytes());
        hasher.update(&cursor.height.to_le_bytes());
        hasher.update(&cursor.hotspot_x.to_le_bytes());
        hasher.update(&cursor.hotspot_y.to_le_bytes());
        hasher.update(&cursor.data);
        hasher.finalize()
    }
}

impl Default for CursorEncoder {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
