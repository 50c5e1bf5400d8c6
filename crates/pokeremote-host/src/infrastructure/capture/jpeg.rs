//! JPEG encoding of captured BGRA bitmaps.
//!
//! Capture devices hand out 32-bit BGRA rows (the native layout of both
//! `XGetImage` on a 24/32-bit visual and the Windows GDI).  JPEG has no alpha
//! channel, so each pixel is repacked as RGB before encoding.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageEncoder};
use pokeremote_core::RawFrame;

use crate::application::capture_loop::{CaptureError, FrameEncoder};

/// Encodes frames as baseline JPEG at a fixed quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    /// `quality` is clamped to `1..=100`.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegFrameEncoder {
    fn default() -> Self {
        Self::new(70)
    }
}

impl FrameEncoder for JpegFrameEncoder {
    fn encode(&self, frame: &RawFrame) -> Result<Bytes, CaptureError> {
        let rgb = bgra_to_rgb(frame)?;
        let mut out = Vec::with_capacity(rgb.len() / 8);
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .write_image(&rgb, frame.width, frame.height, ColorType::Rgb8)
            .map_err(|e| CaptureError::Transient(format!("JPEG encoding failed: {e}")))?;
        Ok(Bytes::from(out))
    }
}

/// Repacks a (possibly padded) BGRA bitmap into tightly packed RGB.
fn bgra_to_rgb(frame: &RawFrame) -> Result<Vec<u8>, CaptureError> {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let row_bytes = width * 4;

    if width == 0 || height == 0 {
        return Err(CaptureError::Transient("empty frame".to_string()));
    }
    if frame.stride < row_bytes || frame.data.len() < frame.stride * (height - 1) + row_bytes {
        return Err(CaptureError::Transient(format!(
            "bitmap too short for {width}x{height} (stride {}, {} bytes)",
            frame.stride,
            frame.data.len()
        )));
    }

    let mut rgb = Vec::with_capacity(width * height * 3);
    for row in frame.data.chunks(frame.stride).take(height) {
        for px in row[..row_bytes].chunks_exact(4) {
            rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }
    }
    Ok(rgb)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
