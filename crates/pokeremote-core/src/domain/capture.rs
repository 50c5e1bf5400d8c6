//! Screen-capture region, cadence, and frame buffers.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Region and cadence of a capture loop.
///
/// A `width`/`height` of zero means "the full primary screen".  That sentinel
/// is resolved once, when the capture loop is constructed, via
/// [`CaptureConfig::resolve`]; afterwards the config is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Left edge of the captured region in screen pixels.
    pub x: i32,
    /// Top edge of the captured region in screen pixels.
    pub y: i32,
    /// Region width in pixels; `0` means full screen.
    pub width: u32,
    /// Region height in pixels; `0` means full screen.
    pub height: u32,
    /// Frames produced per second.
    pub frame_rate: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            frame_rate: 15,
        }
    }
}

impl CaptureConfig {
    /// Returns `true` when the region still carries the full-screen sentinel.
    pub fn is_full_screen(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Replaces the full-screen sentinel with the actual screen size.
    ///
    /// Explicit regions are returned unchanged.
    pub fn resolve(self, screen_width: u32, screen_height: u32) -> Self {
        if self.is_full_screen() {
            Self {
                width: screen_width,
                height: screen_height,
                ..self
            }
        } else {
            self
        }
    }

    /// Time between two ticks: `1000 / frame_rate` milliseconds rounded to
    /// the nearest millisecond, never less than 1 ms.
    ///
    /// A zero frame rate is treated as one frame per second.
    pub fn frame_interval(&self) -> Duration {
        let fps = u64::from(self.frame_rate.max(1));
        let millis = (1000 + fps / 2) / fps;
        Duration::from_millis(millis.max(1))
    }
}

/// A bitmap as grabbed from the capture device, before encoding.
///
/// Pixels are 32-bit BGRA rows of `stride` bytes each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, including any padding the device adds.
    pub stride: usize,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Builds a tightly packed BGRA frame (`stride == width * 4`).
    pub fn packed(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            stride: width as usize * 4,
            data,
        }
    }
}

/// An encoded frame handed from the capture loop to its consumer.
///
/// A fresh `Frame` is produced every tick.  The loop keeps no reference to it
/// after the consumer callback returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Monotonic per-loop counter, starting at 0.
    pub sequence: u64,
    /// Encoded image bytes (JPEG for the native devices).
    pub data: Bytes,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_interval_rounds_to_nearest_millisecond() {
        let cfg = CaptureConfig {
            frame_rate: 15,
            ..Default::default()
        };
        // 1000 / 15 = 66.67 → 67
        assert_eq!(cfg.frame_interval(), Duration::from_millis(67));
    }

    #[test]
    fn test_frame_interval_exact_division() {
        let cfg = CaptureConfig {
            frame_rate: 10,
            ..Default::default()
        };
        assert_eq!(cfg.frame_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_frame_interval_has_one_millisecond_floor() {
        let cfg = CaptureConfig {
            frame_rate: 5000,
            ..Default::default()
        };
        assert_eq!(cfg.frame_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_frame_interval_zero_rate_is_one_second() {
        let cfg = CaptureConfig {
            frame_rate: 0,
            ..Default::default()
        };
        assert_eq!(cfg.frame_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_resolve_replaces_full_screen_sentinel() {
        let cfg = CaptureConfig::default().resolve(1920, 1080);
        assert_eq!((cfg.width, cfg.height), (1920, 1080));
    }

    #[test]
    fn test_resolve_keeps_explicit_region() {
        let cfg = CaptureConfig {
            x: 10,
            y: 20,
            width: 640,
            height: 480,
            frame_rate: 30,
        };
        assert_eq!(cfg.resolve(1920, 1080), cfg);
    }

    #[test]
    fn test_packed_raw_frame_stride() {
        let frame = RawFrame::packed(4, 2, vec![0; 32]);
        assert_eq!(frame.stride, 16);
    }
}
