//! Synthetic capture device that renders a moving test pattern.
//!
//! Used on platforms without a native capture backend, and handy for
//! exercising the full video path (encode, chunk, send) on a headless host.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use pokeremote_core::{CaptureConfig, RawFrame};

use crate::application::capture_loop::{CaptureDevice, CaptureError};

/// Renders vertical colour bars that scroll one column per frame.
#[derive(Debug)]
pub struct SyntheticCaptureDevice {
    width: u32,
    height: u32,
    open: AtomicBool,
    offset: AtomicU32,
}

impl SyntheticCaptureDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            open: AtomicBool::new(false),
            offset: AtomicU32::new(0),
        }
    }
}

impl Default for SyntheticCaptureDevice {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

/// BGRA colours of the eight bars.
const BARS: [[u8; 4]; 8] = [
    [0xFF, 0xFF, 0xFF, 0xFF],
    [0x00, 0xFF, 0xFF, 0xFF],
    [0xFF, 0xFF, 0x00, 0xFF],
    [0x00, 0xFF, 0x00, 0xFF],
    [0xFF, 0x00, 0xFF, 0xFF],
    [0x00, 0x00, 0xFF, 0xFF],
    [0xFF, 0x00, 0x00, 0xFF],
    [0x00, 0x00, 0x00, 0xFF],
];

impl CaptureDevice for SyntheticCaptureDevice {
    fn screen_size(&self) -> Result<(u32, u32), CaptureError> {
        Ok((self.width, self.height))
    }

    fn open(&self) -> Result<(), CaptureError> {
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    fn capture(&self, region: &CaptureConfig) -> Result<RawFrame, CaptureError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(CaptureError::Device("device not open".to_string()));
        }
        let (w, h) = (region.width.max(1), region.height.max(1));
        let bar_width = (w / BARS.len() as u32).max(1);
        let shift = self.offset.fetch_add(1, Ordering::Relaxed);

        let mut data = Vec::with_capacity(w as usize * h as usize * 4);
        for _ in 0..h {
            for x in 0..w {
                let bar = ((x.wrapping_add(shift) / bar_width) as usize) % BARS.len();
                data.extend_from_slice(&BARS[bar]);
            }
        }
        Ok(RawFrame::packed(w, h, data))
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_fills_requested_region() {
        let device = SyntheticCaptureDevice::new(64, 48);
        device.open().unwrap();
        let region = CaptureConfig::default().resolve(64, 48);

        let frame = device.capture(&region).unwrap();

        assert_eq!(frame.data.len(), 64 * 48 * 4);
    }

    #[test]
    fn test_pattern_scrolls_between_frames() {
        let device = SyntheticCaptureDevice::new(16, 1);
        device.open().unwrap();
        let region = CaptureConfig::default().resolve(16, 1);

        let a = device.capture(&region).unwrap();
        let b = device.capture(&region).unwrap();

        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_closed_device_refuses_capture() {
        let device = SyntheticCaptureDevice::default();
        assert!(device.capture(&CaptureConfig::default()).is_err());
    }
}
