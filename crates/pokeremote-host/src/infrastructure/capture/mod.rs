//! Screen capture backends and frame encoders.
//!
//! # Platform implementations
//!
//! Each backend implements [`CaptureDevice`]; the native one is selected at
//! compile time and exposed through [`NativeCaptureFactory`]:
//!
//! | Module      | OS        | API used                                  |
//! |-------------|-----------|-------------------------------------------|
//! | `linux`     | Linux     | `XOpenDisplay` + `XGetImage`              |
//! | `windows`   | Windows   | GDI `BitBlt` + `GetDIBits`                |
//! | `synthetic` | any other | generated test pattern (logged as a warning) |
//!
//! [`MockCaptureDevice`](mock::MockCaptureDevice) is always compiled (not
//! guarded by `#[cfg]`) so tests on any platform can use it without a display.
//!
//! [`JpegFrameEncoder`](jpeg::JpegFrameEncoder) turns the BGRA bitmaps every
//! device produces into the JPEG bytes sent to the client.

pub mod jpeg;
pub mod mock;
pub mod synthetic;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "windows")]
pub mod windows;

use std::sync::Arc;

use pokeremote_core::CaptureConfig;

use crate::application::capture_loop::{CaptureDevice, CaptureDeviceFactory, CaptureError};

/// Creates the best capture device available on this platform.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeCaptureFactory;

impl CaptureDeviceFactory for NativeCaptureFactory {
    #[cfg(target_os = "linux")]
    fn create(&self) -> Result<Arc<dyn CaptureDevice>, CaptureError> {
        Ok(Arc::new(linux::X11CaptureDevice::new()))
    }

    #[cfg(target_os = "windows")]
    fn create(&self) -> Result<Arc<dyn CaptureDevice>, CaptureError> {
        Ok(Arc::new(windows::GdiCaptureDevice::new()))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    fn create(&self) -> Result<Arc<dyn CaptureDevice>, CaptureError> {
        tracing::warn!(
            os = std::env::consts::OS,
            "no native screen capture on this platform; streaming a synthetic test pattern"
        );
        Ok(Arc::new(synthetic::SyntheticCaptureDevice::default()))
    }
}

/// Intersects `region` with a `screen_w` × `screen_h` screen.
///
/// Returns `(x, y, width, height)` or `None` if nothing is left.  Native
/// grab calls reject rectangles that leave the screen, so every backend
/// clamps first.
#[cfg_attr(not(any(target_os = "linux", target_os = "windows")), allow(dead_code))]
pub(crate) fn clamp_region(
    region: &CaptureConfig,
    screen_w: u32,
    screen_h: u32,
) -> Option<(i32, i32, u32, u32)> {
    let x0 = region.x.max(0) as i64;
    let y0 = region.y.max(0) as i64;
    let x1 = (region.x as i64 + region.width as i64).min(screen_w as i64);
    let y1 = (region.y as i64 + region.height as i64).min(screen_h as i64);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0 as i32, y0 as i32, (x1 - x0) as u32, (y1 - y0) as u32))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
