//! Linux screen capture via the X11 Xlib API.
//!
//! Grabs the configured region of the root window with `XGetImage`.  On the
//! usual 24/32-bit TrueColor visuals the returned `ZPixmap` image is already
//! laid out as little-endian BGRX, which is exactly the BGRA layout the rest of
//! the pipeline expects, so the rows are copied out unchanged.
//!
//! # Threading
//!
//! Xlib connections are not safe to share between threads unless
//! `XInitThreads` was called first.  Every device therefore owns its own
//! `Display` connection and serialises all calls through a mutex.
//!
//! `close` never waits for that mutex.  If a grab is in flight it only marks
//! the close as pending, and whichever call holds the mutex performs the
//! close when it lets go.
//!
//! # Out-of-bounds regions
//!
//! `XGetImage` raises a `BadMatch` protocol error for a rectangle that is not
//! fully inside the window, and the default Xlib error handler terminates the
//! process.  The requested region is clamped to the screen before each grab.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use pokeremote_core::{CaptureConfig, RawFrame};
use x11::xlib;

use super::clamp_region;
use crate::application::capture_loop::{CaptureDevice, CaptureError};

struct DisplayHandle(*mut xlib::Display);

// SAFETY: the pointer is only dereferenced while holding the device mutex,
// so no two threads ever use the connection concurrently.
unsafe impl Send for DisplayHandle {}

/// X11 implementation of [`CaptureDevice`].
pub struct X11CaptureDevice {
    display: Mutex<Option<DisplayHandle>>,
    close_pending: AtomicBool,
}

impl X11CaptureDevice {
    pub fn new() -> Self {
        Self {
            display: Mutex::new(None),
            close_pending: AtomicBool::new(false),
        }
    }

    /// Performs a pending close if the display mutex is free.
    ///
    /// Every holder of the mutex calls this after releasing it, so a close
    /// requested while the mutex was busy is carried out by the last holder.
    fn finish_pending_close(&self) {
        if !self.close_pending.load(Ordering::SeqCst) {
            return;
        }
        if let Some(mut guard) = self.display.try_lock() {
            if self.close_pending.swap(false, Ordering::SeqCst) {
                close_handle(guard.take());
            }
        }
    }
}

fn close_handle(handle: Option<DisplayHandle>) {
    if let Some(handle) = handle {
        // SAFETY: the handle was opened by XOpenDisplay and is dropped here.
        unsafe { xlib::XCloseDisplay(handle.0) };
    }
}

impl Default for X11CaptureDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn open_display() -> Result<*mut xlib::Display, CaptureError> {
    // SAFETY: a null name makes Xlib use $DISPLAY.  The returned pointer must
    // be released with XCloseDisplay.
    let display = unsafe { xlib::XOpenDisplay(std::ptr::null()) };
    if display.is_null() {
        let display_env = std::env::var("DISPLAY").unwrap_or_else(|_| "<unset>".to_string());
        return Err(CaptureError::Device(format!(
            "XOpenDisplay failed; DISPLAY={display_env}"
        )));
    }
    Ok(display)
}

/// Size of the default screen of an open display.
///
/// # Safety
///
/// `display` must be a valid pointer returned by `XOpenDisplay`.
unsafe fn default_screen_size(display: *mut xlib::Display) -> (u32, u32) {
    let screen = xlib::XDefaultScreen(display);
    (
        xlib::XDisplayWidth(display, screen).max(0) as u32,
        xlib::XDisplayHeight(display, screen).max(0) as u32,
    )
}

impl CaptureDevice for X11CaptureDevice {
    fn screen_size(&self) -> Result<(u32, u32), CaptureError> {
        let live = {
            let guard = self.display.lock();
            // SAFETY: the handle holds a live connection while it is stored.
            guard.as_ref().map(|handle| unsafe { default_screen_size(handle.0) })
        };
        self.finish_pending_close();
        if let Some(size) = live {
            return Ok(size);
        }

        let display = open_display()?;
        // SAFETY: `display` was just opened and is closed right after use.
        let size = unsafe { default_screen_size(display) };
        unsafe { xlib::XCloseDisplay(display) };
        Ok(size)
    }

    fn open(&self) -> Result<(), CaptureError> {
        let mut guard = self.display.lock();
        // A fresh open supersedes a close that has not happened yet.
        self.close_pending.store(false, Ordering::SeqCst);
        if guard.is_none() {
            *guard = Some(DisplayHandle(open_display()?));
        }
        Ok(())
    }

    fn capture(&self, region: &CaptureConfig) -> Result<RawFrame, CaptureError> {
        let result = self.capture_locked(region);
        self.finish_pending_close();
        result
    }

    fn close(&self) {
        self.close_pending.store(true, Ordering::SeqCst);
        self.finish_pending_close();
    }
}

impl X11CaptureDevice {
    fn capture_locked(&self, region: &CaptureConfig) -> Result<RawFrame, CaptureError> {
        let guard = self.display.lock();
        let display = guard
            .as_ref()
            .ok_or_else(|| CaptureError::Device("device not open".to_string()))?
            .0;

        // SAFETY: `display` is live for as long as the guard is held.
        let (screen_w, screen_h) = unsafe { default_screen_size(display) };
        let (x, y, width, height) = clamp_region(region, screen_w, screen_h)
            .ok_or_else(|| CaptureError::Transient("capture region is off screen".to_string()))?;

        // SAFETY: the rectangle lies inside the root window (clamped above).
        // The returned image is owned by us and freed with XDestroyImage.
        let image = unsafe {
            let root = xlib::XDefaultRootWindow(display);
            xlib::XGetImage(
                display,
                root,
                x,
                y,
                width,
                height,
                xlib::XAllPlanes(),
                xlib::ZPixmap,
            )
        };
        if image.is_null() {
            return Err(CaptureError::Transient("XGetImage returned null".to_string()));
        }

        // SAFETY: `image` is non-null and stays valid until XDestroyImage.
        let result = unsafe {
            let img = &*image;
            if img.bits_per_pixel != 32 || img.data.is_null() {
                Err(CaptureError::Device(format!(
                    "unsupported X11 visual: {} bits per pixel",
                    img.bits_per_pixel
                )))
            } else {
                let stride = img.bytes_per_line.max(0) as usize;
                let len = stride * img.height.max(0) as usize;
                let data = std::slice::from_raw_parts(img.data as *const u8, len).to_vec();
                Ok(RawFrame {
                    width: img.width.max(0) as u32,
                    height: img.height.max(0) as u32,
                    stride,
                    data,
                })
            }
        };

        // SAFETY: `image` came from XGetImage and is not used after this.
        unsafe { xlib::XDestroyImage(image) };
        result
    }
}

impl Drop for X11CaptureDevice {
    fn drop(&mut self) {
        close_handle(self.display.get_mut().take());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: i32, y: i32, width: u32, height: u32) -> CaptureConfig {
        CaptureConfig {
            x,
            y,
            width,
            height,
            frame_rate: 10,
        }
    }

    #[test]
    fn test_close_while_busy_is_deferred_to_the_holder() {
        // Arrange: hold the mutex the way an in-flight grab does.
        let device = X11CaptureDevice::new();
        let guard = device.display.lock();

        // Act: must return at once instead of waiting for the guard.
        device.close();
        let pending_while_busy = device.close_pending.load(Ordering::SeqCst);
        drop(guard);
        device.finish_pending_close();

        // Assert
        assert!(pending_while_busy);
        assert!(!device.close_pending.load(Ordering::SeqCst));
    }

    /// Smoke-test: if a DISPLAY is available a grab must succeed.  Without
    /// one, opening must fail with a Device error.
    #[test]
    fn test_x11_capture_smoke() {
        let device = X11CaptureDevice::new();
        match device.open() {
            Ok(()) => {
                let frame = device.capture(&region(0, 0, 16, 16)).unwrap();
                assert_eq!((frame.width, frame.height), (16, 16));
                device.close();
            }
            Err(e) => {
                assert!(std::env::var("DISPLAY").is_err(), "open failed with DISPLAY set: {e}");
                assert!(matches!(e, CaptureError::Device(_)));
            }
        }
    }
}
