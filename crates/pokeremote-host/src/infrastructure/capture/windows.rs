//! Windows screen capture via GDI.
//!
//! Each grab copies the configured region of the desktop into a memory bitmap
//! with `BitBlt`, then reads it back with `GetDIBits` as a 32-bit top-down
//! bitmap, which is the BGRA layout the rest of the pipeline expects.
//!
//! # Handle lifetime (for beginners)
//!
//! Every GDI handle (screen DC, memory DC, bitmap) is created and released
//! inside a single `capture` call.  The device keeps no OS state between
//! ticks, so `open` and `close` only flip a flag and `close` never has to wait
//! for a grab in flight.

use std::sync::atomic::{AtomicBool, Ordering};

use pokeremote_core::{CaptureConfig, RawFrame};
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, HBITMAP, HDC,
    SRCCOPY,
};
use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

use super::clamp_region;
use crate::application::capture_loop::{CaptureDevice, CaptureError};

/// GDI implementation of [`CaptureDevice`] for the primary monitor.
#[derive(Debug, Default)]
pub struct GdiCaptureDevice {
    open: AtomicBool,
}

impl GdiCaptureDevice {
    pub fn new() -> Self {
        Self::default()
    }
}

fn primary_screen_size() -> (u32, u32) {
    // SAFETY: GetSystemMetrics has no preconditions.
    unsafe {
        (
            GetSystemMetrics(SM_CXSCREEN).max(0) as u32,
            GetSystemMetrics(SM_CYSCREEN).max(0) as u32,
        )
    }
}

impl CaptureDevice for GdiCaptureDevice {
    fn screen_size(&self) -> Result<(u32, u32), CaptureError> {
        match primary_screen_size() {
            (0, _) | (_, 0) => Err(CaptureError::Device(
                "no primary monitor (GetSystemMetrics returned 0)".to_string(),
            )),
            size => Ok(size),
        }
    }

    fn open(&self) -> Result<(), CaptureError> {
        self.screen_size()?;
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn capture(&self, region: &CaptureConfig) -> Result<RawFrame, CaptureError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(CaptureError::Device("device not open".to_string()));
        }
        let (screen_w, screen_h) = primary_screen_size();
        let (x, y, width, height) = clamp_region(region, screen_w, screen_h)
            .ok_or_else(|| CaptureError::Transient("capture region is off screen".to_string()))?;

        // SAFETY: every handle created here is released before returning, and
        // `blit` checks them for null before use.
        unsafe {
            let screen = GetDC(HWND::default());
            if screen.0.is_null() {
                return Err(CaptureError::Transient("GetDC failed".to_string()));
            }
            let memory = CreateCompatibleDC(screen);
            let bitmap = CreateCompatibleBitmap(screen, width as i32, height as i32);

            let result = blit(screen, memory, bitmap, x, y, width, height);

            if !bitmap.0.is_null() {
                let _ = DeleteObject(bitmap);
            }
            if !memory.0.is_null() {
                let _ = DeleteDC(memory);
            }
            ReleaseDC(HWND::default(), screen);
            result
        }
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Copies `width` × `height` pixels at (`x`, `y`) of `screen` into `bitmap`
/// and reads them back as BGRA.
///
/// # Safety
///
/// `screen` must be a live screen DC.  `memory` and `bitmap` may be null, in
/// which case the grab fails.
unsafe fn blit(
    screen: HDC,
    memory: HDC,
    bitmap: HBITMAP,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
) -> Result<RawFrame, CaptureError> {
    if memory.0.is_null() || bitmap.0.is_null() {
        return Err(CaptureError::Transient(
            "could not allocate a GDI bitmap".to_string(),
        ));
    }

    let previous = SelectObject(memory, bitmap);
    let copied = BitBlt(
        memory,
        0,
        0,
        width as i32,
        height as i32,
        screen,
        x,
        y,
        SRCCOPY,
    );
    // GetDIBits needs the bitmap deselected.
    SelectObject(memory, previous);
    copied.map_err(|e| CaptureError::Transient(format!("BitBlt failed: {e}")))?;

    let mut info = BITMAPINFO {
        bmiHeader: BITMAPINFOHEADER {
            biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: width as i32,
            // Negative height asks for a top-down bitmap.
            biHeight: -(height as i32),
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0,
            ..Default::default()
        },
        ..Default::default()
    };
    let stride = width as usize * 4;
    let mut data = vec![0u8; stride * height as usize];
    let lines = GetDIBits(
        memory,
        bitmap,
        0,
        height,
        Some(data.as_mut_ptr().cast()),
        &mut info,
        DIB_RGB_COLORS,
    );
    if lines != height as i32 {
        return Err(CaptureError::Transient(format!(
            "GetDIBits copied {lines} of {height} rows"
        )));
    }

    Ok(RawFrame {
        width,
        height,
        stride,
        data,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
