//! Mock capture device for unit and integration tests.
//!
//! [`MockCaptureDevice`] produces solid-colour bitmaps without touching any
//! OS API and records how it was driven: how often it was opened and closed,
//! and whether it is currently open.  Tests use it to assert that a device is
//! always released, even when start and stop race each other.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use pokeremote_core::{CaptureConfig, RawFrame};

use crate::application::capture_loop::{
    CaptureDevice, CaptureDeviceFactory, CaptureError, FrameEncoder,
};

/// A capture device that records calls instead of grabbing the screen.
#[derive(Debug)]
pub struct MockCaptureDevice {
    width: u32,
    height: u32,
    open: AtomicBool,
    opens: AtomicU64,
    closes: AtomicU64,
    captures: AtomicU64,
    fail_remaining: AtomicU32,
    fail_open: AtomicBool,
    capture_delay: Mutex<Duration>,
}

impl MockCaptureDevice {
    /// Creates a closed device reporting a `width` × `height` screen.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            open: AtomicBool::new(false),
            opens: AtomicU64::new(0),
            closes: AtomicU64::new(0),
            captures: AtomicU64::new(0),
            fail_remaining: AtomicU32::new(0),
            fail_open: AtomicBool::new(false),
            capture_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Makes the next `n` captures fail with [`CaptureError::Transient`].
    pub fn fail_next(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Makes every `open` call fail with [`CaptureError::Device`].
    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Makes every capture block for `delay` before returning.
    pub fn set_capture_delay(&self, delay: Duration) {
        *self.capture_delay.lock() = delay;
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn capture_count(&self) -> u64 {
        self.captures.load(Ordering::SeqCst)
    }
}

impl CaptureDevice for MockCaptureDevice {
    fn screen_size(&self) -> Result<(u32, u32), CaptureError> {
        Ok((self.width, self.height))
    }

    fn open(&self) -> Result<(), CaptureError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(CaptureError::Device("injected open failure".to_string()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn capture(&self, region: &CaptureConfig) -> Result<RawFrame, CaptureError> {
        let delay = *self.capture_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if !self.is_open() {
            return Err(CaptureError::Device("device not open".to_string()));
        }
        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CaptureError::Transient("injected capture failure".to_string()));
        }
        self.captures.fetch_add(1, Ordering::SeqCst);
        let len = region.width as usize * region.height as usize * 4;
        Ok(RawFrame::packed(region.width, region.height, vec![0x80; len]))
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Hands out [`MockCaptureDevice`]s and keeps them for later inspection.
#[derive(Debug)]
pub struct MockCaptureFactory {
    width: u32,
    height: u32,
    fail_create: AtomicBool,
    created: Mutex<Vec<Arc<MockCaptureDevice>>>,
}

impl MockCaptureFactory {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fail_create: AtomicBool::new(false),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Makes every later `create` call fail.
    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Every device created so far, oldest first.
    pub fn devices(&self) -> Vec<Arc<MockCaptureDevice>> {
        self.created.lock().clone()
    }
}

impl CaptureDeviceFactory for MockCaptureFactory {
    fn create(&self) -> Result<Arc<dyn CaptureDevice>, CaptureError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(CaptureError::Device("injected factory failure".to_string()));
        }
        let device = Arc::new(MockCaptureDevice::new(self.width, self.height));
        self.created.lock().push(Arc::clone(&device));
        Ok(device)
    }
}

/// Encoder that forwards the raw bitmap bytes unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawPassthroughEncoder;

impl FrameEncoder for RawPassthroughEncoder {
    fn encode(&self, frame: &RawFrame) -> Result<Bytes, CaptureError> {
        Ok(Bytes::copy_from_slice(&frame.data))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
