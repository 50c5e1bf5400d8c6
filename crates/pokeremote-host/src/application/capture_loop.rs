//! CaptureLoop: grabs the screen on a fixed cadence and hands out frames.
//!
//! # How the loop runs (for beginners)
//!
//! Screen grabbing APIs are blocking C calls, so the loop runs on its own
//! dedicated OS thread rather than on the async runtime.  Each tick it:
//!
//! 1. Asks the [`CaptureDevice`] for a raw BGRA bitmap of the configured region.
//! 2. Encodes it through the [`FrameEncoder`] (JPEG for the native devices).
//! 3. Calls the frame callback with a fresh [`Frame`].
//! 4. Sleeps for the rest of the frame interval, waking early if asked to stop.
//!
//! The sleep in step 4 is a `recv_timeout` on a stop channel, so `stop()`
//! interrupts the wait immediately instead of waiting out a full interval.
//!
//! # Stopping
//!
//! [`CaptureLoop::stop`] waits for the thread to acknowledge, but only up to
//! the configured bound (one second by default).  A thread that is still
//! inside a blocking grab at the deadline is abandoned: `stop` returns on
//! time, and the thread closes the device itself the moment the grab
//! returns.  It never delivers another frame, and `start` refuses to open the
//! device again until that thread has exited.
//!
//! # Frame delivery
//!
//! The callback runs on the capture thread.  It must return quickly; the
//! session engine's callback only publishes the frame into a "latest value
//! wins" slot, so a slow network never delays the next tick.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use pokeremote_core::{CaptureConfig, Frame, RawFrame};
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

/// Error type for capture operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CaptureError {
    /// A single grab or encode failed; the next tick may succeed.
    #[error("transient capture failure: {0}")]
    Transient(String),
    /// The device cannot be used at all (no display, permission denied, ...).
    #[error("capture device error: {0}")]
    Device(String),
}

/// The host's screen-grabbing facility.
///
/// `open` and `close` bracket one running loop and may be called again for a
/// later run.  `close` must be safe to call while a `capture` call is in
/// flight on another thread, and must be idempotent.
pub trait CaptureDevice: Send + Sync {
    /// Size of the primary screen in pixels.
    fn screen_size(&self) -> Result<(u32, u32), CaptureError>;

    /// Acquires the OS resources needed for `capture`.
    fn open(&self) -> Result<(), CaptureError>;

    /// Grabs the pixels of `region` as a BGRA bitmap.
    fn capture(&self, region: &CaptureConfig) -> Result<RawFrame, CaptureError>;

    /// Releases the OS resources acquired by `open`.
    fn close(&self);
}

/// Produces a fresh capture device for one session.
pub trait CaptureDeviceFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn CaptureDevice>, CaptureError>;
}

/// Compresses a raw bitmap into the bytes sent to the client.
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, frame: &RawFrame) -> Result<Bytes, CaptureError>;
}

/// Consumer of produced frames.  Called on the capture thread.
pub type FrameCallback = Arc<dyn Fn(Frame) + Send + Sync>;

/// Counters describing a loop's lifetime output.
#[derive(Debug, Default)]
pub struct CaptureStats {
    frames_delivered: AtomicU64,
    transient_failures: AtomicU64,
    starts: AtomicU64,
}

/// Point-in-time copy of [`CaptureStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureStatsSnapshot {
    pub frames_delivered: u64,
    pub transient_failures: u64,
    pub starts: u64,
}

impl CaptureStats {
    pub fn snapshot(&self) -> CaptureStatsSnapshot {
        CaptureStatsSnapshot {
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            transient_failures: self.transient_failures.load(Ordering::Relaxed),
            starts: self.starts.load(Ordering::Relaxed),
        }
    }
}

/// Handshake between a loop's owner and its capture thread.
///
/// Whoever finishes last closes the device: the thread when the owner gave up
/// waiting for it, the owner otherwise.  `exit` moves out of `RUNNING` exactly
/// once, so the device is closed exactly once per run.
#[derive(Debug, Default)]
struct RunControl {
    /// Set by the owner; once set the thread delivers no more frames.
    stopped: AtomicBool,
    exit: AtomicU8,
    /// Set by the thread after it has closed the device (or left it to the owner).
    finished: AtomicBool,
}

const RUNNING: u8 = 0;
const EXITED: u8 = 1;
const HANDED_OFF: u8 = 2;

impl RunControl {
    /// Thread side.  Returns `true` if the owner handed the close over.
    fn thread_exiting(&self) -> bool {
        self.exit
            .compare_exchange(RUNNING, EXITED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
    }

    /// Owner side.  Returns `true` if the thread will close the device.
    fn hand_off_close(&self) -> bool {
        self.exit
            .compare_exchange(RUNNING, HANDED_OFF, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

struct RunningLoop {
    stop_tx: mpsc::Sender<()>,
    done_rx: oneshot::Receiver<()>,
    control: Arc<RunControl>,
}

#[derive(Default)]
struct LoopState {
    active: Option<RunningLoop>,
    /// A thread that missed its stop deadline and still owns the device.
    abandoned: Option<Arc<RunControl>>,
}

/// Periodic screen capture feeding a single frame callback.
pub struct CaptureLoop {
    device: Arc<dyn CaptureDevice>,
    encoder: Arc<dyn FrameEncoder>,
    config: CaptureConfig,
    stop_timeout: Duration,
    on_frame: FrameCallback,
    stats: Arc<CaptureStats>,
    // Held across the whole of start/stop so the two never interleave.
    state: Mutex<LoopState>,
    is_running: AtomicBool,
}

impl CaptureLoop {
    /// Builds a loop over `device`, resolving a full-screen region to the
    /// device's current screen size.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError`] if the region is full-screen and the screen
    /// size cannot be queried.
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        encoder: Arc<dyn FrameEncoder>,
        config: CaptureConfig,
        stop_timeout: Duration,
        on_frame: FrameCallback,
    ) -> Result<Self, CaptureError> {
        let config = if config.is_full_screen() {
            let (w, h) = device.screen_size()?;
            config.resolve(w, h)
        } else {
            config
        };

        Ok(Self {
            device,
            encoder,
            config,
            stop_timeout,
            on_frame,
            stats: Arc::new(CaptureStats::default()),
            state: Mutex::new(LoopState::default()),
            is_running: AtomicBool::new(false),
        })
    }

    /// The resolved capture region and cadence.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> CaptureStatsSnapshot {
        self.stats.snapshot()
    }

    /// Opens the device and spawns the capture thread.  No-op if running.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Device`] if the device cannot be opened, the
    /// thread cannot be spawned, or the thread of a previous run missed its
    /// stop deadline and has not exited yet.
    pub async fn start(&self) -> Result<(), CaptureError> {
        let mut state = self.state.lock().await;
        if state.active.is_some() {
            return Ok(());
        }
        if let Some(previous) = &state.abandoned {
            if !previous.finished.load(Ordering::Acquire) {
                return Err(CaptureError::Device(
                    "previous capture thread has not exited yet".to_string(),
                ));
            }
        }
        state.abandoned = None;

        self.device.open()?;

        let (stop_tx, stop_rx) = mpsc::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let control = Arc::new(RunControl::default());
        let worker = Worker {
            device: Arc::clone(&self.device),
            encoder: Arc::clone(&self.encoder),
            config: self.config,
            interval: self.config.frame_interval(),
            on_frame: Arc::clone(&self.on_frame),
            stats: Arc::clone(&self.stats),
            control: Arc::clone(&control),
        };

        let spawned = std::thread::Builder::new()
            .name("pokeremote-capture".to_string())
            .spawn(move || {
                worker.run(stop_rx);
                let _ = done_tx.send(());
            });

        if let Err(e) = spawned {
            self.device.close();
            return Err(CaptureError::Device(format!("failed to spawn capture thread: {e}")));
        }

        self.stats.starts.fetch_add(1, Ordering::Relaxed);
        state.active = Some(RunningLoop {
            stop_tx,
            done_rx,
            control,
        });
        self.is_running.store(true, Ordering::Release);
        info!(
            width = self.config.width,
            height = self.config.height,
            fps = self.config.frame_rate,
            "capture loop started"
        );
        Ok(())
    }

    /// Stops the capture thread and releases the device.  No-op if not running.
    ///
    /// Returns within the configured stop timeout.  No frame is delivered
    /// once this returns.  A thread still stuck in a grab at the deadline is
    /// abandoned and closes the device itself as soon as the grab returns.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let Some(mut run) = state.active.take() else {
            return;
        };

        run.control.stopped.store(true, Ordering::Release);
        // A send error means the thread already exited.
        let _ = run.stop_tx.send(());
        let finished = tokio::time::timeout(self.stop_timeout, &mut run.done_rx)
            .await
            .is_ok();

        if finished || !run.control.hand_off_close() {
            self.device.close();
            debug!("capture thread finished");
        } else {
            warn!(
                timeout = ?self.stop_timeout,
                "capture thread did not stop in time; it releases the device when its grab returns"
            );
            state.abandoned = Some(run.control);
        }

        self.is_running.store(false, Ordering::Release);
        info!("capture loop stopped");
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        if let Some(run) = self.state.get_mut().active.take() {
            run.control.stopped.store(true, Ordering::Release);
            let _ = run.stop_tx.send(());
            if !run.control.hand_off_close() {
                self.device.close();
            }
        }
    }
}

/// State moved onto the capture thread.
struct Worker {
    device: Arc<dyn CaptureDevice>,
    encoder: Arc<dyn FrameEncoder>,
    config: CaptureConfig,
    interval: Duration,
    on_frame: FrameCallback,
    stats: Arc<CaptureStats>,
    control: Arc<RunControl>,
}

impl Worker {
    fn run(self, stop_rx: mpsc::Receiver<()>) {
        let mut sequence = 0u64;
        loop {
            let tick = Instant::now();

            match self.grab(sequence) {
                Ok(frame) => {
                    sequence += 1;
                    if self.control.stopped.load(Ordering::Acquire) {
                        break;
                    }
                    self.stats.frames_delivered.fetch_add(1, Ordering::Relaxed);
                    (self.on_frame)(frame);
                }
                Err(e) => {
                    self.stats.transient_failures.fetch_add(1, Ordering::Relaxed);
                    debug!(error = %e, "capture tick failed");
                }
            }

            let wait = self.interval.saturating_sub(tick.elapsed());
            match stop_rx.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if self.control.thread_exiting() {
            self.device.close();
            debug!("late capture thread released the device");
        }
        self.control.finished.store(true, Ordering::Release);
    }

    fn grab(&self, sequence: u64) -> Result<Frame, CaptureError> {
        let raw = self.device.capture(&self.config)?;
        let data = self.encoder.encode(&raw)?;
        Ok(Frame {
            width: raw.width,
            height: raw.height,
            sequence,
            data,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::capture::mock::{MockCaptureDevice, RawPassthroughEncoder};

    fn make_loop(
        device: Arc<MockCaptureDevice>,
        fps: u32,
    ) -> (CaptureLoop, Arc<parking_lot::Mutex<Vec<Frame>>>) {
        let frames = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        let cl = CaptureLoop::new(
            device,
            Arc::new(RawPassthroughEncoder),
            CaptureConfig {
                frame_rate: fps,
                ..Default::default()
            },
            Duration::from_secs(1),
            Arc::new(move |f| sink.lock().push(f)),
        )
        .unwrap();
        (cl, frames)
    }

    #[test]
    fn test_new_resolves_full_screen_region() {
        let device = Arc::new(MockCaptureDevice::new(800, 600));
        let (cl, _) = make_loop(device, 10);
        assert_eq!((cl.config().width, cl.config().height), (800, 600));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_produces_frames_with_increasing_sequence() {
        // Arrange
        let device = Arc::new(MockCaptureDevice::new(4, 4));
        let (cl, frames) = make_loop(Arc::clone(&device), 100);

        // Act
        cl.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        cl.stop().await;

        // Assert
        let frames = frames.lock();
        assert!(frames.len() >= 2, "expected several frames, got {}", frames.len());
        for (i, f) in frames.iter().enumerate() {
            assert_eq!(f.sequence, i as u64);
        }
        assert_eq!(cl.stats().frames_delivered, frames.len() as u64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_twice_opens_device_once() {
        let device = Arc::new(MockCaptureDevice::new(4, 4));
        let (cl, _) = make_loop(Arc::clone(&device), 10);

        cl.start().await.unwrap();
        cl.start().await.unwrap();

        assert_eq!(device.open_count(), 1);
        assert_eq!(cl.stats().starts, 1);
        cl.stop().await;
    }

    #[tokio::test]
    async fn test_stop_when_not_running_is_noop() {
        let device = Arc::new(MockCaptureDevice::new(4, 4));
        let (cl, _) = make_loop(Arc::clone(&device), 10);

        cl.stop().await;

        assert_eq!(device.close_count(), 0);
        assert!(!cl.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_closes_device() {
        let device = Arc::new(MockCaptureDevice::new(4, 4));
        let (cl, _) = make_loop(Arc::clone(&device), 10);

        cl.start().await.unwrap();
        cl.stop().await;

        assert!(!device.is_open());
        assert!(!cl.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_transient_failures_do_not_stop_the_loop() {
        // Arrange
        let device = Arc::new(MockCaptureDevice::new(4, 4));
        device.fail_next(3);
        let (cl, frames) = make_loop(Arc::clone(&device), 200);

        // Act
        cl.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        cl.stop().await;

        // Assert
        assert_eq!(cl.stats().transient_failures, 3);
        assert!(!frames.lock().is_empty());
    }

    /// Device whose `capture` and `close` contend for one lock, like a
    /// native backend that serialises every call on its display handle.
    struct SharedLockDevice {
        open: parking_lot::Mutex<bool>,
        capture_time: Duration,
        closes: AtomicU64,
    }

    impl SharedLockDevice {
        fn new(capture_time: Duration) -> Self {
            Self {
                open: parking_lot::Mutex::new(false),
                capture_time,
                closes: AtomicU64::new(0),
            }
        }

        fn is_open(&self) -> bool {
            *self.open.lock()
        }
    }

    impl CaptureDevice for SharedLockDevice {
        fn screen_size(&self) -> Result<(u32, u32), CaptureError> {
            Ok((4, 4))
        }

        fn open(&self) -> Result<(), CaptureError> {
            *self.open.lock() = true;
            Ok(())
        }

        fn capture(&self, region: &CaptureConfig) -> Result<RawFrame, CaptureError> {
            let _guard = self.open.lock();
            std::thread::sleep(self.capture_time);
            let len = region.width as usize * region.height as usize * 4;
            Ok(RawFrame::packed(region.width, region.height, vec![0; len]))
        }

        fn close(&self) {
            *self.open.lock() = false;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn hanging_loop(
        device: Arc<dyn CaptureDevice>,
    ) -> (CaptureLoop, Arc<parking_lot::Mutex<Vec<Frame>>>) {
        let frames = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        let cl = CaptureLoop::new(
            device,
            Arc::new(RawPassthroughEncoder),
            CaptureConfig::default(),
            Duration::from_millis(50),
            Arc::new(move |f| sink.lock().push(f)),
        )
        .unwrap();
        (cl, frames)
    }

    async fn wait_until(what: &str, cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(3);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_is_bounded_when_capture_hangs() {
        // Arrange
        let device = Arc::new(MockCaptureDevice::new(4, 4));
        device.set_capture_delay(Duration::from_millis(800));
        let (cl, _) = hanging_loop(Arc::clone(&device) as Arc<dyn CaptureDevice>);
        cl.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Act
        let began = Instant::now();
        cl.stop().await;

        // Assert: stop returns on time; the device is released once the grab ends.
        assert!(began.elapsed() < Duration::from_millis(500));
        assert!(!cl.is_running());
        wait_until("device released", || !device.is_open()).await;
        assert_eq!(device.close_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_is_bounded_when_close_shares_the_capture_lock() {
        // Arrange
        let device = Arc::new(SharedLockDevice::new(Duration::from_millis(1500)));
        let (cl, _) = hanging_loop(Arc::clone(&device) as Arc<dyn CaptureDevice>);
        cl.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Act
        let began = Instant::now();
        cl.stop().await;

        // Assert
        assert!(
            began.elapsed() < Duration::from_millis(500),
            "stop took {:?}",
            began.elapsed()
        );
        wait_until("device released", || !device.is_open()).await;
        assert_eq!(device.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_late_thread_delivers_no_frame_after_stop() {
        // Arrange
        let device = Arc::new(MockCaptureDevice::new(4, 4));
        device.set_capture_delay(Duration::from_millis(300));
        let (cl, frames) = hanging_loop(Arc::clone(&device) as Arc<dyn CaptureDevice>);
        cl.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Act
        cl.stop().await;
        let at_stop = frames.lock().len();
        wait_until("device released", || !device.is_open()).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Assert
        assert_eq!(frames.lock().len(), at_stop);
        assert_eq!(cl.stats().frames_delivered, at_stop as u64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_waits_for_abandoned_thread_to_exit() {
        // Arrange
        let device = Arc::new(MockCaptureDevice::new(4, 4));
        device.set_capture_delay(Duration::from_millis(300));
        let (cl, _) = hanging_loop(Arc::clone(&device) as Arc<dyn CaptureDevice>);
        cl.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cl.stop().await;

        // Act
        let early = cl.start().await;
        wait_until("device released", || !device.is_open()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let later = cl.start().await;

        // Assert
        assert!(matches!(early, Err(CaptureError::Device(_))));
        assert!(later.is_ok());
        assert_eq!(device.open_count(), 2);
        device.set_capture_delay(Duration::ZERO);
        cl.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drop_closes_running_device() {
        let device = Arc::new(MockCaptureDevice::new(4, 4));
        {
            let (cl, _) = make_loop(Arc::clone(&device), 10);
            cl.start().await.unwrap();
        }
        wait_until("device released", || !device.is_open()).await;
        assert_eq!(device.close_count(), 1);
    }
}
