//! Recording input injector for tests.
//!
//! # Why a recording injector?
//!
//! The real injectors press keys on whatever machine runs the tests.  The
//! `RecordingInputInjector` replaces every OS call with an in-memory record
//! so assertions can check exactly which events were emitted and in what
//! order.
//!
//! Set [`RecordingInputInjector::set_failing`] to simulate the OS rejecting
//! events.

use parking_lot::Mutex;
use pokeremote_core::KeyCode;

use crate::application::route_command::{InjectionError, InputInjector};

/// One recorded key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedKey {
    Down(KeyCode),
    Up(KeyCode),
}

/// An injector that records all calls without touching the OS.
#[derive(Default)]
pub struct RecordingInputInjector {
    events: Mutex<Vec<InjectedKey>>,
    failing: Mutex<bool>,
}

impl RecordingInputInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// When `true`, every call fails with [`InjectionError::Platform`].
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// All events recorded so far, oldest first.
    pub fn events(&self) -> Vec<InjectedKey> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn record(&self, event: InjectedKey) -> Result<(), InjectionError> {
        if *self.failing.lock() {
            return Err(InjectionError::Platform("mock failure".into()));
        }
        self.events.lock().push(event);
        Ok(())
    }
}

impl InputInjector for RecordingInputInjector {
    fn send_down(&self, code: KeyCode) -> Result<(), InjectionError> {
        self.record(InjectedKey::Down(code))
    }

    fn send_up(&self, code: KeyCode) -> Result<(), InjectionError> {
        self.record(InjectedKey::Up(code))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
