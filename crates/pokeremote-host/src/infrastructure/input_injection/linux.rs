//! Linux X11 input injection via the XTest extension.
//!
//! # What is XTest? (for beginners)
//!
//! XTest is an X11 protocol extension that lets a process synthesize keyboard
//! events as if the user had pressed a physical key.  The events reach the
//! focused window exactly like real input.
//!
//! # Key code translation
//!
//! The key map produces X11 *KeySyms* (`XK_Return` = 0xFF0D and so on), but
//! `XTestFakeKeyEvent` takes a server *keycode*.  The conversion is:
//! ```text
//! KeySym → XKeysymToKeycode(display, keysym) → X11 keycode
//! ```
//! A KeySym with no keycode in the current layout yields 0, reported as
//! [`InjectionError::UnsupportedKey`].
//!
//! # Permissions
//!
//! XTest needs access to the X display named by `DISPLAY`.  If it is unset or
//! unreachable the constructor fails with a `Platform` error.

use std::os::raw::c_ulong;

use parking_lot::Mutex;
use pokeremote_core::KeyCode;
use x11::{xlib, xtest};

use crate::application::route_command::{InjectionError, InputInjector};

/// `CurrentTime`: let the server stamp the synthesized event.
const CURRENT_TIME: c_ulong = 0;

struct DisplayHandle(*mut xlib::Display);

// SAFETY: the pointer is only used while holding the injector mutex.
unsafe impl Send for DisplayHandle {}

/// Linux X11/XTest input injector.
pub struct XTestInjector {
    display: Mutex<DisplayHandle>,
}

impl XTestInjector {
    /// Connects to the X display.
    ///
    /// # Errors
    ///
    /// Returns [`InjectionError::Platform`] if the X display cannot be opened.
    pub fn new() -> Result<Self, InjectionError> {
        // SAFETY: a null name makes Xlib use $DISPLAY.
        let display = unsafe { xlib::XOpenDisplay(std::ptr::null()) };
        if display.is_null() {
            return Err(InjectionError::Platform(
                "cannot open X display (is DISPLAY set?)".to_string(),
            ));
        }
        Ok(Self {
            display: Mutex::new(DisplayHandle(display)),
        })
    }

    fn fake_key(&self, code: KeyCode, is_press: bool) -> Result<(), InjectionError> {
        let guard = self.display.lock();
        let display = guard.0;

        // SAFETY: `display` stays open for the injector's lifetime and the
        // mutex keeps calls on it serialised.
        unsafe {
            let keycode = xlib::XKeysymToKeycode(display, c_ulong::from(code.0));
            if keycode == 0 {
                return Err(InjectionError::UnsupportedKey(code));
            }
            let is_press = if is_press { xlib::True } else { xlib::False };
            if xtest::XTestFakeKeyEvent(display, u32::from(keycode), is_press, CURRENT_TIME) == 0 {
                return Err(InjectionError::Platform(
                    "XTestFakeKeyEvent failed".to_string(),
                ));
            }
            xlib::XFlush(display);
        }
        Ok(())
    }
}

impl InputInjector for XTestInjector {
    fn send_down(&self, code: KeyCode) -> Result<(), InjectionError> {
        self.fake_key(code, true)
    }

    fn send_up(&self, code: KeyCode) -> Result<(), InjectionError> {
        self.fake_key(code, false)
    }
}

impl Drop for XTestInjector {
    fn drop(&mut self) {
        // SAFETY: opened in `new` and not used after this point.
        unsafe { xlib::XCloseDisplay(self.display.get_mut().0) };
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
