//! Windows input injection via the SendInput API.
//!
//! Key codes from the key map are Windows Virtual Key codes already, so they
//! go straight into `KEYBDINPUT::wVk`.  Keys in the navigation cluster (the
//! arrow keys among them) must carry `KEYEVENTF_EXTENDEDKEY`, otherwise some
//! applications read them as numeric-keypad arrows.

#![cfg(target_os = "windows")]

use pokeremote_core::keymap::windows_vk::is_extended_key;
use pokeremote_core::KeyCode;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_EXTENDEDKEY, KEYEVENTF_KEYUP, VIRTUAL_KEY,
};

use crate::application::route_command::{InjectionError, InputInjector};

/// Windows implementation of [`InputInjector`] using SendInput.
pub struct SendInputInjector;

impl SendInputInjector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SendInputInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl InputInjector for SendInputInjector {
    fn send_down(&self, code: KeyCode) -> Result<(), InjectionError> {
        send_key(to_vk(code)?, false)
    }

    fn send_up(&self, code: KeyCode) -> Result<(), InjectionError> {
        send_key(to_vk(code)?, true)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn to_vk(code: KeyCode) -> Result<u8, InjectionError> {
    u8::try_from(code.0).map_err(|_| InjectionError::UnsupportedKey(code))
}

fn key_flags(vk: u8, key_up: bool) -> KEYBD_EVENT_FLAGS {
    let mut flags = KEYBD_EVENT_FLAGS(0);
    if key_up {
        flags |= KEYEVENTF_KEYUP;
    }
    if is_extended_key(vk) {
        flags |= KEYEVENTF_EXTENDEDKEY;
    }
    flags
}

fn send_key(vk: u8, key_up: bool) -> Result<(), InjectionError> {
    let input = INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(vk as u16),
                wScan: 0,
                dwFlags: key_flags(vk, key_up),
                time: 0,
                dwExtraInfo: 0,
            },
        },
    };
    // SAFETY: input is a valid KEYBDINPUT structure on the stack
    let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
    if sent == 0 {
        // Blocked by UIPI or another process holding the input desktop.
        return Err(InjectionError::Platform(format!(
            "SendInput rejected vk {vk:#04x}: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}
