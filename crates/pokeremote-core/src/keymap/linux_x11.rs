//! Gamepad button to X11 KeySym table for Linux hosts.
//!
//! X11 KeySym values are defined in X11/keysymdef.h.
//! Reference: https://gitlab.freedesktop.org/xorg/proto/xorgproto/-/blob/master/include/X11/keysymdef.h
//!
//! # What is an X11 KeySym? (for beginners)
//!
//! X11 identifies keys by **KeySym** (Key Symbol).  Letters use their ASCII
//! value and special keys live in the `0xFFxx` range:
//!
//! | KeySym name | Value  | Meaning        |
//! |-------------|--------|----------------|
//! | `XK_z`      | 0x007A | lowercase 'z'  |
//! | `XK_Return` | 0xFF0D | Enter key      |
//! | `XK_Up`     | 0xFF52 | Arrow Up       |
//!
//! Letters map to their *lowercase* KeySym; XTest applies Shift itself when a
//! modifier is down.  The injector converts a KeySym to the server's hardware
//! keycode with `XKeysymToKeycode` before faking the event.

use super::ButtonId;

pub const XK_SPACE: u32 = 0x0020;
pub const XK_A: u32 = 0x0061;
pub const XK_Q: u32 = 0x0071;
pub const XK_S: u32 = 0x0073;
pub const XK_W: u32 = 0x0077;
pub const XK_X: u32 = 0x0078;
pub const XK_Z: u32 = 0x007A;
pub const XK_RETURN: u32 = 0xFF0D;
pub const XK_LEFT: u32 = 0xFF51;
pub const XK_UP: u32 = 0xFF52;
pub const XK_RIGHT: u32 = 0xFF53;
pub const XK_DOWN: u32 = 0xFF54;

/// Translates a gamepad button to the X11 KeySym it is bound to.
///
/// # Panics
///
/// This function never panics.
pub fn button_to_keysym(button: ButtonId) -> u32 {
    match button {
        ButtonId::Up => XK_UP,
        ButtonId::Down => XK_DOWN,
        ButtonId::Left => XK_LEFT,
        ButtonId::Right => XK_RIGHT,
        ButtonId::A => XK_Z,
        ButtonId::B => XK_X,
        ButtonId::Start => XK_RETURN,
        ButtonId::Select => XK_SPACE,
        ButtonId::X => XK_A,
        ButtonId::Y => XK_S,
        ButtonId::L => XK_Q,
        ButtonId::R => XK_W,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arrow_buttons_have_correct_x11_keysyms() {
        assert_eq!(button_to_keysym(ButtonId::Left), 0xFF51);
        assert_eq!(button_to_keysym(ButtonId::Up), 0xFF52);
        assert_eq!(button_to_keysym(ButtonId::Right), 0xFF53);
        assert_eq!(button_to_keysym(ButtonId::Down), 0xFF54);
    }

    #[test]
    fn test_letter_keysyms_are_lowercase_ascii() {
        assert_eq!(button_to_keysym(ButtonId::A), u32::from(b'z'));
        assert_eq!(button_to_keysym(ButtonId::B), u32::from(b'x'));
    }

    #[test]
    fn test_start_maps_to_xk_return() {
        assert_eq!(button_to_keysym(ButtonId::Start), 0xFF0D);
    }
}
