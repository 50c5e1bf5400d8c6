//! Gamepad button to Windows Virtual Key (VK) code table.
//!
//! Reference: Windows Virtual-Key Codes (winuser.h).
//!
//! # What is a Windows Virtual Key (VK) code? (for beginners)
//!
//! Windows assigns each keyboard key a number called a "Virtual Key code".
//! These are defined in `<winuser.h>` and named `VK_*` (e.g., `VK_RETURN = 0x0D`,
//! `VK_SPACE = 0x20`).  Letters use their upper-case ASCII value, so the
//! Z key is `0x5A`.  `SendInput` accepts these codes directly in
//! `KEYBDINPUT::wVk`.

use super::ButtonId;

pub const VK_RETURN: u8 = 0x0D;
pub const VK_SPACE: u8 = 0x20;
pub const VK_LEFT: u8 = 0x25;
pub const VK_UP: u8 = 0x26;
pub const VK_RIGHT: u8 = 0x27;
pub const VK_DOWN: u8 = 0x28;
pub const VK_A: u8 = 0x41;
pub const VK_Q: u8 = 0x51;
pub const VK_S: u8 = 0x53;
pub const VK_W: u8 = 0x57;
pub const VK_X: u8 = 0x58;
pub const VK_Z: u8 = 0x5A;

/// Translates a gamepad button to the Windows VK code it is bound to.
///
/// # Panics
///
/// This function never panics; every button has a binding.
pub fn button_to_vk(button: ButtonId) -> u8 {
    match button {
        ButtonId::Up => VK_UP,
        ButtonId::Down => VK_DOWN,
        ButtonId::Left => VK_LEFT,
        ButtonId::Right => VK_RIGHT,
        ButtonId::A => VK_Z,
        ButtonId::B => VK_X,
        ButtonId::Start => VK_RETURN,
        ButtonId::Select => VK_SPACE,
        ButtonId::X => VK_A,
        ButtonId::Y => VK_S,
        ButtonId::L => VK_Q,
        ButtonId::R => VK_W,
    }
}

/// Returns `true` for VK codes that `SendInput` must flag with
/// `KEYEVENTF_EXTENDEDKEY` (the navigation cluster).
pub fn is_extended_key(vk: u8) -> bool {
    matches!(vk, 0x21..=0x28 | 0x2D | 0x2E | 0x5B | 0x5C | 0xA3 | 0xA5)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
