//! Gamepad button to platform key code translation.
//!
//! The thin client sends logical button names (`"UP"`, `"A"`, `"START"`, ...).
//! The host replays each press as a keyboard event, so every button needs a
//! platform key code.  The canonical representation on the wire is the button
//! name; platform codes are looked up at the injection boundary.
//!
//! # Default layout
//!
//! | Button   | Keyboard key | Windows VK | X11 KeySym   |
//! |----------|--------------|------------|--------------|
//! | `UP`     | Arrow Up     | `0x26`     | `XK_Up`      |
//! | `DOWN`   | Arrow Down   | `0x28`     | `XK_Down`    |
//! | `LEFT`   | Arrow Left   | `0x25`     | `XK_Left`    |
//! | `RIGHT`  | Arrow Right  | `0x27`     | `XK_Right`   |
//! | `A`      | Z            | `0x5A`     | `XK_z`       |
//! | `B`      | X            | `0x58`     | `XK_x`       |
//! | `START`  | Enter        | `0x0D`     | `XK_Return`  |
//! | `SELECT` | Space        | `0x20`     | `XK_space`   |
//!
//! This matches the default keyboard bindings of the common handheld
//! emulators, so a game running on the host reacts without reconfiguration.
//!
//! The optional extension buttons (`X`, `Y`, `L`, `R`) are only resolved when
//! the key map is built with extensions enabled.

pub mod linux_x11;
pub mod windows_vk;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A logical gamepad button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ButtonId {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    Start,
    Select,
    // Vendor extensions
    X,
    Y,
    L,
    R,
}

impl ButtonId {
    /// The eight buttons every key map resolves.
    pub const STANDARD: [ButtonId; 8] = [
        ButtonId::Up,
        ButtonId::Down,
        ButtonId::Left,
        ButtonId::Right,
        ButtonId::A,
        ButtonId::B,
        ButtonId::Start,
        ButtonId::Select,
    ];

    /// Buttons that only resolve when extensions are enabled.
    pub const EXTENSIONS: [ButtonId; 4] = [ButtonId::X, ButtonId::Y, ButtonId::L, ButtonId::R];

    /// Canonical upper-case name, as used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            ButtonId::Up => "UP",
            ButtonId::Down => "DOWN",
            ButtonId::Left => "LEFT",
            ButtonId::Right => "RIGHT",
            ButtonId::A => "A",
            ButtonId::B => "B",
            ButtonId::Start => "START",
            ButtonId::Select => "SELECT",
            ButtonId::X => "X",
            ButtonId::Y => "Y",
            ButtonId::L => "L",
            ButtonId::R => "R",
        }
    }

    /// Returns `true` for the optional vendor-extension buttons.
    pub fn is_extension(self) -> bool {
        Self::EXTENSIONS.contains(&self)
    }

    /// Parses a button name, ignoring ASCII case and surrounding whitespace.
    ///
    /// Returns `None` for names outside the known set.
    pub fn parse(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        Self::STANDARD
            .iter()
            .chain(Self::EXTENSIONS.iter())
            .copied()
            .find(|b| b.as_str() == upper)
    }
}

impl fmt::Display for ButtonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by [`ButtonId::from_str`] for unrecognised names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownButtonName(pub String);

impl fmt::Display for UnknownButtonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown button: {}", self.0)
    }
}

impl std::error::Error for UnknownButtonName {}

impl FromStr for ButtonId {
    type Err = UnknownButtonName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownButtonName(s.to_string()))
    }
}

/// A platform key code: a Windows virtual-key code or an X11 KeySym,
/// depending on the [`KeyPlatform`] the map was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyCode(pub u32);

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Which key-code namespace a [`KeyMap`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyPlatform {
    /// Windows virtual-key codes (`VK_*`), consumed by `SendInput`.
    WindowsVk,
    /// X11 KeySyms (`XK_*`), consumed by XTest after `XKeysymToKeycode`.
    X11KeySym,
}

impl KeyPlatform {
    /// The namespace the current build's native injector understands.
    pub fn native() -> Self {
        if cfg!(target_os = "windows") {
            KeyPlatform::WindowsVk
        } else {
            KeyPlatform::X11KeySym
        }
    }
}

/// Immutable button → key code mapping for one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMap {
    platform: KeyPlatform,
    extensions: bool,
}

impl KeyMap {
    /// The standard eight-button map for `platform`.
    pub fn standard(platform: KeyPlatform) -> Self {
        Self {
            platform,
            extensions: false,
        }
    }

    /// The standard map plus the `X`/`Y`/`L`/`R` extension buttons.
    pub fn with_extensions(platform: KeyPlatform) -> Self {
        Self {
            platform,
            extensions: true,
        }
    }

    /// The standard map for the native platform.
    pub fn native() -> Self {
        Self::standard(KeyPlatform::native())
    }

    pub fn platform(&self) -> KeyPlatform {
        self.platform
    }

    pub fn extensions_enabled(&self) -> bool {
        self.extensions
    }

    /// Returns the key code for `button`, or `None` if the button is an
    /// extension and extensions are disabled.
    pub fn code_for(&self, button: ButtonId) -> Option<KeyCode> {
        if button.is_extension() && !self.extensions {
            return None;
        }
        let code = match self.platform {
            KeyPlatform::WindowsVk => u32::from(windows_vk::button_to_vk(button)),
            KeyPlatform::X11KeySym => linux_x11::button_to_keysym(button),
        };
        Some(KeyCode(code))
    }

    /// Resolves a raw, case-insensitive button name straight to a key code.
    pub fn lookup(&self, name: &str) -> Option<(ButtonId, KeyCode)> {
        let button = ButtonId::parse(name)?;
        self.code_for(button).map(|code| (button, code))
    }

    /// Iterates over every button this map resolves, in table order.
    pub fn entries(&self) -> impl Iterator<Item = (ButtonId, KeyCode)> + '_ {
        ButtonId::STANDARD
            .iter()
            .chain(ButtonId::EXTENSIONS.iter())
            .filter_map(move |&b| self.code_for(b).map(|c| (b, c)))
    }
}

impl Default for KeyMap {
    fn default() -> Self {
        Self::native()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
