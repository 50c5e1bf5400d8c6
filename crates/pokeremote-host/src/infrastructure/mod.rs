//! Infrastructure layer for the session engine.
//!
//! Contains the OS-facing adapters behind the application-layer traits.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `pokeremote_core`, but MUST NOT be imported by the `application` layer
//! (tests excepted).
//!
//! # Sub-modules
//!
//! - **`capture`** – Screen capture devices (`XGetImage` on Linux, a
//!   synthetic pattern elsewhere) and the JPEG frame encoder.
//!
//! - **`input_injection`** – OS-specific implementations of `InputInjector`.
//!   The correct implementation is selected at compile time using
//!   `#[cfg(target_os)]`.  A `RecordingInputInjector` is also provided for
//!   tests.
//!
//! - **`peer`** – The `webrtc`-crate peer connection and a scripted mock.

pub mod capture;
pub mod input_injection;
pub mod peer;
