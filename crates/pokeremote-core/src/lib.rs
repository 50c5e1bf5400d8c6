//! # pokeremote-core
//!
//! Shared library for PokeRemote containing the session domain types, the
//! button-to-key translation tables, and the JSON wire messages exchanged with
//! the thin client.
//!
//! This crate is used by both the session engine (`pokeremote-host`) and the
//! signaling server (`pokeremote-server`).  It has zero dependencies on OS
//! APIs, async runtimes, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! PokeRemote lets a phone act as a gamepad for a desktop machine.  The phone
//! opens a WebRTC session with the host; the host streams its screen back as a
//! sequence of frames and replays the phone's button presses as synthetic
//! keyboard input.
//!
//! This crate (`pokeremote-core`) is the shared foundation.  It defines:
//!
//! - **`domain`** – Pure session vocabulary: connection identifiers, the
//!   negotiation state machine's states, capture regions and frames.
//!
//! - **`keymap`** – Translation tables that convert a logical gamepad button
//!   (`UP`, `A`, `START`, ...) into the key code the host platform's input API
//!   understands (Windows virtual-key codes, X11 KeySyms).
//!
//! - **`protocol`** – The JSON messages that travel over the data channel and
//!   the signaling socket, plus the codec that turns raw data-channel text into
//!   a typed [`ButtonCommand`].

pub mod domain;
pub mod keymap;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `pokeremote_core::ConnectionId` instead of the full module path.
pub use domain::capture::{CaptureConfig, Frame, RawFrame};
pub use domain::session::{ConnectionId, NegotiationState, PeerConnectionState};
pub use keymap::{ButtonId, KeyCode, KeyMap, KeyPlatform};
pub use protocol::codec::{decode_command, decode_command_bytes, encode_command, ProtocolError};
pub use protocol::messages::{
    ButtonCommand, ButtonIntent, CommandResponse, ControlMessage, IceCandidate, SdpKind,
    SessionDescription,
};
