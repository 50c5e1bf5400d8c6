//! pokeremote-host library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the `pokeremote-server` binary share the same module tree.
//!
//! # What does the host do? (for beginners)
//!
//! The *host* is the desktop machine being remote-controlled.  For every
//! client that connects it runs one *session*:
//!
//! 1. The client sends a WebRTC offer; the host answers it and the two sides
//!    swap ICE candidates until a direct connection comes up.
//! 2. Once the connection reports `Connected`, the host starts a capture loop
//!    that grabs the screen on a fixed cadence, encodes each frame to JPEG,
//!    and pushes it to the client over a data channel.
//! 3. Button presses arrive as small JSON messages (`{"type":"keydown",
//!    "key":"A"}`).  The host maps each button to a platform key code and
//!    injects a synthetic key event through the OS input API.
//! 4. When the client disconnects, or the connection fails, the session stops
//!    its capture loop, releases any keys it still holds, and closes the peer
//!    connection.
//!
//! The engine never opens a socket itself.  Whatever transport hosts it (the
//! WebSocket signaling server in `pokeremote-server`, or a test) calls the
//! methods on [`SessionHost`] and relays the [`HostEvent`]s it emits.

/// Application layer: session negotiation, capture loop, command routing.
pub mod application;

/// Infrastructure layer: OS capture/injection backends and the WebRTC adapter.
pub mod infrastructure;

pub use application::capture_loop::{
    CaptureDevice, CaptureDeviceFactory, CaptureError, CaptureLoop, CaptureStatsSnapshot,
    FrameCallback, FrameEncoder,
};
pub use application::negotiate_session::{
    HostEvent, IceAck, SessionContext, SessionError, SessionNegotiator, SessionSettings,
};
pub use application::peer_connection::{
    PeerConnection, PeerConnectionFactory, PeerError, PeerEvent, PeerEventSender,
};
pub use application::route_command::{CommandError, CommandRouter, InjectionError, InputInjector};
pub use application::session_host::SessionHost;
pub use application::session_registry::SessionRegistry;
