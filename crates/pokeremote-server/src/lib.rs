//! pokeremote-server library entry point.
//!
//! The binary in `main.rs` is a thin shell over this library so integration
//! tests can start a real signaling server on an ephemeral port.
//!
//! # Architecture overview
//!
//! ```text
//! Phone / browser  (JSON over WebSocket: offer, ice-candidate, command, status)
//!       ↕
//! pokeremote-server  ← this process
//!   domain/          HostConfig (TOML), signaling message types
//!   application/     SignalingService: messages ↔ SessionHost calls
//!   infrastructure/
//!     config_file/   load/save the TOML config
//!     ws_server/     accept WebSocket connections, one task per client
//!       ↕
//! pokeremote-host   (SessionHost: WebRTC, capture, input injection)
//! ```
//!
//! Once a client's peer connection is up, video frames and button commands
//! flow over WebRTC data channels directly; the WebSocket only carries
//! negotiation, status queries, and (optionally) commands.

/// Domain layer: configuration schema and signaling message types.
pub mod domain;

/// Application layer: maps signaling messages onto the session engine.
pub mod application;

/// Infrastructure layer: config file I/O and the WebSocket server.
pub mod infrastructure;
