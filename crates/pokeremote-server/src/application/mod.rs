//! Application layer for pokeremote-server.
//!
//! The application layer knows *what* to do with each signaling message but
//! delegates *how* to the session engine (`pokeremote-host`) and leaves the
//! sockets to the infrastructure layer.
//!
//! # What does NOT belong here?
//!
//! - Binding listeners or reading WebSocket frames (that is infrastructure)
//! - Reading the config file (that is infrastructure too)

pub mod signaling_service;

pub use signaling_service::SignalingService;
