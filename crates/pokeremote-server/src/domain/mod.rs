//! Domain layer for pokeremote-server.
//!
//! Pure types with no I/O: the configuration schema and the JSON messages
//! exchanged with clients over the signaling socket.

pub mod config;
pub mod messages;

pub use config::{ConfigError, HostConfig};
pub use messages::{ClientMessage, ServerMessage};
