//! Infrastructure layer for pokeremote-server.
//!
//! # Responsibilities
//!
//! - Reading and writing the TOML config file
//! - Binding the signaling listener and performing WebSocket handshakes
//! - Spawning one Tokio task per connected client
//! - Handling the graceful shutdown signal

pub mod config_file;
pub mod ws_server;

pub use config_file::{load_config, save_config};
pub use ws_server::run_server;
