//! Application layer use cases for the session engine.
//!
//! # What use cases does the host have?
//!
//! - **`route_command`** – Decodes one inbound control message, maps its
//!   button through the [`KeyMap`](pokeremote_core::KeyMap), and calls the
//!   injected [`InputInjector`](route_command::InputInjector).
//!
//! - **`capture_loop`** – Grabs frames from a capture device on a fixed
//!   cadence and hands each one to a callback without ever blocking on it.
//!
//! - **`peer_connection`** – The peer-connection capability the negotiator
//!   drives, plus the typed events a backend reports.
//!
//! - **`negotiate_session`** – The per-connection state machine: offer,
//!   answer, candidate buffering, and capture start/stop on `Connected`.
//!
//! - **`session_registry`** – The concurrent map of live sessions.
//!
//! - **`session_host`** – The facade the transport calls, keyed by
//!   connection id.
//!
//! Nothing here touches an OS API directly; every side effect goes through a
//! trait implemented in the infrastructure layer.

pub mod capture_loop;
pub mod negotiate_session;
pub mod peer_connection;
pub mod route_command;
pub mod session_host;
pub mod session_registry;
