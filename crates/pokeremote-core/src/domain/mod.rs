//! Domain entities for PokeRemote.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain** (or "entities" layer).  Domain code:
//!
//! - Contains the core rules of the application.
//! - Has **no** imports from OS APIs, network libraries, or async runtimes.
//! - Can be compiled and tested on any platform without any external setup.
//!
//! Here the domain is the vocabulary of a remote-control session: who is
//! connected ([`session::ConnectionId`]), how far negotiation has progressed
//! ([`session::NegotiationState`]), and what part of the screen is streamed
//! ([`capture::CaptureConfig`]).

/// Screen-capture region, cadence, and frame buffers.
pub mod capture;

/// Connection identity and the negotiation state machine.
pub mod session;
