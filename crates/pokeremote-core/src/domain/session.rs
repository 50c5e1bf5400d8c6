//! Session identity and negotiation states.
//!
//! A session is born when a client opens a signaling connection and dies when
//! that connection closes, the peer transport fails terminally, or the host
//! drops it.  The states below describe how far the WebRTC handshake for one
//! session has progressed.
//!
//! ```text
//! New ──offer──▶ OfferReceived ──answer──▶ AnswerSent ──▶ IceExchanging
//!                                              │                │
//!                                              └────────┬───────┘
//!                                                       ▼
//!                                                   Connected
//!                                                       │
//!                                  ┌────────────────────┼───────────────┐
//!                                  ▼                    ▼               ▼
//!                            Disconnected            Failed          Closed
//! ```
//!
//! The three right-hand states are terminal: a negotiator never leaves them.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for one client transport session.
///
/// Assigned by the transport layer (the signaling server generates a UUID v4
/// per accepted socket) and never reused while a session is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Wraps an identifier handed out by the transport layer.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Progress of the offer/answer handshake for a single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationState {
    /// Session registered; no offer seen yet.
    New,
    /// Offer accepted and being applied as the remote description.
    OfferReceived,
    /// Local answer produced and returned to the caller.
    AnswerSent,
    /// The transport reported connectivity checks in progress.
    IceExchanging,
    /// The transport reported a usable connection; capture is running.
    Connected,
    /// The transport lost connectivity.  Terminal.
    Disconnected,
    /// Negotiation or the transport failed.  Terminal.
    Failed,
    /// The session was closed deliberately.  Terminal.
    Closed,
}

impl NegotiationState {
    /// Returns `true` for the states a negotiator can never leave.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }

    /// Returns `true` while ICE candidates must still be buffered because the
    /// remote description has not been applied.
    pub fn buffers_candidates(self) -> bool {
        matches!(self, Self::New | Self::OfferReceived)
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::OfferReceived => "offer_received",
            Self::AnswerSent => "answer_sent",
            Self::IceExchanging => "ice_exchanging",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Connection state as reported by the peer-connection transport.
///
/// Mirrors the W3C `RTCPeerConnectionState` values.  The negotiator maps these
/// onto [`NegotiationState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerConnectionState {
    /// The negotiation state a session enters when the transport reports
    /// `self`, or `None` when the report carries no transition.
    pub fn target_state(self) -> Option<NegotiationState> {
        match self {
            Self::New => None,
            Self::Connecting => Some(NegotiationState::IceExchanging),
            Self::Connected => Some(NegotiationState::Connected),
            Self::Disconnected => Some(NegotiationState::Disconnected),
            Self::Failed => Some(NegotiationState::Failed),
            Self::Closed => Some(NegotiationState::Closed),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
