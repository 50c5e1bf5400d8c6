//! JSON message types for the signaling WebSocket.
//!
//! # Message flow
//!
//! ```text
//! Client → Server:  JSON text frame  →  ClientMessage
//! Server → Client:  ServerMessage    →  JSON text frame
//! ```
//!
//! Every message is a JSON object with a `"type"` field naming the variant in
//! kebab-case; the remaining fields sit next to it:
//!
//! ```json
//! {"type":"offer","sdp":"v=0..."}
//! {"type":"ice-candidate","candidate":{"candidate":"...","sdpMid":"0","sdpMLineIndex":0}}
//! {"type":"command","command":{"type":"keydown","key":"A"}}
//! {"type":"status"}
//! ```
//!
//! Two enums keep the directions apart: a server-only message can never be
//! parsed from a client frame by accident.

use pokeremote_core::{IceCandidate, NegotiationState};
use serde::{Deserialize, Serialize};

// ── Client → Server ───────────────────────────────────────────────────────────

/// Everything a client may send over the signaling socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// The client's SDP offer.  Answered with [`ServerMessage::Answer`].
    Offer { sdp: String },

    /// One remote ICE candidate.  Answered with [`ServerMessage::IceAck`].
    IceCandidate { candidate: IceCandidate },

    /// One button command, for clients that send commands over signaling
    /// instead of a data channel.
    ///
    /// `command` is either the control message object itself or a string
    /// holding its JSON text.
    Command { command: serde_json::Value },

    /// Asks whether this client's session is connected.
    Status,
}

impl ClientMessage {
    /// Short variant name for log lines; never includes SDP or payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Offer { .. } => "offer",
            ClientMessage::IceCandidate { .. } => "ice-candidate",
            ClientMessage::Command { .. } => "command",
            ClientMessage::Status => "status",
        }
    }
}

// ── Server → Client ───────────────────────────────────────────────────────────

/// Everything the server sends over the signaling socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// First message on every socket: the id the server assigned.
    Welcome { connection_id: String },

    /// The host's SDP answer.
    Answer { sdp: String },

    /// A candidate gathered by the host.
    IceCandidate { candidate: IceCandidate },

    /// A remote candidate was accepted.  `buffered` is `true` when it is held
    /// until the offer has been applied.
    IceAck { buffered: bool },

    /// Result of one [`ClientMessage::Command`], in arrival order.
    CommandResult { success: bool, message: String },

    /// Reply to [`ClientMessage::Status`].  `state` is absent when the client
    /// has no session yet.
    Status {
        connected: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<NegotiationState>,
    },

    /// A request failed.  The socket stays open.
    Error { message: String },

    /// The peer connection ended; a new offer is needed to reconnect.
    ConnectionClosed { state: NegotiationState },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
