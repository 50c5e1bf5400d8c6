//! JSON message types exchanged with the thin client.
//!
//! Two kinds of traffic use these types:
//!
//! - **Control messages** travel over the client's data channel (and, for
//!   clients that stream commands through signaling, inside a `command`
//!   envelope).  They carry one button press or release:
//!   `{"type": "keydown", "key": "A"}`.
//! - **Negotiation payloads** (session descriptions and ICE candidates) travel
//!   over the signaling socket while the peer connection is being set up.
//!
//! Field names follow the browser's WebRTC JSON conventions (`sdpMid`,
//! `sdpMLineIndex`) so a web or mobile client can forward its native objects
//! untouched.

use serde::{Deserialize, Serialize};

// ── Button commands ───────────────────────────────────────────────────────────

/// What the client wants done with a button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonIntent {
    /// Button went down (`keydown`).
    Pressed,
    /// Button came up (`keyup`).
    Released,
    /// A full press-and-release in one message (`keypress`).
    Tapped,
}

impl ButtonIntent {
    /// The `type` string used on the wire for this intent.
    pub fn wire_name(self) -> &'static str {
        match self {
            ButtonIntent::Pressed => "keydown",
            ButtonIntent::Released => "keyup",
            ButtonIntent::Tapped => "keypress",
        }
    }

    /// Parses a wire `type` string, ignoring ASCII case.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        [
            ButtonIntent::Pressed,
            ButtonIntent::Released,
            ButtonIntent::Tapped,
        ]
        .into_iter()
        .find(|intent| intent.wire_name().eq_ignore_ascii_case(name.trim()))
    }
}

/// A decoded button command.  Ephemeral: built per inbound message and
/// dropped once dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonCommand {
    /// Button name exactly as the client sent it.  Case is normalised only at
    /// key-map lookup time.
    pub button_id: String,
    pub intent: ButtonIntent,
}

impl ButtonCommand {
    pub fn new(button_id: impl Into<String>, intent: ButtonIntent) -> Self {
        Self {
            button_id: button_id.into(),
            intent,
        }
    }
}

/// Raw wire shape of a control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub key: String,
}

impl From<&ButtonCommand> for ControlMessage {
    fn from(cmd: &ButtonCommand) -> Self {
        Self {
            kind: cmd.intent.wire_name().to_string(),
            key: cmd.button_id.clone(),
        }
    }
}

/// Per-command result returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    pub message: String,
}

impl CommandResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: "Command executed successfully".to_string(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

// ── Negotiation payloads ──────────────────────────────────────────────────────

/// One ICE candidate as exchanged in signaling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>, sdp_mid: Option<String>, sdp_mline_index: Option<u16>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid,
            sdp_mline_index,
        }
    }
}

/// Which half of the offer/answer exchange a description is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// An SDP blob tagged with its role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
