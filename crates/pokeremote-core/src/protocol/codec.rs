//! Codec for control messages arriving on the data channel.
//!
//! Wire format (UTF-8 JSON text, one command per message):
//! ```text
//! {"type": "keydown" | "keyup" | "keypress", "key": "<button name>"}
//! ```
//! The `type` value is matched case-insensitively.  Unknown extra fields are
//! ignored.  The `key` value is passed through untouched; whether it names a
//! real button is decided later by the key map.

use serde::Deserialize;
use thiserror::Error;

use crate::protocol::messages::{ButtonCommand, ButtonIntent, ControlMessage};

/// Errors that can occur while decoding a control message.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The payload is not valid UTF-8.
    #[error("control message is not valid UTF-8")]
    InvalidUtf8,

    /// The payload is not a JSON object.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// A required field is absent or not a string.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// The `type` field holds something other than keydown/keyup/keypress.
    #[error("unknown command type: {0}")]
    UnknownCommandType(String),

    /// The `key` field is present but blank.
    #[error("empty key")]
    EmptyKey,

    /// Serialization failed (should not happen for well-formed commands).
    #[error("encode failed: {0}")]
    Encode(String),

    /// A video frame cannot be described by the 16-bit chunk header.
    #[error("frame too large to chunk")]
    FrameTooLarge,
}

/// Lenient mirror of [`ControlMessage`] so missing fields become
/// [`ProtocolError::MissingField`] instead of a generic serde error.
#[derive(Deserialize)]
struct RawControlMessage {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    key: Option<String>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one control message from its JSON text.
///
/// # Errors
///
/// Returns [`ProtocolError`] when the text is not a JSON object, a field is
/// missing, the key is blank, or the type is not a known command.
///
/// # Examples
///
/// ```rust
/// use pokeremote_core::protocol::{decode_command, ButtonIntent};
///
/// let cmd = decode_command(r#"{"type":"keydown","key":"a"}"#).unwrap();
/// assert_eq!(cmd.button_id, "a");
/// assert_eq!(cmd.intent, ButtonIntent::Pressed);
/// ```
pub fn decode_command(raw: &str) -> Result<ButtonCommand, ProtocolError> {
    let msg: RawControlMessage =
        serde_json::from_str(raw).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    let kind = msg.kind.ok_or(ProtocolError::MissingField("type"))?;
    let key = msg.key.ok_or(ProtocolError::MissingField("key"))?;

    let intent = ButtonIntent::from_wire_name(&kind)
        .ok_or_else(|| ProtocolError::UnknownCommandType(kind.clone()))?;

    if key.trim().is_empty() {
        return Err(ProtocolError::EmptyKey);
    }

    Ok(ButtonCommand {
        button_id: key,
        intent,
    })
}

/// Decodes a control message delivered as a binary data-channel frame.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidUtf8`] for non-UTF-8 bytes, otherwise the
/// same errors as [`decode_command`].
pub fn decode_command_bytes(raw: &[u8]) -> Result<ButtonCommand, ProtocolError> {
    let text = std::str::from_utf8(raw).map_err(|_| ProtocolError::InvalidUtf8)?;
    decode_command(text)
}

/// Encodes a command into its JSON wire text.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_command(cmd: &ButtonCommand) -> Result<String, ProtocolError> {
    serde_json::to_string(&ControlMessage::from(cmd)).map_err(|e| ProtocolError::Encode(e.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
