//! Protocol module containing the JSON wire messages, the control-message
//! codec, and video frame chunking.

pub mod codec;
pub mod messages;
pub mod video;

pub use codec::{decode_command, decode_command_bytes, encode_command, ProtocolError};
pub use messages::*;
pub use video::{split_frame, FrameChunkHeader, DEFAULT_MAX_CHUNK_PAYLOAD, FRAME_CHUNK_HEADER_LEN};
