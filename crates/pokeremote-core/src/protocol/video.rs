//! Framing for encoded video frames sent over the `video` data channel.
//!
//! An SCTP data-channel message is limited in size, and a single JPEG frame
//! usually exceeds that limit.  Each frame is therefore split into chunks,
//! every chunk carrying a small fixed header so the client can reassemble it:
//!
//! ```text
//! [sequence:4][chunk_index:2][chunk_count:2][width:2][height:2][payload:N]
//! ```
//! Total header size: 12 bytes.  All integers are big-endian.  `sequence` is
//! the low 32 bits of [`Frame::sequence`].  A client that sees a new sequence
//! before completing the previous one simply drops the incomplete frame.

use bytes::{BufMut, Bytes, BytesMut};

use crate::domain::capture::Frame;
use crate::protocol::codec::ProtocolError;

/// Size of the per-chunk header in bytes.
pub const FRAME_CHUNK_HEADER_LEN: usize = 12;

/// Payload bytes per chunk used by the host unless configured otherwise.
pub const DEFAULT_MAX_CHUNK_PAYLOAD: usize = 16 * 1024;

/// Decoded chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameChunkHeader {
    pub sequence: u32,
    pub chunk_index: u16,
    pub chunk_count: u16,
    pub width: u16,
    pub height: u16,
}

impl FrameChunkHeader {
    /// Parses the header at the front of `chunk`, or `None` if it is too short.
    pub fn parse(chunk: &[u8]) -> Option<Self> {
        if chunk.len() < FRAME_CHUNK_HEADER_LEN {
            return None;
        }
        let be16 = |at: usize| u16::from_be_bytes([chunk[at], chunk[at + 1]]);
        Some(Self {
            sequence: u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
            chunk_index: be16(4),
            chunk_count: be16(6),
            width: be16(8),
            height: be16(10),
        })
    }
}

/// Splits `frame` into data-channel messages of at most
/// `FRAME_CHUNK_HEADER_LEN + max_payload` bytes each.
///
/// An empty frame still yields one header-only chunk.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] when the frame dimensions do not
/// fit the 16-bit header fields or the frame would need more than
/// `u16::MAX` chunks.
pub fn split_frame(frame: &Frame, max_payload: usize) -> Result<Vec<Bytes>, ProtocolError> {
    let max_payload = max_payload.max(1);
    let width = u16::try_from(frame.width).map_err(|_| ProtocolError::FrameTooLarge)?;
    let height = u16::try_from(frame.height).map_err(|_| ProtocolError::FrameTooLarge)?;

    let count = frame.data.len().div_ceil(max_payload).max(1);
    let chunk_count = u16::try_from(count).map_err(|_| ProtocolError::FrameTooLarge)?;
    let sequence = frame.sequence as u32;

    let mut chunks = Vec::with_capacity(count);
    for index in 0..count {
        let start = index * max_payload;
        let end = (start + max_payload).min(frame.data.len());
        let payload = frame.data.slice(start.min(end)..end);

        let mut buf = BytesMut::with_capacity(FRAME_CHUNK_HEADER_LEN + payload.len());
        buf.put_u32(sequence);
        buf.put_u16(index as u16);
        buf.put_u16(chunk_count);
        buf.put_u16(width);
        buf.put_u16(height);
        buf.extend_from_slice(&payload);
        chunks.push(buf.freeze());
    }
    Ok(chunks)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
