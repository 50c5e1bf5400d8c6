//! The peer-connection capability the session negotiator drives.
//!
//! The negotiator never talks to a WebRTC stack directly.  It goes through the
//! [`PeerConnection`] trait, and learns about asynchronous happenings (a local
//! ICE candidate was gathered, the connection state changed, a data-channel
//! message arrived) through typed [`PeerEvent`]s pushed into a channel.
//!
//! # Why events instead of callbacks? (for beginners)
//!
//! WebRTC stacks report progress through callbacks that fire on their own
//! internal tasks.  If those callbacks called straight back into the
//! negotiator, the negotiator could be re-entered while it is in the middle of
//! handling an offer.  Instead each callback just pushes a `PeerEvent` into an
//! unbounded channel, and a single task per session drains that channel in
//! order.  All state changes for one session therefore happen one at a time.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use pokeremote_core::{ConnectionId, IceCandidate, PeerConnectionState, SessionDescription};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors reported by a peer-connection backend.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PeerError {
    /// The backend could not build the peer connection at all.
    #[error("failed to create peer connection: {0}")]
    Create(String),

    /// The remote or local session description was rejected.
    #[error("invalid session description: {0}")]
    Description(String),

    /// An ICE candidate could not be applied.
    #[error("failed to apply ICE candidate: {0}")]
    Candidate(String),

    /// A data channel could not be created or written to.
    #[error("data channel '{label}': {reason}")]
    DataChannel { label: String, reason: String },

    /// The peer connection has already been closed.
    #[error("peer connection is closed")]
    Closed,
}

/// Something the peer connection reports asynchronously.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// The host gathered a local ICE candidate that must reach the client.
    LocalIceCandidate(IceCandidate),
    /// The transport changed its overall connection state.
    ConnectionStateChanged(PeerConnectionState),
    /// A message arrived on a data channel.
    DataChannelMessage { label: String, data: Bytes },
}

/// Sender half the backend uses to report [`PeerEvent`]s.
pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;

/// One WebRTC peer connection, answerer side.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Applies the client's offer.
    async fn set_remote_description(&self, offer: &SessionDescription) -> Result<(), PeerError>;

    /// Produces the local answer for the applied offer.
    async fn create_answer(&self) -> Result<SessionDescription, PeerError>;

    /// Applies the local answer.
    async fn set_local_description(&self, answer: &SessionDescription) -> Result<(), PeerError>;

    /// Applies one remote ICE candidate.
    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), PeerError>;

    /// Creates a pre-negotiated data channel with SCTP stream `id`.
    async fn create_data_channel(&self, label: &str, id: u16) -> Result<(), PeerError>;

    /// Sends a binary message on the channel named `label`.
    async fn send_data(&self, label: &str, data: Bytes) -> Result<(), PeerError>;

    /// Closes the connection and releases its resources.  Idempotent.
    async fn close(&self) -> Result<(), PeerError>;
}

/// Builds peer connections for new sessions.
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    /// Creates a peer connection for session `id` that reports into `events`.
    async fn create(
        &self,
        id: &ConnectionId,
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>, PeerError>;
}
