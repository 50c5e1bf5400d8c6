//! Scripted peer connection for unit and integration tests.
//!
//! [`MockPeerConnection`] behaves like an answerer that never touches the
//! network.  It enforces the one ordering rule a real WebRTC stack enforces
//! (no candidate before the remote description) and records every candidate
//! it applied, in order, so tests can check the negotiator's buffering.
//!
//! Tests drive the asynchronous side by calling
//! [`MockPeerConnection::emit_state`] and friends, which push the same
//! [`PeerEvent`]s a real backend would.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use pokeremote_core::{
    ConnectionId, IceCandidate, PeerConnectionState, SdpKind, SessionDescription,
};

use crate::application::peer_connection::{
    PeerConnection, PeerConnectionFactory, PeerError, PeerEvent, PeerEventSender,
};

/// Failures and delays a mock peer should inject.
#[derive(Debug, Clone, Default)]
pub struct MockPeerBehavior {
    /// `set_remote_description` fails.
    pub fail_remote_description: bool,
    /// `create_answer` fails.
    pub fail_answer: bool,
    /// `add_ice_candidate` fails for a candidate with exactly this text.
    pub fail_candidate: Option<String>,
    /// `set_remote_description` sleeps this long before applying.
    pub remote_description_delay: Duration,
    /// `send_data` sleeps this long per message, like a congested channel.
    pub send_delay: Duration,
}

/// An in-memory peer connection.
pub struct MockPeerConnection {
    id: ConnectionId,
    events: PeerEventSender,
    behavior: MockPeerBehavior,
    remote: Mutex<Option<SessionDescription>>,
    local: Mutex<Option<SessionDescription>>,
    applied: Mutex<Vec<IceCandidate>>,
    channels: Mutex<Vec<(String, u16)>>,
    sent: Mutex<Vec<(String, Bytes)>>,
    closed: AtomicBool,
    closes: AtomicU64,
}

impl MockPeerConnection {
    pub fn new(id: ConnectionId, events: PeerEventSender, behavior: MockPeerBehavior) -> Self {
        Self {
            id,
            events,
            behavior,
            remote: Mutex::new(None),
            local: Mutex::new(None),
            applied: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            closes: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Candidates applied so far, in the order they were applied.
    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.applied.lock().clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().clone()
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    /// `(label, id)` of every data channel created by the host.
    pub fn data_channels(&self) -> Vec<(String, u16)> {
        self.channels.lock().clone()
    }

    /// Every message sent through [`PeerConnection::send_data`].
    pub fn sent_messages(&self) -> Vec<(String, Bytes)> {
        self.sent.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }

    /// Reports a connection-state change, as the transport would.
    pub fn emit_state(&self, state: PeerConnectionState) {
        let _ = self.events.send(PeerEvent::ConnectionStateChanged(state));
    }

    /// Reports a locally gathered ICE candidate.
    pub fn emit_local_candidate(&self, candidate: IceCandidate) {
        let _ = self.events.send(PeerEvent::LocalIceCandidate(candidate));
    }

    /// Delivers a data-channel message from the client.
    pub fn emit_message(&self, label: &str, data: impl Into<Bytes>) {
        let _ = self.events.send(PeerEvent::DataChannelMessage {
            label: label.to_string(),
            data: data.into(),
        });
    }

    fn ensure_open(&self) -> Result<(), PeerError> {
        if self.is_closed() {
            return Err(PeerError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl PeerConnection for MockPeerConnection {
    async fn set_remote_description(&self, offer: &SessionDescription) -> Result<(), PeerError> {
        self.ensure_open()?;
        if !self.behavior.remote_description_delay.is_zero() {
            tokio::time::sleep(self.behavior.remote_description_delay).await;
        }
        if self.behavior.fail_remote_description {
            return Err(PeerError::Description("injected failure".to_string()));
        }
        if offer.kind != SdpKind::Offer {
            return Err(PeerError::Description("expected an offer".to_string()));
        }
        *self.remote.lock() = Some(offer.clone());
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription, PeerError> {
        self.ensure_open()?;
        if self.behavior.fail_answer {
            return Err(PeerError::Description("injected answer failure".to_string()));
        }
        if self.remote.lock().is_none() {
            return Err(PeerError::Description("no remote description".to_string()));
        }
        Ok(SessionDescription::answer(format!(
            "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=mock-{}\r\n",
            self.id
        )))
    }

    async fn set_local_description(&self, answer: &SessionDescription) -> Result<(), PeerError> {
        self.ensure_open()?;
        *self.local.lock() = Some(answer.clone());
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), PeerError> {
        self.ensure_open()?;
        if self.remote.lock().is_none() {
            return Err(PeerError::Candidate(
                "remote description not set".to_string(),
            ));
        }
        if self.behavior.fail_candidate.as_deref() == Some(candidate.candidate.as_str()) {
            return Err(PeerError::Candidate("injected candidate failure".to_string()));
        }
        self.applied.lock().push(candidate.clone());
        Ok(())
    }

    async fn create_data_channel(&self, label: &str, id: u16) -> Result<(), PeerError> {
        self.ensure_open()?;
        self.channels.lock().push((label.to_string(), id));
        Ok(())
    }

    async fn send_data(&self, label: &str, data: Bytes) -> Result<(), PeerError> {
        self.ensure_open()?;
        if !self.behavior.send_delay.is_zero() {
            tokio::time::sleep(self.behavior.send_delay).await;
        }
        if !self.channels.lock().iter().any(|(l, _)| l == label) {
            return Err(PeerError::DataChannel {
                label: label.to_string(),
                reason: "no such channel".to_string(),
            });
        }
        self.sent.lock().push((label.to_string(), data));
        Ok(())
    }

    async fn close(&self) -> Result<(), PeerError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Builds [`MockPeerConnection`]s and keeps them for inspection.
#[derive(Default)]
pub struct MockPeerFactory {
    behavior: Mutex<MockPeerBehavior>,
    fail_create: AtomicBool,
    created: Mutex<Vec<Arc<MockPeerConnection>>>,
}

impl MockPeerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Behaviour given to every peer created from now on.
    pub fn set_behavior(&self, behavior: MockPeerBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Makes every later `create` call fail.
    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Every peer created so far, oldest first.
    pub fn peers(&self) -> Vec<Arc<MockPeerConnection>> {
        self.created.lock().clone()
    }

    /// The most recent peer created for session `id`.
    pub fn peer_for(&self, id: &ConnectionId) -> Option<Arc<MockPeerConnection>> {
        self.created
            .lock()
            .iter()
            .rev()
            .find(|p| p.id() == id)
            .cloned()
    }
}

#[async_trait]
impl PeerConnectionFactory for MockPeerFactory {
    async fn create(
        &self,
        id: &ConnectionId,
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>, PeerError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(PeerError::Create("injected factory failure".to_string()));
        }
        let behavior = self.behavior.lock().clone();
        let peer = Arc::new(MockPeerConnection::new(id.clone(), events, behavior));
        self.created.lock().push(Arc::clone(&peer));
        Ok(peer)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn peer() -> (MockPeerConnection, mpsc::UnboundedReceiver<PeerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            MockPeerConnection::new(ConnectionId::new("p"), tx, MockPeerBehavior::default()),
            rx,
        )
    }

    #[tokio::test]
    async fn test_candidate_before_remote_description_is_rejected() {
        let (peer, _rx) = peer();

        let result = peer.add_ice_candidate(&IceCandidate::new("c", None, None)).await;

        assert!(matches!(result, Err(PeerError::Candidate(_))));
        assert!(peer.applied_candidates().is_empty());
    }

    #[tokio::test]
    async fn test_full_answer_flow() {
        // Arrange
        let (peer, _rx) = peer();

        // Act
        peer.set_remote_description(&SessionDescription::offer("v=0"))
            .await
            .unwrap();
        let answer = peer.create_answer().await.unwrap();
        peer.set_local_description(&answer).await.unwrap();
        peer.add_ice_candidate(&IceCandidate::new("c1", None, Some(0)))
            .await
            .unwrap();

        // Assert
        assert_eq!(answer.kind, SdpKind::Answer);
        assert_eq!(peer.local_description(), Some(answer));
        assert_eq!(peer.applied_candidates().len(), 1);
    }

    #[tokio::test]
    async fn test_send_on_unknown_channel_fails() {
        let (peer, _rx) = peer();

        let result = peer.send_data("video", Bytes::from_static(b"x")).await;

        assert!(matches!(result, Err(PeerError::DataChannel { .. })));
    }

    #[tokio::test]
    async fn test_calls_after_close_fail() {
        let (peer, _rx) = peer();
        peer.close().await.unwrap();

        let result = peer.set_remote_description(&SessionDescription::offer("v=0")).await;

        assert_eq!(result, Err(PeerError::Closed));
        assert!(peer.is_closed());
    }

    #[tokio::test]
    async fn test_emitted_events_reach_the_receiver() {
        let (peer, mut rx) = peer();

        peer.emit_state(PeerConnectionState::Connected);

        assert_eq!(
            rx.recv().await,
            Some(PeerEvent::ConnectionStateChanged(PeerConnectionState::Connected))
        );
    }
}
