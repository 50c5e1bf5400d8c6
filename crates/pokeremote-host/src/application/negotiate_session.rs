//! SessionNegotiator: the per-connection WebRTC state machine.
//!
//! # What a negotiator does (for beginners)
//!
//! Every client that connects gets exactly one negotiator.  It walks the
//! session through the handshake described in
//! [`NegotiationState`](pokeremote_core::NegotiationState):
//!
//! 1. **Offer.**  The client's offer is applied as the remote description, a
//!    pre-negotiated `video` data channel is created, and the local answer is
//!    produced and returned to the caller.
//! 2. **ICE candidates.**  Candidates that arrive before the offer has been
//!    applied are queued.  The queue is drained exactly once, in arrival
//!    order, right after the remote description is set; every later candidate
//!    is applied immediately.
//! 3. **Connected.**  When the transport reports a usable connection the
//!    negotiator starts one [`CaptureLoop`] and begins routing data-channel
//!    messages to its [`CommandRouter`].
//! 4. **Teardown.**  On `Disconnected`, `Failed` or `Closed` the capture loop
//!    is stopped, the peer connection is closed, and (optionally) every key
//!    the client left pressed is released.  These states are terminal.
//!
//! # Event handling
//!
//! The peer connection reports asynchronous happenings as
//! [`PeerEvent`]s on a channel.  One pump task per session drains that
//! channel and applies the events one at a time, so transport callbacks never
//! re-enter the negotiator.
//!
//! # Locking
//!
//! The mutable state sits behind a `parking_lot::Mutex` that is never held
//! across an `.await`.  Resources are taken out of the lock first and released
//! afterwards.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use pokeremote_core::protocol::{split_frame, DEFAULT_MAX_CHUNK_PAYLOAD};
use pokeremote_core::{
    CaptureConfig, CommandResponse, ConnectionId, Frame, IceCandidate, KeyMap, NegotiationState,
    PeerConnectionState, SessionDescription,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::capture_loop::{
    CaptureDeviceFactory, CaptureLoop, CaptureStatsSnapshot, FrameCallback, FrameEncoder,
};
use crate::application::peer_connection::{
    PeerConnection, PeerConnectionFactory, PeerError, PeerEvent,
};
use crate::application::route_command::{CommandRouter, InputInjector};

/// Errors surfaced by the session-level operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    /// A second offer arrived for a session that already has one.
    #[error("session {0} already received an offer")]
    DuplicateOffer(ConnectionId),

    /// A session with this id is already registered.
    #[error("session {0} already exists")]
    DuplicateSession(ConnectionId),

    /// The peer connection rejected an offer, answer or candidate.
    #[error("negotiation failed: {0}")]
    NegotiationFailure(#[from] PeerError),

    /// No session is registered under this id.
    #[error("no session for connection {0}")]
    SessionNotFound(ConnectionId),

    /// The session has reached a terminal state.
    #[error("session {0} is closed")]
    SessionClosed(ConnectionId),
}

/// What happened to an ICE candidate handed to the negotiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceAck {
    /// Applied to the peer connection.
    Applied,
    /// Queued until the remote description is applied.
    Buffered,
}

/// Notifications the host relays to the transport layer.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// A locally gathered ICE candidate the client must receive.
    LocalIceCandidate {
        id: ConnectionId,
        candidate: IceCandidate,
    },
    /// The transport ended the session; it has been torn down.
    SessionClosed {
        id: ConnectionId,
        state: NegotiationState,
    },
}

/// A [`HostEvent`] tagged with the serial of the negotiator that raised it.
///
/// The serial lets the registry tell an old session's late notification apart
/// from a new session that reuses the same connection id.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSignal {
    pub serial: u64,
    pub event: HostEvent,
}

/// Tunables shared by every session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub capture: CaptureConfig,
    /// Upper bound on how long stopping a capture loop may wait.
    pub stop_timeout: Duration,
    pub video_label: String,
    /// SCTP stream id of the pre-negotiated video channel.
    pub video_channel_id: u16,
    /// Payload bytes per video chunk.
    pub max_chunk_payload: usize,
    /// Release keys still held by a session when it ends.
    pub release_held_keys_on_teardown: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            stop_timeout: Duration::from_secs(1),
            video_label: "video".to_string(),
            video_channel_id: 1,
            max_chunk_payload: DEFAULT_MAX_CHUNK_PAYLOAD,
            release_held_keys_on_teardown: true,
        }
    }
}

/// Collaborators every negotiator is built from.
pub struct SessionContext {
    pub settings: SessionSettings,
    pub peers: Arc<dyn PeerConnectionFactory>,
    pub capture: Arc<dyn CaptureDeviceFactory>,
    pub encoder: Arc<dyn FrameEncoder>,
    pub injector: Arc<dyn InputInjector>,
    pub keymap: KeyMap,
}

struct Inner {
    state: NegotiationState,
    pending: VecDeque<IceCandidate>,
    remote_applied: bool,
    peer: Option<Arc<dyn PeerConnection>>,
    capture: Option<Arc<CaptureLoop>>,
    frame_task: Option<JoinHandle<()>>,
    pump_task: Option<JoinHandle<()>>,
}

/// Per-connection negotiation state machine.
pub struct SessionNegotiator {
    id: ConnectionId,
    serial: u64,
    ctx: Arc<SessionContext>,
    router: CommandRouter,
    signals: mpsc::UnboundedSender<SessionSignal>,
    inner: Mutex<Inner>,
}

impl SessionNegotiator {
    pub fn new(
        id: ConnectionId,
        serial: u64,
        ctx: Arc<SessionContext>,
        signals: mpsc::UnboundedSender<SessionSignal>,
    ) -> Self {
        let router = CommandRouter::new(ctx.keymap.clone(), Arc::clone(&ctx.injector));
        Self {
            id,
            serial,
            ctx,
            router,
            signals,
            inner: Mutex::new(Inner {
                state: NegotiationState::New,
                pending: VecDeque::new(),
                remote_applied: false,
                peer: None,
                capture: None,
                frame_task: None,
                pump_task: None,
            }),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Registry-assigned number, unique for the process lifetime.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn state(&self) -> NegotiationState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == NegotiationState::Connected
    }

    /// Number of candidates waiting for the remote description.
    pub fn pending_candidates(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// `true` while this session's capture loop is running.
    pub fn is_capturing(&self) -> bool {
        self.inner
            .lock()
            .capture
            .as_ref()
            .is_some_and(|c| c.is_running())
    }

    pub fn capture_stats(&self) -> Option<CaptureStatsSnapshot> {
        self.inner.lock().capture.as_ref().map(|c| c.stats())
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    // ── Offer / answer ───────────────────────────────────────────────────────

    /// Applies the client's offer and returns the answer SDP.
    ///
    /// # Errors
    ///
    /// - [`SessionError::DuplicateOffer`] if an offer was already accepted;
    ///   the session is left untouched.
    /// - [`SessionError::SessionClosed`] if the session is terminal.
    /// - [`SessionError::NegotiationFailure`] if the peer connection rejects
    ///   anything; the session is then `Failed` and fully released.
    pub async fn on_offer(self: &Arc<Self>, sdp: &str) -> Result<String, SessionError> {
        {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return Err(SessionError::SessionClosed(self.id.clone()));
            }
            if inner.state != NegotiationState::New {
                return Err(SessionError::DuplicateOffer(self.id.clone()));
            }
            inner.state = NegotiationState::OfferReceived;
        }
        info!(id = %self.id, sdp_len = sdp.len(), "offer received");

        match self.negotiate(sdp).await {
            Ok(answer) => {
                let mut inner = self.inner.lock();
                if inner.state.is_terminal() {
                    return Err(SessionError::SessionClosed(self.id.clone()));
                }
                if inner.state == NegotiationState::OfferReceived {
                    inner.state = NegotiationState::AnswerSent;
                }
                info!(id = %self.id, answer_len = answer.sdp.len(), "answer created");
                Ok(answer.sdp)
            }
            Err(e) => {
                if self.fail(&e).await {
                    Err(SessionError::NegotiationFailure(e))
                } else {
                    Err(SessionError::SessionClosed(self.id.clone()))
                }
            }
        }
    }

    async fn negotiate(self: &Arc<Self>, sdp: &str) -> Result<SessionDescription, PeerError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let peer = self.ctx.peers.create(&self.id, events_tx).await?;
        let pump = tokio::spawn(Self::pump(Arc::downgrade(self), events_rx));

        let closed_meanwhile = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                true
            } else {
                inner.peer = Some(Arc::clone(&peer));
                inner.pump_task = Some(pump);
                false
            }
        };
        if closed_meanwhile {
            // `pump` was not stored; dropping the handle detaches it and it
            // ends once the peer's event sender goes away.
            let _ = peer.close().await;
            return Err(PeerError::Closed);
        }

        peer.set_remote_description(&SessionDescription::offer(sdp))
            .await?;
        self.drain_pending(peer.as_ref()).await?;

        let settings = &self.ctx.settings;
        peer.create_data_channel(&settings.video_label, settings.video_channel_id)
            .await?;

        let answer = peer.create_answer().await?;
        peer.set_local_description(&answer).await?;
        Ok(answer)
    }

    /// Applies buffered candidates in arrival order, then marks the remote
    /// description as applied.  Candidates that arrive during the drain join
    /// the queue and are applied in a later round.
    async fn drain_pending(&self, peer: &dyn PeerConnection) -> Result<(), PeerError> {
        loop {
            let batch: Vec<IceCandidate> = {
                let mut inner = self.inner.lock();
                if inner.pending.is_empty() {
                    inner.remote_applied = true;
                    break;
                }
                inner.pending.drain(..).collect()
            };
            debug!(id = %self.id, count = batch.len(), "applying buffered candidates");
            for candidate in &batch {
                peer.add_ice_candidate(candidate).await?;
            }
        }
        Ok(())
    }

    // ── ICE candidates ───────────────────────────────────────────────────────

    /// Buffers or applies one remote ICE candidate.
    ///
    /// # Errors
    ///
    /// - [`SessionError::SessionClosed`] if the session is terminal.
    /// - [`SessionError::NegotiationFailure`] if the candidate is rejected;
    ///   the session is then `Failed` and fully released.
    pub async fn on_ice_candidate(&self, candidate: IceCandidate) -> Result<IceAck, SessionError> {
        let peer = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return Err(SessionError::SessionClosed(self.id.clone()));
            }
            if !inner.remote_applied {
                inner.pending.push_back(candidate);
                debug!(id = %self.id, queued = inner.pending.len(), "candidate buffered");
                return Ok(IceAck::Buffered);
            }
            inner.peer.clone()
        };

        let Some(peer) = peer else {
            return Err(SessionError::SessionClosed(self.id.clone()));
        };
        if let Err(e) = peer.add_ice_candidate(&candidate).await {
            if self.fail(&e).await {
                return Err(SessionError::NegotiationFailure(e));
            }
            return Err(SessionError::SessionClosed(self.id.clone()));
        }
        Ok(IceAck::Applied)
    }

    // ── Transport state ──────────────────────────────────────────────────────

    /// Reacts to a connection-state report from the transport.
    pub async fn on_transport_state_change(&self, state: PeerConnectionState) {
        let Some(target) = state.target_state() else {
            return;
        };

        match target {
            NegotiationState::IceExchanging => {
                let mut inner = self.inner.lock();
                if inner.state == NegotiationState::AnswerSent {
                    inner.state = NegotiationState::IceExchanging;
                }
            }
            NegotiationState::Connected => {
                {
                    let mut inner = self.inner.lock();
                    if inner.state.is_terminal() || inner.state == NegotiationState::Connected {
                        return;
                    }
                    inner.state = NegotiationState::Connected;
                }
                info!(id = %self.id, "peer connected");
                self.start_capture().await;
            }
            terminal => {
                {
                    let mut inner = self.inner.lock();
                    if inner.state.is_terminal() {
                        return;
                    }
                    inner.state = terminal;
                }
                info!(id = %self.id, state = %terminal, "peer connection ended");
                self.teardown(false).await;
                self.emit(HostEvent::SessionClosed {
                    id: self.id.clone(),
                    state: terminal,
                });
            }
        }
    }

    // ── Commands ─────────────────────────────────────────────────────────────

    /// Executes a command delivered over signaling.
    pub fn handle_command(&self, raw: &str) -> CommandResponse {
        if self.state().is_terminal() {
            return CommandResponse::rejected("Session is closed");
        }
        self.router.respond(raw)
    }

    fn on_data_message(&self, label: &str, data: &Bytes) {
        if label == self.ctx.settings.video_label {
            return;
        }
        if !self.is_connected() {
            debug!(id = %self.id, %label, "data-channel message before connect ignored");
            return;
        }
        match self.router.dispatch_bytes(data) {
            Ok(button) => debug!(id = %self.id, %button, "data-channel command executed"),
            Err(e) => warn!(id = %self.id, error = %e, "data-channel command rejected"),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Closes the session deliberately.  Idempotent; a session that already
    /// ended keeps its terminal state.
    pub async fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if !inner.state.is_terminal() {
                inner.state = NegotiationState::Closed;
            }
        }
        self.teardown(true).await;
    }

    /// Moves to `Failed` and releases everything.  Returns `false` if the
    /// session was already terminal.
    async fn fail(&self, reason: &PeerError) -> bool {
        let was_live = {
            let mut inner = self.inner.lock();
            let live = !inner.state.is_terminal();
            if live {
                inner.state = NegotiationState::Failed;
            }
            live
        };
        if was_live {
            warn!(id = %self.id, error = %reason, "negotiation failed");
        }
        self.teardown(true).await;
        was_live
    }

    /// Releases the capture loop, the peer connection, and any held keys.
    ///
    /// `abort_pump` must be `false` when called from the pump task itself.
    async fn teardown(&self, abort_pump: bool) {
        let (peer, capture, frame_task, pump) = {
            let mut inner = self.inner.lock();
            inner.pending.clear();
            (
                inner.peer.take(),
                inner.capture.take(),
                inner.frame_task.take(),
                if abort_pump { inner.pump_task.take() } else { None },
            )
        };

        if let Some(capture) = capture {
            capture.stop().await;
        }
        if let Some(task) = frame_task {
            task.abort();
        }
        if let Some(peer) = peer {
            if let Err(e) = peer.close().await {
                warn!(id = %self.id, error = %e, "failed to close peer connection");
            }
        }
        if self.ctx.settings.release_held_keys_on_teardown {
            let released = self.router.release_all();
            if released > 0 {
                info!(id = %self.id, released, "released held keys");
            }
        }
        if let Some(pump) = pump {
            pump.abort();
        }
    }

    // ── Capture ──────────────────────────────────────────────────────────────

    async fn start_capture(&self) {
        let peer = {
            let inner = self.inner.lock();
            if inner.capture.is_some() {
                return;
            }
            inner.peer.clone()
        };
        let Some(peer) = peer else {
            return;
        };

        let settings = &self.ctx.settings;
        let device = match self.ctx.capture.create() {
            Ok(device) => device,
            Err(e) => {
                warn!(id = %self.id, error = %e, "no capture device; session continues without video");
                return;
            }
        };

        let (frame_tx, frame_rx) = watch::channel::<Option<Frame>>(None);
        let on_frame: FrameCallback = Arc::new(move |frame| {
            // Latest frame wins; an unsent older frame is overwritten.
            let _ = frame_tx.send(Some(frame));
        });

        let capture = match CaptureLoop::new(
            device,
            Arc::clone(&self.ctx.encoder),
            settings.capture,
            settings.stop_timeout,
            on_frame,
        ) {
            Ok(capture) => Arc::new(capture),
            Err(e) => {
                warn!(id = %self.id, error = %e, "failed to set up capture");
                return;
            }
        };
        if let Err(e) = capture.start().await {
            warn!(id = %self.id, error = %e, "failed to start capture");
            return;
        }

        let frame_task = tokio::spawn(send_frames(
            self.id.clone(),
            peer,
            settings.video_label.clone(),
            settings.max_chunk_payload,
            frame_rx,
        ));

        let torn_down = {
            let mut inner = self.inner.lock();
            if inner.state == NegotiationState::Connected {
                inner.capture = Some(Arc::clone(&capture));
                inner.frame_task = Some(frame_task);
                None
            } else {
                Some(frame_task)
            }
        };
        if let Some(frame_task) = torn_down {
            // The session ended while the loop was starting.
            frame_task.abort();
            capture.stop().await;
        }
    }

    // ── Event pump ───────────────────────────────────────────────────────────

    async fn pump(session: Weak<Self>, mut events: mpsc::UnboundedReceiver<PeerEvent>) {
        while let Some(event) = events.recv().await {
            let Some(session) = session.upgrade() else {
                break;
            };
            session.handle_peer_event(event).await;
            if session.state().is_terminal() {
                break;
            }
        }
    }

    async fn handle_peer_event(&self, event: PeerEvent) {
        match event {
            PeerEvent::LocalIceCandidate(candidate) => {
                self.emit(HostEvent::LocalIceCandidate {
                    id: self.id.clone(),
                    candidate,
                });
            }
            PeerEvent::ConnectionStateChanged(state) => {
                self.on_transport_state_change(state).await;
            }
            PeerEvent::DataChannelMessage { label, data } => {
                self.on_data_message(&label, &data);
            }
        }
    }

    fn emit(&self, event: HostEvent) {
        let _ = self.signals.send(SessionSignal {
            serial: self.serial,
            event,
        });
    }
}

/// Forwards the most recent frame to the client as video chunks.
async fn send_frames(
    id: ConnectionId,
    peer: Arc<dyn PeerConnection>,
    label: String,
    max_payload: usize,
    mut frames: watch::Receiver<Option<Frame>>,
) {
    while frames.changed().await.is_ok() {
        let Some(frame) = frames.borrow_and_update().clone() else {
            continue;
        };
        let chunks = match split_frame(&frame, max_payload) {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(%id, error = %e, "frame dropped");
                continue;
            }
        };
        for chunk in chunks {
            if let Err(e) = peer.send_data(&label, chunk).await {
                // The channel may not be open yet; the next frame retries.
                debug!(%id, error = %e, "video chunk not sent");
                break;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::capture::mock::{MockCaptureFactory, RawPassthroughEncoder};
    use crate::infrastructure::input_injection::mock::{InjectedKey, RecordingInputInjector};
    use crate::infrastructure::peer::mock::{MockPeerBehavior, MockPeerFactory};
    use pokeremote_core::protocol::{FrameChunkHeader, FRAME_CHUNK_HEADER_LEN};
    use pokeremote_core::{KeyCode, KeyPlatform};
    use std::time::Instant;

    struct Fixture {
        peers: Arc<MockPeerFactory>,
        capture: Arc<MockCaptureFactory>,
        injector: Arc<RecordingInputInjector>,
        signals: mpsc::UnboundedReceiver<SessionSignal>,
        session: Arc<SessionNegotiator>,
    }

    fn fixture() -> Fixture {
        let peers = Arc::new(MockPeerFactory::new());
        let capture = Arc::new(MockCaptureFactory::new(8, 8));
        let injector = Arc::new(RecordingInputInjector::new());
        let ctx = Arc::new(SessionContext {
            settings: SessionSettings {
                capture: CaptureConfig {
                    frame_rate: 50,
                    ..Default::default()
                },
                ..Default::default()
            },
            peers: Arc::clone(&peers) as Arc<dyn PeerConnectionFactory>,
            capture: Arc::clone(&capture) as Arc<dyn CaptureDeviceFactory>,
            encoder: Arc::new(RawPassthroughEncoder),
            injector: Arc::clone(&injector) as Arc<dyn InputInjector>,
            keymap: KeyMap::standard(KeyPlatform::WindowsVk),
        });
        let (tx, signals) = mpsc::unbounded_channel();
        let session = Arc::new(SessionNegotiator::new(ConnectionId::new("c1"), 1, ctx, tx));
        Fixture {
            peers,
            capture,
            injector,
            signals,
            session,
        }
    }

    async fn wait_until(what: &str, cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn candidate(n: u32) -> IceCandidate {
        IceCandidate::new(format!("candidate:{n} 1 udp 1 10.0.0.{n} 5000 typ host"), Some("0".into()), Some(0))
    }

    #[tokio::test]
    async fn test_offer_returns_answer_and_creates_video_channel() {
        // Arrange
        let f = fixture();

        // Act
        let answer = f.session.on_offer("v=0 offer").await.unwrap();

        // Assert
        assert!(answer.starts_with("v=0"));
        assert_eq!(f.session.state(), NegotiationState::AnswerSent);
        let peer = f.peers.peer_for(f.session.id()).unwrap();
        assert_eq!(peer.data_channels(), vec![("video".to_string(), 1)]);
        assert_eq!(peer.local_description().map(|d| d.sdp), Some(answer));
    }

    #[tokio::test]
    async fn test_second_offer_is_rejected_and_state_unchanged() {
        let f = fixture();
        f.session.on_offer("v=0").await.unwrap();

        let result = f.session.on_offer("v=0 again").await;

        assert_eq!(result, Err(SessionError::DuplicateOffer(ConnectionId::new("c1"))));
        assert_eq!(f.session.state(), NegotiationState::AnswerSent);
        assert_eq!(f.peers.peers().len(), 1);
    }

    #[tokio::test]
    async fn test_candidates_before_offer_are_applied_in_arrival_order() {
        // Arrange
        let f = fixture();
        for n in 1..=3 {
            assert_eq!(f.session.on_ice_candidate(candidate(n)).await, Ok(IceAck::Buffered));
        }
        assert_eq!(f.session.pending_candidates(), 3);

        // Act
        f.session.on_offer("v=0").await.unwrap();

        // Assert
        let peer = f.peers.peer_for(f.session.id()).unwrap();
        assert_eq!(
            peer.applied_candidates(),
            vec![candidate(1), candidate(2), candidate(3)]
        );
        assert_eq!(f.session.pending_candidates(), 0);
    }

    #[tokio::test]
    async fn test_candidates_during_offer_are_buffered_then_applied() {
        // Arrange
        let f = fixture();
        f.peers.set_behavior(MockPeerBehavior {
            remote_description_delay: Duration::from_millis(100),
            ..Default::default()
        });
        let session = Arc::clone(&f.session);
        let offer = tokio::spawn(async move { session.on_offer("v=0").await });
        wait_until("offer to start", || {
            f.session.state() == NegotiationState::OfferReceived
        })
        .await;

        // Act
        for n in 1..=3 {
            assert_eq!(f.session.on_ice_candidate(candidate(n)).await, Ok(IceAck::Buffered));
        }
        offer.await.unwrap().unwrap();
        let late = f.session.on_ice_candidate(candidate(4)).await;

        // Assert
        assert_eq!(late, Ok(IceAck::Applied));
        let peer = f.peers.peer_for(f.session.id()).unwrap();
        assert_eq!(
            peer.applied_candidates(),
            vec![candidate(1), candidate(2), candidate(3), candidate(4)]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_connected_starts_capture_exactly_once() {
        // Arrange
        let f = fixture();
        f.session.on_offer("v=0").await.unwrap();
        let peer = f.peers.peer_for(f.session.id()).unwrap();

        // Act
        peer.emit_state(PeerConnectionState::Connecting);
        peer.emit_state(PeerConnectionState::Connected);
        peer.emit_state(PeerConnectionState::Connected);
        wait_until("capture to run", || f.session.is_capturing()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Assert
        assert_eq!(f.session.state(), NegotiationState::Connected);
        let devices = f.capture.devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].open_count(), 1);
        f.session.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_frames_are_sent_as_video_chunks() {
        let f = fixture();
        f.session.on_offer("v=0").await.unwrap();
        let peer = f.peers.peer_for(f.session.id()).unwrap();

        peer.emit_state(PeerConnectionState::Connected);
        wait_until("a video chunk", || !peer.sent_messages().is_empty()).await;

        let (label, chunk) = peer.sent_messages().remove(0);
        assert_eq!(label, "video");
        let header = FrameChunkHeader::parse(&chunk).unwrap();
        assert_eq!((header.width, header.height), (8, 8));
        assert_eq!(chunk.len(), FRAME_CHUNK_HEADER_LEN + 8 * 8 * 4);
        f.session.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_video_channel_skips_stale_frames() {
        // Arrange: each send takes five capture ticks (50 fps → 20 ms).
        let f = fixture();
        f.peers.set_behavior(MockPeerBehavior {
            send_delay: Duration::from_millis(100),
            ..Default::default()
        });
        f.session.on_offer("v=0").await.unwrap();
        let peer = f.peers.peer_for(f.session.id()).unwrap();

        // Act
        peer.emit_state(PeerConnectionState::Connected);
        wait_until("capture to run", || f.session.is_capturing()).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        let delivered_early = f.session.capture_stats().unwrap().frames_delivered;
        tokio::time::sleep(Duration::from_millis(300)).await;
        let delivered_late = f.session.capture_stats().unwrap().frames_delivered;

        // Assert: capture keeps its cadence while sends lag behind.
        assert!(
            delivered_late > delivered_early,
            "capture stalled at {delivered_late} frames"
        );
        let sent: Vec<u32> = peer
            .sent_messages()
            .iter()
            .map(|(_, chunk)| FrameChunkHeader::parse(chunk).unwrap().sequence)
            .collect();
        assert!(sent.len() >= 2, "expected several sends, got {}", sent.len());
        assert!(sent.windows(2).all(|w| w[1] > w[0]), "sends out of order: {sent:?}");
        assert!(
            sent.windows(2).any(|w| w[1] - w[0] > 1),
            "no frame was skipped: {sent:?}"
        );
        assert!((sent.len() as u64) < delivered_late);
        f.session.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_transport_failure_tears_down_and_notifies() {
        // Arrange
        let mut f = fixture();
        f.session.on_offer("v=0").await.unwrap();
        let peer = f.peers.peer_for(f.session.id()).unwrap();
        peer.emit_state(PeerConnectionState::Connected);
        wait_until("capture to run", || f.session.is_capturing()).await;

        // Act
        peer.emit_state(PeerConnectionState::Failed);
        let signal = f.signals.recv().await.unwrap();

        // Assert
        assert_eq!(
            signal,
            SessionSignal {
                serial: 1,
                event: HostEvent::SessionClosed {
                    id: ConnectionId::new("c1"),
                    state: NegotiationState::Failed,
                },
            }
        );
        assert_eq!(f.session.state(), NegotiationState::Failed);
        assert!(!f.capture.devices()[0].is_open());
        assert!(peer.is_closed());
    }

    #[tokio::test]
    async fn test_terminal_state_is_never_left() {
        let f = fixture();
        f.session.on_offer("v=0").await.unwrap();

        f.session.on_transport_state_change(PeerConnectionState::Disconnected).await;
        f.session.on_transport_state_change(PeerConnectionState::Connected).await;

        assert_eq!(f.session.state(), NegotiationState::Disconnected);
        assert!(f.capture.devices().is_empty());
    }

    #[tokio::test]
    async fn test_remote_description_failure_fails_session() {
        // Arrange
        let f = fixture();
        f.peers.set_behavior(MockPeerBehavior {
            fail_remote_description: true,
            ..Default::default()
        });

        // Act
        let result = f.session.on_offer("v=0").await;

        // Assert
        assert!(matches!(result, Err(SessionError::NegotiationFailure(_))));
        assert_eq!(f.session.state(), NegotiationState::Failed);
        assert!(f.peers.peer_for(f.session.id()).unwrap().is_closed());
    }

    #[tokio::test]
    async fn test_rejected_buffered_candidate_fails_offer() {
        let f = fixture();
        f.peers.set_behavior(MockPeerBehavior {
            fail_candidate: Some(candidate(2).candidate),
            ..Default::default()
        });
        for n in 1..=3 {
            f.session.on_ice_candidate(candidate(n)).await.unwrap();
        }

        let result = f.session.on_offer("v=0").await;

        assert!(matches!(result, Err(SessionError::NegotiationFailure(_))));
        assert_eq!(f.session.state(), NegotiationState::Failed);
        assert_eq!(f.session.pending_candidates(), 0);
    }

    #[tokio::test]
    async fn test_candidate_after_close_is_rejected() {
        let f = fixture();
        f.session.close().await;

        let result = f.session.on_ice_candidate(candidate(1)).await;

        assert_eq!(result, Err(SessionError::SessionClosed(ConnectionId::new("c1"))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_data_channel_commands_are_injected_once_connected() {
        // Arrange
        let f = fixture();
        f.session.on_offer("v=0").await.unwrap();
        let peer = f.peers.peer_for(f.session.id()).unwrap();

        // Act
        peer.emit_message("gamepad", r#"{"type":"keydown","key":"A"}"#);
        peer.emit_state(PeerConnectionState::Connected);
        peer.emit_message("video", r#"{"type":"keydown","key":"B"}"#);
        peer.emit_message("gamepad", r#"{"type":"keyup","key":"a"}"#);
        wait_until("key up", || !f.injector.events().is_empty()).await;

        // Assert
        assert_eq!(f.injector.events(), vec![InjectedKey::Up(KeyCode(0x5A))]);
        f.session.close().await;
    }

    #[tokio::test]
    async fn test_close_releases_held_keys() {
        let f = fixture();

        let response = f.session.handle_command(r#"{"type":"keydown","key":"start"}"#);
        f.session.close().await;

        assert!(response.success);
        assert_eq!(
            f.injector.events(),
            vec![
                InjectedKey::Down(KeyCode(0x0D)),
                InjectedKey::Up(KeyCode(0x0D))
            ]
        );
    }

    #[tokio::test]
    async fn test_commands_after_close_are_rejected() {
        let f = fixture();
        f.session.close().await;

        let response = f.session.handle_command(r#"{"type":"keydown","key":"A"}"#);

        assert!(!response.success);
        assert!(f.injector.events().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_capture_failure_does_not_drop_the_session() {
        let f = fixture();
        f.capture.fail_create(true);
        f.session.on_offer("v=0").await.unwrap();

        f.session.on_transport_state_change(PeerConnectionState::Connected).await;

        assert_eq!(f.session.state(), NegotiationState::Connected);
        assert!(!f.session.is_capturing());
    }

    #[tokio::test]
    async fn test_local_candidates_are_forwarded() {
        let mut f = fixture();
        f.session.on_offer("v=0").await.unwrap();
        let peer = f.peers.peer_for(f.session.id()).unwrap();

        peer.emit_local_candidate(candidate(9));
        let signal = f.signals.recv().await.unwrap();

        assert_eq!(
            signal.event,
            HostEvent::LocalIceCandidate {
                id: ConnectionId::new("c1"),
                candidate: candidate(9),
            }
        );
    }
}
