//! SessionHost: the API the transport layer calls.
//!
//! The signaling server never touches negotiators or the registry directly.
//! It calls the handful of methods here, keyed by connection id, and reads
//! [`HostEvent`]s from the receiver returned by [`SessionHost::new`]:
//!
//! | Call                   | Effect                                          |
//! |------------------------|-------------------------------------------------|
//! | `handle_offer`         | create the session if needed, return the answer |
//! | `handle_ice_candidate` | buffer or apply one remote candidate            |
//! | `handle_command`       | execute one button command                      |
//! | `on_disconnect`        | tear the session down                           |
//! | `is_connected`         | status query                                    |
//!
//! Sessions that fail negotiation are removed here.  Sessions the transport
//! ends on its own (peer reported `Failed`, say) are removed by a small reaper
//! task that also forwards the `SessionClosed` event.

use std::sync::Arc;

use pokeremote_core::{CommandResponse, ConnectionId, IceCandidate, NegotiationState};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::negotiate_session::{
    HostEvent, IceAck, SessionContext, SessionError, SessionSignal,
};
use crate::application::session_registry::SessionRegistry;

/// Entry point of the session engine.
pub struct SessionHost {
    registry: Arc<SessionRegistry>,
    reaper: JoinHandle<()>,
}

impl SessionHost {
    /// Builds the host and returns the stream of events for the transport.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(ctx: SessionContext) -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(SessionRegistry::new(Arc::new(ctx), signal_tx));
        let reaper = tokio::spawn(reap(Arc::clone(&registry), signal_rx, event_tx));
        (Self { registry, reaper }, event_rx)
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Registers a session before any offer arrives.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DuplicateSession`] if `id` is already taken.
    pub fn open_session(&self, id: &ConnectionId) -> Result<(), SessionError> {
        self.registry.create(id).map(|_| ())
    }

    /// Negotiates the session for `id` and returns the answer SDP.
    ///
    /// # Errors
    ///
    /// See [`SessionNegotiator::on_offer`](crate::application::negotiate_session::SessionNegotiator::on_offer).
    /// On any error other than a duplicate offer the session is removed.
    pub async fn handle_offer(&self, id: &ConnectionId, sdp: &str) -> Result<String, SessionError> {
        let session = self.registry.get_or_create(id);
        match session.on_offer(sdp).await {
            Ok(answer) => Ok(answer),
            Err(e @ SessionError::DuplicateOffer(_)) => Err(e),
            Err(e) => {
                warn!(%id, error = %e, "offer failed; dropping session");
                self.registry.remove_if_serial(id, session.serial()).await;
                Err(e)
            }
        }
    }

    /// Hands one remote ICE candidate to the session for `id`.
    ///
    /// Candidates may precede the offer; the session is created on demand and
    /// buffers them.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NegotiationFailure`] if the candidate is
    /// rejected (the session is then removed) or
    /// [`SessionError::SessionClosed`] for an ended session.
    pub async fn handle_ice_candidate(
        &self,
        id: &ConnectionId,
        candidate: IceCandidate,
    ) -> Result<IceAck, SessionError> {
        let session = self.registry.get_or_create(id);
        let result = session.on_ice_candidate(candidate).await;
        if let Err(SessionError::NegotiationFailure(_)) = &result {
            self.registry.remove_if_serial(id, session.serial()).await;
        }
        result
    }

    /// Executes one button command for the session `id`.
    pub fn handle_command(&self, id: &ConnectionId, raw: &str) -> CommandResponse {
        match self.registry.get(id) {
            Some(session) => session.handle_command(raw),
            None => CommandResponse::rejected(SessionError::SessionNotFound(id.clone()).to_string()),
        }
    }

    /// Tears down the session for `id`, if any.
    pub async fn on_disconnect(&self, id: &ConnectionId) {
        if self.registry.remove(id).await {
            info!(%id, "client disconnected");
        }
    }

    pub fn is_connected(&self, id: &ConnectionId) -> bool {
        self.registry.get(id).is_some_and(|s| s.is_connected())
    }

    pub fn session_state(&self, id: &ConnectionId) -> Option<NegotiationState> {
        self.registry.get(id).map(|s| s.state())
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Closes every session.  Returns how many were closed.
    pub async fn shutdown(&self) -> usize {
        let closed = self.registry.drain().await;
        info!(closed, "session host shut down");
        closed
    }
}

impl Drop for SessionHost {
    fn drop(&mut self) {
        self.reaper.abort();
    }
}

/// Removes sessions that ended on their own and forwards every event.
async fn reap(
    registry: Arc<SessionRegistry>,
    mut signals: mpsc::UnboundedReceiver<SessionSignal>,
    events: mpsc::UnboundedSender<HostEvent>,
) {
    while let Some(SessionSignal { serial, event }) = signals.recv().await {
        if let HostEvent::SessionClosed { id, .. } = &event {
            registry.remove_if_serial(id, serial).await;
        }
        // Nobody listening is fine; sessions keep working without relays.
        let _ = events.send(event);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
