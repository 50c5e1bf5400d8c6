//! Signaling service: maps socket messages onto the session engine.
//!
//! The WebSocket layer hands every parsed [`ClientMessage`] to
//! [`SignalingService::handle_message`] together with the connection id it
//! assigned.  Replies never go back as return values.  They are pushed into
//! the client's outbound channel, the same channel that carries relayed
//! [`HostEvent`]s, so a client sees every message in one well-defined order.
//!
//! # Offer handling
//!
//! Negotiating an offer can take a while (the peer connection has to gather
//! its own candidates).  The offer runs on its own task so candidates the
//! client sends right behind it reach the session immediately and get
//! buffered there, rather than waiting in the socket.
//!
//! # Host candidates before the answer
//!
//! The host starts gathering candidates while it builds the answer, so a
//! `LocalIceCandidate` event can be relayed before the `answer` message has
//! been sent.  A browser rejects a remote candidate that arrives before the
//! remote description, so such candidates are held per client and flushed
//! right after the answer.

use std::sync::Arc;

use dashmap::DashMap;
use pokeremote_core::{ConnectionId, IceCandidate};
use pokeremote_host::{HostEvent, IceAck, SessionHost};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::messages::{ClientMessage, ServerMessage};

/// Outbound half for one connected client.
struct Client {
    tx: mpsc::UnboundedSender<ServerMessage>,
    answered: bool,
    held: Vec<IceCandidate>,
}

/// Routes signaling traffic between sockets and the [`SessionHost`].
pub struct SignalingService {
    host: Arc<SessionHost>,
    clients: DashMap<ConnectionId, Client>,
}

impl SignalingService {
    pub fn new(host: Arc<SessionHost>) -> Self {
        Self {
            host,
            clients: DashMap::new(),
        }
    }

    pub fn host(&self) -> &SessionHost {
        &self.host
    }

    /// Registers a new client under a fresh id and queues its `welcome`.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let id = ConnectionId::random();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(ServerMessage::Welcome {
            connection_id: id.to_string(),
        });
        self.clients.insert(
            id.clone(),
            Client {
                tx,
                answered: false,
                held: Vec::new(),
            },
        );
        info!(%id, "client connected");
        (id, rx)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Queues `msg` for client `id`.  Returns `false` if the client is gone.
    pub fn send(&self, id: &ConnectionId, msg: ServerMessage) -> bool {
        match self.clients.get(id) {
            Some(client) => client.tx.send(msg).is_ok(),
            None => false,
        }
    }

    /// Parses one text frame and handles it.  A frame that is not a valid
    /// message is answered with an `error` and otherwise ignored.
    pub async fn handle_text(self: &Arc<Self>, id: &ConnectionId, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => self.handle_message(id, msg).await,
            Err(e) => {
                warn!(%id, error = %e, "invalid signaling message");
                self.send(
                    id,
                    ServerMessage::Error {
                        message: format!("invalid message: {e}"),
                    },
                );
            }
        }
    }

    /// Handles one client message.  All replies go to the client's
    /// outbound channel.
    pub async fn handle_message(self: &Arc<Self>, id: &ConnectionId, msg: ClientMessage) {
        debug!(%id, kind = msg.kind(), "signaling message");
        match msg {
            ClientMessage::Offer { sdp } => {
                let this = Arc::clone(self);
                let id = id.clone();
                tokio::spawn(async move { this.answer_offer(&id, &sdp).await });
            }
            ClientMessage::IceCandidate { candidate } => {
                let reply = match self.host.handle_ice_candidate(id, candidate).await {
                    Ok(ack) => ServerMessage::IceAck {
                        buffered: ack == IceAck::Buffered,
                    },
                    Err(e) => ServerMessage::Error {
                        message: e.to_string(),
                    },
                };
                self.send(id, reply);
            }
            ClientMessage::Command { command } => {
                let raw = match command {
                    serde_json::Value::String(text) => text,
                    other => other.to_string(),
                };
                let response = self.host.handle_command(id, &raw);
                self.send(
                    id,
                    ServerMessage::CommandResult {
                        success: response.success,
                        message: response.message,
                    },
                );
            }
            ClientMessage::Status => {
                let reply = ServerMessage::Status {
                    connected: self.host.is_connected(id),
                    state: self.host.session_state(id),
                };
                self.send(id, reply);
            }
        }
    }

    async fn answer_offer(&self, id: &ConnectionId, sdp: &str) {
        if !self.clients.contains_key(id) {
            return;
        }
        match self.host.handle_offer(id, sdp).await {
            Ok(answer) => {
                let delivered = match self.clients.get_mut(id) {
                    Some(mut client) => {
                        let _ = client.tx.send(ServerMessage::Answer { sdp: answer });
                        client.answered = true;
                        for candidate in std::mem::take(&mut client.held) {
                            let _ = client.tx.send(ServerMessage::IceCandidate { candidate });
                        }
                        true
                    }
                    None => false,
                };
                // The socket closed while the offer was in flight.
                if !delivered {
                    debug!(%id, "client left during negotiation; closing session");
                    self.host.on_disconnect(id).await;
                }
            }
            Err(e) => {
                warn!(%id, error = %e, "offer rejected");
                self.send(
                    id,
                    ServerMessage::Error {
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    /// Delivers one engine event to the client it belongs to.
    pub fn relay(&self, event: HostEvent) {
        match event {
            HostEvent::LocalIceCandidate { id, candidate } => {
                let Some(mut client) = self.clients.get_mut(&id) else {
                    return;
                };
                if client.answered {
                    let _ = client.tx.send(ServerMessage::IceCandidate { candidate });
                } else {
                    client.held.push(candidate);
                }
            }
            HostEvent::SessionClosed { id, state } => {
                if let Some(mut client) = self.clients.get_mut(&id) {
                    // A later offer starts over.
                    client.answered = false;
                    client.held.clear();
                    let _ = client.tx.send(ServerMessage::ConnectionClosed { state });
                }
            }
        }
    }

    /// Relays engine events until the host's event stream ends.
    pub async fn run_relay(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<HostEvent>) {
        while let Some(event) = events.recv().await {
            self.relay(event);
        }
        debug!("host event stream ended");
    }

    /// Forgets client `id` and tears its session down.
    pub async fn disconnect(&self, id: &ConnectionId) {
        self.clients.remove(id);
        self.host.on_disconnect(id).await;
        info!(%id, "client disconnected");
    }

    /// Drops every client and closes every session.
    pub async fn shutdown(&self) -> usize {
        self.clients.clear();
        self.host.shutdown().await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
