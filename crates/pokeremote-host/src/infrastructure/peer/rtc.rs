//! [`PeerConnection`] backed by the `webrtc` crate.
//!
//! The host is always the answerer: the client sends an offer, the host
//! replies with an answer.  No media tracks are used.  Video frames travel on
//! a pre-negotiated data channel the host creates itself, and button commands
//! arrive on whichever data channels the client opens.
//!
//! # Callback wiring
//!
//! The `webrtc` crate reports progress through boxed async callbacks.  Every
//! callback registered here does one thing only: translate the crate's type
//! into a [`PeerEvent`] and push it into the session's event channel.  The
//! negotiator picks the events up in order on its own task.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use pokeremote_core::{ConnectionId, IceCandidate, PeerConnectionState, SdpKind, SessionDescription};
use tracing::{debug, info};
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use crate::application::peer_connection::{
    PeerConnection, PeerConnectionFactory, PeerError, PeerEvent, PeerEventSender,
};

/// Builds `webrtc`-crate peer connections with a fixed ICE server list.
pub struct WebRtcPeerFactory {
    api: API,
    ice_servers: Vec<String>,
}

impl WebRtcPeerFactory {
    /// `ice_servers` holds STUN/TURN URLs such as `stun:stun.l.google.com:19302`.
    pub fn new(ice_servers: Vec<String>) -> Self {
        Self {
            api: APIBuilder::new().build(),
            ice_servers,
        }
    }

    fn configuration(&self) -> RTCConfiguration {
        let ice_servers = if self.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }]
        };
        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }
}

#[async_trait]
impl PeerConnectionFactory for WebRtcPeerFactory {
    async fn create(
        &self,
        id: &ConnectionId,
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>, PeerError> {
        let pc = self
            .api
            .new_peer_connection(self.configuration())
            .await
            .map_err(|e| PeerError::Create(e.to_string()))?;
        let pc = Arc::new(pc);

        // -- Local ICE candidates
        let tx = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = tx.clone();
            Box::pin(async move {
                // `None` marks the end of gathering.
                let Some(candidate) = candidate else {
                    return;
                };
                if let Ok(init) = candidate.to_json() {
                    let _ = tx.send(PeerEvent::LocalIceCandidate(IceCandidate::new(
                        init.candidate,
                        init.sdp_mid,
                        init.sdp_mline_index,
                    )));
                }
            })
        }));

        // -- Connection state
        let tx = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let _ = tx.send(PeerEvent::ConnectionStateChanged(map_state(state)));
            Box::pin(async {})
        }));

        // -- Data channels opened by the client
        let tx = events;
        let conn_id = id.clone();
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let label = dc.label().to_string();
            info!(id = %conn_id, %label, "client opened data channel");
            forward_messages(&dc, label, tx.clone());
            Box::pin(async {})
        }));

        Ok(Arc::new(WebRtcPeerConnection {
            pc,
            channels: DashMap::new(),
        }))
    }
}

fn forward_messages(dc: &Arc<RTCDataChannel>, label: String, tx: PeerEventSender) {
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let _ = tx.send(PeerEvent::DataChannelMessage {
            label: label.clone(),
            data: msg.data,
        });
        Box::pin(async {})
    }));
}

fn map_state(state: RTCPeerConnectionState) -> PeerConnectionState {
    match state {
        RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => PeerConnectionState::New,
        RTCPeerConnectionState::Connecting => PeerConnectionState::Connecting,
        RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
        RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
    }
}

/// One `RTCPeerConnection` plus the data channels the host created on it.
pub struct WebRtcPeerConnection {
    pc: Arc<RTCPeerConnection>,
    channels: DashMap<String, Arc<RTCDataChannel>>,
}

#[async_trait]
impl PeerConnection for WebRtcPeerConnection {
    async fn set_remote_description(&self, offer: &SessionDescription) -> Result<(), PeerError> {
        if offer.kind != SdpKind::Offer {
            return Err(PeerError::Description("expected an offer".to_string()));
        }
        let desc = RTCSessionDescription::offer(offer.sdp.clone())
            .map_err(|e| PeerError::Description(e.to_string()))?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| PeerError::Description(e.to_string()))
    }

    async fn create_answer(&self) -> Result<SessionDescription, PeerError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| PeerError::Description(e.to_string()))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, answer: &SessionDescription) -> Result<(), PeerError> {
        let desc = RTCSessionDescription::answer(answer.sdp.clone())
            .map_err(|e| PeerError::Description(e.to_string()))?;
        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| PeerError::Description(e.to_string()))
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), PeerError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| PeerError::Candidate(e.to_string()))
    }

    async fn create_data_channel(&self, label: &str, id: u16) -> Result<(), PeerError> {
        // Unordered and unreliable: every chunk carries its own index, and a
        // lost chunk only costs one frame.
        let init = RTCDataChannelInit {
            ordered: Some(false),
            max_retransmits: Some(0),
            negotiated: Some(id),
            ..Default::default()
        };
        let dc = self
            .pc
            .create_data_channel(label, Some(init))
            .await
            .map_err(|e| PeerError::DataChannel {
                label: label.to_string(),
                reason: e.to_string(),
            })?;
        debug!(%label, id, "created pre-negotiated data channel");
        self.channels.insert(label.to_string(), dc);
        Ok(())
    }

    async fn send_data(&self, label: &str, data: Bytes) -> Result<(), PeerError> {
        let dc = self
            .channels
            .get(label)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| PeerError::DataChannel {
                label: label.to_string(),
                reason: "no such channel".to_string(),
            })?;
        dc.send(&data).await.map_err(|e| PeerError::DataChannel {
            label: label.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn close(&self) -> Result<(), PeerError> {
        self.channels.clear();
        self.pc
            .close()
            .await
            .map_err(|e| PeerError::Create(format!("close failed: {e}")))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
