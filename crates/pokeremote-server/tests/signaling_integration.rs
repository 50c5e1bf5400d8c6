//! Integration tests for the signaling server.
//!
//! Each test starts a real WebSocket server on an ephemeral localhost port,
//! backed by the session engine with mock peer, capture, and input
//! backends, and talks to it with a `tokio-tungstenite` client.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use pokeremote_core::{KeyMap, KeyPlatform, NegotiationState, PeerConnectionState};
use pokeremote_host::infrastructure::capture::mock::{MockCaptureFactory, RawPassthroughEncoder};
use pokeremote_host::infrastructure::input_injection::mock::RecordingInputInjector;
use pokeremote_host::infrastructure::peer::mock::MockPeerFactory;
use pokeremote_host::{
    CaptureDeviceFactory, InputInjector, PeerConnectionFactory, SessionContext, SessionHost,
    SessionSettings,
};
use pokeremote_server::application::SignalingService;
use pokeremote_server::domain::ServerMessage;
use pokeremote_server::infrastructure::{run_server, ws_server};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Server {
    addr: SocketAddr,
    service: Arc<SignalingService>,
    peers: Arc<MockPeerFactory>,
    running: Arc<AtomicBool>,
    task: JoinHandle<anyhow::Result<()>>,
}

async fn start_server() -> Server {
    let peers = Arc::new(MockPeerFactory::new());
    let peer_factory: Arc<dyn PeerConnectionFactory> = peers.clone();
    let capture: Arc<dyn CaptureDeviceFactory> = Arc::new(MockCaptureFactory::new(4, 4));
    let injector: Arc<dyn InputInjector> = Arc::new(RecordingInputInjector::new());
    let (host, events) = SessionHost::new(SessionContext {
        settings: SessionSettings::default(),
        peers: peer_factory,
        capture,
        encoder: Arc::new(RawPassthroughEncoder),
        injector,
        keymap: KeyMap::standard(KeyPlatform::WindowsVk),
    });
    let service = Arc::new(SignalingService::new(Arc::new(host)));
    tokio::spawn(Arc::clone(&service).run_relay(events));

    let listener = ws_server::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let running = Arc::new(AtomicBool::new(true));
    let task = tokio::spawn(run_server(
        listener,
        Arc::clone(&service),
        Arc::clone(&running),
    ));

    Server {
        addr,
        service,
        peers,
        running,
        task,
    }
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    ws
}

async fn send(ws: &mut Client, json: &str) {
    ws.send(WsMessage::Text(json.to_string())).await.unwrap();
}

async fn recv(ws: &mut Client) -> ServerMessage {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let frame = tokio::time::timeout(remaining, ws.next())
            .await
            .expect("timed out waiting for a server message")
            .expect("socket closed")
            .expect("socket error");
        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_offer_command_and_status_over_websocket() {
    // Arrange
    let server = start_server().await;
    let mut ws = connect(server.addr).await;
    let ServerMessage::Welcome { connection_id } = recv(&mut ws).await else {
        panic!("first message must be welcome");
    };

    // Act
    send(&mut ws, r#"{"type":"offer","sdp":"v=0"}"#).await;
    let answer = recv(&mut ws).await;
    send(
        &mut ws,
        r#"{"type":"command","command":{"type":"keydown","key":"a"}}"#,
    )
    .await;
    let result = recv(&mut ws).await;
    send(&mut ws, r#"{"type":"status"}"#).await;
    let status = recv(&mut ws).await;

    // Assert
    assert!(matches!(answer, ServerMessage::Answer { .. }));
    assert_eq!(
        result,
        ServerMessage::CommandResult {
            success: true,
            message: "Command executed successfully".to_string(),
        }
    );
    assert_eq!(
        status,
        ServerMessage::Status {
            connected: false,
            state: Some(NegotiationState::AnswerSent),
        }
    );
    assert!(!connection_id.is_empty());
}

#[tokio::test]
async fn test_connected_state_is_reported_and_close_is_relayed() {
    // Arrange
    let server = start_server().await;
    let mut ws = connect(server.addr).await;
    let ServerMessage::Welcome { connection_id } = recv(&mut ws).await else {
        panic!("first message must be welcome");
    };
    send(&mut ws, r#"{"type":"offer","sdp":"v=0"}"#).await;
    recv(&mut ws).await;
    let id = pokeremote_core::ConnectionId::new(connection_id);
    let peer = server.peers.peer_for(&id).unwrap();

    // Act
    peer.emit_state(PeerConnectionState::Connected);
    wait_until("connected", || server.service.host().is_connected(&id)).await;
    send(&mut ws, r#"{"type":"status"}"#).await;
    let status = recv(&mut ws).await;
    peer.emit_state(PeerConnectionState::Disconnected);
    let closed = recv(&mut ws).await;

    // Assert
    assert_eq!(
        status,
        ServerMessage::Status {
            connected: true,
            state: Some(NegotiationState::Connected),
        }
    );
    assert_eq!(
        closed,
        ServerMessage::ConnectionClosed {
            state: NegotiationState::Disconnected,
        }
    );
}

#[tokio::test]
async fn test_malformed_frame_keeps_socket_open() {
    let server = start_server().await;
    let mut ws = connect(server.addr).await;
    recv(&mut ws).await;

    send(&mut ws, "definitely not json").await;
    let error = recv(&mut ws).await;
    send(&mut ws, r#"{"type":"status"}"#).await;
    let status = recv(&mut ws).await;

    assert!(matches!(error, ServerMessage::Error { .. }));
    assert!(matches!(status, ServerMessage::Status { connected: false, .. }));
}

#[tokio::test]
async fn test_closing_socket_tears_session_down() {
    // Arrange
    let server = start_server().await;
    let mut ws = connect(server.addr).await;
    recv(&mut ws).await;
    send(&mut ws, r#"{"type":"offer","sdp":"v=0"}"#).await;
    recv(&mut ws).await;
    assert_eq!(server.service.host().session_count(), 1);

    // Act
    ws.close(None).await.unwrap();

    // Assert
    wait_until("session removed", || {
        server.service.host().session_count() == 0 && server.service.client_count() == 0
    })
    .await;
    assert!(server.peers.peers()[0].is_closed());
}

#[tokio::test]
async fn test_two_clients_get_independent_sessions() {
    let server = start_server().await;
    let mut a = connect(server.addr).await;
    let mut b = connect(server.addr).await;
    recv(&mut a).await;
    recv(&mut b).await;

    send(&mut a, r#"{"type":"offer","sdp":"v=0"}"#).await;
    send(&mut b, r#"{"type":"offer","sdp":"v=0"}"#).await;
    recv(&mut a).await;
    recv(&mut b).await;
    send(&mut a, r#"{"type":"offer","sdp":"v=0"}"#).await;
    let duplicate = recv(&mut a).await;

    assert_eq!(server.service.host().session_count(), 2);
    assert!(matches!(duplicate, ServerMessage::Error { .. }));
}

#[tokio::test]
async fn test_shutdown_flag_stops_server_and_closes_sessions() {
    // Arrange
    let server = start_server().await;
    let mut ws = connect(server.addr).await;
    recv(&mut ws).await;
    send(&mut ws, r#"{"type":"offer","sdp":"v=0"}"#).await;
    recv(&mut ws).await;

    // Act
    server.running.store(false, Ordering::Relaxed);
    let outcome = tokio::time::timeout(Duration::from_secs(2), server.task).await;

    // Assert
    assert!(outcome.expect("server did not stop").unwrap().is_ok());
    assert_eq!(server.service.host().session_count(), 0);
}
