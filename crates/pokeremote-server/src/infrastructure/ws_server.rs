//! WebSocket signaling server: accept loop and per-client tasks.
//!
//! This module is responsible for:
//!
//! 1. Accepting TCP connections on a bound listener.
//! 2. Upgrading each connection to a WebSocket session.
//! 3. Registering the client with the [`SignalingService`], which assigns its
//!    connection id.
//! 4. Running two concurrent halves per client:
//!    - **Reader**: parses JSON text frames and hands them to the service.
//!    - **Writer**: drains the client's outbound channel into the socket.
//! 5. Tearing the client's session down when the socket closes.
//! 6. Stopping the accept loop, then closing every session, when the
//!    `running` flag is cleared.
//!
//! # Scalability
//!
//! Each client runs in its own Tokio task.  The accept loop never blocks on a
//! client: it accepts a connection and immediately spawns a task for it
//! before accepting the next one.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use crate::application::SignalingService;

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the signaling listener.
///
/// # Errors
///
/// Returns an error if the address is in use or the process lacks permission
/// to bind it.
pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind signaling listener on {addr}"))
}

/// Runs the accept loop on `listener` until `running` is set to `false`,
/// then closes every session.
///
/// # Errors
///
/// Currently always returns `Ok`; accept errors are logged and skipped.
pub async fn run_server(
    listener: TcpListener,
    service: Arc<SignalingService>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    match listener.local_addr() {
        Ok(addr) => info!("signaling server listening on {addr}"),
        Err(e) => warn!("signaling server listening (address unknown: {e})"),
    }

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Short timeout so the loop notices the shutdown flag even when no
        // client is connecting.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new connection from {peer_addr}");
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    handle_client(stream, peer_addr, service).await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    let closed = service.shutdown().await;
    info!(closed, "all sessions closed");
    Ok(())
}

// ── Per-client handler ────────────────────────────────────────────────────────

async fn handle_client(raw_stream: TcpStream, peer_addr: SocketAddr, service: Arc<SignalingService>) {
    match run_client(raw_stream, peer_addr, service).await {
        Ok(()) => debug!("connection {peer_addr} closed normally"),
        Err(e) => warn!("connection {peer_addr} closed with error: {e:#}"),
    }
}

async fn run_client(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    service: Arc<SignalingService>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (id, mut outbound) = service.connect();
    info!(%id, %peer_addr, "signaling socket established");

    // ── Writer: outbound channel → socket ────────────────────────────────────
    let writer_id = id.clone();
    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    error!(id = %writer_id, "JSON serialization error: {e}");
                    continue;
                }
            };
            if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                debug!(id = %writer_id, "WebSocket send failed (client gone)");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // ── Reader: socket → service ─────────────────────────────────────────────
    loop {
        let frame = match ws_rx.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                debug!(%id, "WebSocket closed");
                break;
            }
            Some(Err(e)) => {
                warn!(%id, "WebSocket error: {e}");
                break;
            }
            None => {
                debug!(%id, "WebSocket stream ended");
                break;
            }
        };

        match frame {
            WsMessage::Text(text) => service.handle_text(&id, &text).await,
            WsMessage::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => service.handle_text(&id, text).await,
                Err(_) => warn!(%id, "non-UTF-8 binary frame ignored"),
            },
            WsMessage::Ping(data) => debug!(%id, "WebSocket ping ({} bytes)", data.len()),
            WsMessage::Pong(_) => debug!(%id, "WebSocket pong"),
            WsMessage::Close(_) => {
                debug!(%id, "WebSocket Close frame received");
                break;
            }
            WsMessage::Frame(_) => {}
        }
    }

    // Removing the client drops the outbound sender, which ends the writer
    // once it has flushed what is queued.
    service.disconnect(&id).await;
    let abort = writer.abort_handle();
    if timeout(Duration::from_secs(1), writer).await.is_err() {
        abort.abort();
    }
    Ok(())
}
