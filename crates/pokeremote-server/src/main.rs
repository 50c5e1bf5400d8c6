//! PokeRemote host: entry point.
//!
//! Runs the session engine behind a JSON-over-WebSocket signaling server.
//! A phone or browser connects to the socket, sends its WebRTC offer, and from
//! then on receives the host's screen and drives its keyboard over WebRTC
//! data channels.
//!
//! # Usage
//!
//! ```text
//! pokeremote-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>   TOML config file [default: pokeremote.toml]
//!   --port   <PORT>   Signaling port (overrides [server].port)
//!   --bind   <ADDR>   Bind address (overrides [server].bind_address)
//!   --fps    <N>      Capture frame rate (overrides [capture].frame_rate)
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable             | Flag       |
//! |----------------------|------------|
//! | `POKEREMOTE_CONFIG`  | `--config` |
//! | `POKEREMOTE_PORT`    | `--port`   |
//! | `POKEREMOTE_BIND`    | `--bind`   |
//! | `POKEREMOTE_FPS`     | `--fps`    |
//!
//! CLI args take precedence over environment variables, which take
//! precedence over the config file.
//!
//! Logging honours `RUST_LOG`; without it, `[server].log_level` applies.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pokeremote_core::KeyPlatform;
use pokeremote_host::infrastructure::capture::jpeg::JpegFrameEncoder;
use pokeremote_host::infrastructure::capture::NativeCaptureFactory;
use pokeremote_host::infrastructure::input_injection::native_injector;
use pokeremote_host::infrastructure::peer::rtc::WebRtcPeerFactory;
use pokeremote_host::{SessionContext, SessionHost};
use pokeremote_server::application::SignalingService;
use pokeremote_server::domain::HostConfig;
use pokeremote_server::infrastructure::{load_config, run_server, ws_server};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// PokeRemote host.
///
/// Streams this machine's screen to a remote gamepad client and replays the
/// client's button presses as keyboard input.
#[derive(Debug, Parser)]
#[command(
    name = "pokeremote-server",
    about = "Remote-control host: WebRTC screen streaming and gamepad-to-keyboard input",
    version
)]
struct Cli {
    /// Path to the TOML config file.  A missing file means "all defaults".
    #[arg(long, default_value = "pokeremote.toml", env = "POKEREMOTE_CONFIG")]
    config: PathBuf,

    /// TCP port for the signaling WebSocket.
    #[arg(long, env = "POKEREMOTE_PORT")]
    port: Option<u16>,

    /// IP address to bind the signaling socket to.
    ///
    /// Use `0.0.0.0` to accept connections from any network interface, or
    /// `127.0.0.1` to accept only local connections.
    #[arg(long, env = "POKEREMOTE_BIND")]
    bind: Option<String>,

    /// Capture frame rate in frames per second.
    #[arg(long, env = "POKEREMOTE_FPS")]
    fps: Option<u32>,
}

impl Cli {
    /// Applies the CLI overrides on top of `config` and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the combined configuration is invalid.
    fn apply_overrides(&self, mut config: HostConfig) -> anyhow::Result<HostConfig> {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = &self.bind {
            config.server.bind_address = bind.clone();
        }
        if let Some(fps) = self.fps {
            config.capture.frame_rate = fps;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    /// Loads the config file named by `--config` and applies the overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the combined configuration is invalid.
    fn into_host_config(self) -> anyhow::Result<HostConfig> {
        let file = load_config(&self.config)
            .with_context(|| format!("failed to load config from {}", self.config.display()))?;
        self.apply_overrides(file)
    }
}

/// Wires the production backends into a session context.
///
/// # Errors
///
/// Returns an error if the platform input API cannot be opened (for example
/// no X display on Linux).
fn build_context(config: &HostConfig) -> anyhow::Result<SessionContext> {
    let injector = native_injector().context("failed to initialise input injection")?;
    Ok(SessionContext {
        settings: config.session_settings(),
        peers: Arc::new(WebRtcPeerFactory::new(config.webrtc.ice_servers.clone())),
        capture: Arc::new(NativeCaptureFactory),
        encoder: Arc::new(JpegFrameEncoder::new(config.capture.jpeg_quality)),
        injector,
        keymap: config.keymap(KeyPlatform::native()),
    })
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and merged over the config file.
/// 2. `tracing_subscriber` is initialised.  `RUST_LOG` wins; otherwise the
///    configured `log_level` is used.
/// 3. The session engine is built with the native capture, injection, and
///    WebRTC backends, and its event relay is started.
/// 4. A Ctrl+C handler is spawned; it clears a shared `AtomicBool`.
/// 5. [`run_server`] accepts clients until the flag is cleared, then closes
///    every session.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_host_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    let addr = config.bind_addr().context("invalid bind address")?;
    info!(
        "PokeRemote host starting: signaling={addr}, fps={}, quality={}",
        config.capture.frame_rate, config.capture.jpeg_quality
    );

    // ── Session engine ────────────────────────────────────────────────────────
    let (host, events) = SessionHost::new(build_context(&config)?);
    let service = Arc::new(SignalingService::new(Arc::new(host)));
    tokio::spawn(Arc::clone(&service).run_relay(events));

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Main server loop ──────────────────────────────────────────────────────
    let listener = ws_server::bind(addr).await?;
    run_server(listener, service, running).await?;

    info!("PokeRemote host stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
