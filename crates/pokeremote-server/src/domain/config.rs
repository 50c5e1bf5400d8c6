//! Host configuration schema.
//!
//! [`HostConfig`] is read from a TOML file at startup and then overridden by
//! CLI flags.  Every field has a default, so a missing file, an empty file,
//! or a file that only sets a couple of keys all produce a working config.
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 5000
//! log_level = "info"
//!
//! [capture]
//! width = 1280          # 0/0 = full screen
//! height = 720
//! frame_rate = 15
//! jpeg_quality = 70
//!
//! [webrtc]
//! ice_servers = ["stun:stun.l.google.com:19302"]
//!
//! [input]
//! extended_buttons = false
//! release_held_keys_on_teardown = true
//! ```
//!
//! # Serde default values (for beginners)
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the key is absent from the TOML file.  Whole sections
//! carry `#[serde(default)]`, which falls back to the section's `Default`
//! impl when the `[section]` header itself is missing.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use pokeremote_core::{CaptureConfig, KeyMap, KeyPlatform};
use pokeremote_host::SessionSettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for loading and validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed fine but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub capture: CaptureSection,
    #[serde(default)]
    pub webrtc: WebRtcSection,
    #[serde(default)]
    pub input: InputSection,
}

/// Signaling listener and logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// IP address to bind the signaling socket to.  `"0.0.0.0"` binds all
    /// interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port of the signaling socket.
    #[serde(default = "default_port")]
    pub port: u16,
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Screen region, cadence, and encoding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureSection {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    /// Region width; `0` together with `height = 0` means full screen.
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// JPEG quality, 1 (smallest) to 100 (best).
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Upper bound on how long stopping a capture loop may take.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

/// Peer-connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebRtcSection {
    /// STUN/TURN server URLs.
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<String>,
    #[serde(default = "default_video_channel_label")]
    pub video_channel_label: String,
    /// SCTP stream id of the pre-negotiated video channel.  The client must
    /// create its side of the channel with the same id.
    #[serde(default = "default_video_channel_id")]
    pub video_channel_id: u16,
}

/// Key injection behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputSection {
    /// Also map the `X`/`Y`/`L`/`R` buttons.
    #[serde(default)]
    pub extended_buttons: bool,
    /// Release keys a client left pressed when its session ends.
    #[serde(default = "default_true")]
    pub release_held_keys_on_teardown: bool,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_frame_rate() -> u32 {
    15
}
fn default_jpeg_quality() -> u8 {
    70
}
fn default_stop_timeout_ms() -> u64 {
    1000
}
fn default_ice_servers() -> Vec<String> {
    vec!["stun:stun.l.google.com:19302".to_string()]
}
fn default_video_channel_label() -> String {
    "video".to_string()
}
fn default_video_channel_id() -> u16 {
    1
}
fn default_true() -> bool {
    true
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            frame_rate: default_frame_rate(),
            jpeg_quality: default_jpeg_quality(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl Default for WebRtcSection {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
            video_channel_label: default_video_channel_label(),
            video_channel_id: default_video_channel_id(),
        }
    }
}

impl Default for InputSection {
    fn default() -> Self {
        Self {
            extended_buttons: false,
            release_held_keys_on_teardown: default_true(),
        }
    }
}

// ── Derived settings ──────────────────────────────────────────────────────────

impl HostConfig {
    /// Checks the values serde cannot check on its own.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.capture.frame_rate == 0 {
            return Err(ConfigError::Invalid {
                field: "capture.frame_rate",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return Err(ConfigError::Invalid {
                field: "capture.jpeg_quality",
                reason: format!("{} is outside 1..=100", self.capture.jpeg_quality),
            });
        }
        if (self.capture.width == 0) != (self.capture.height == 0) {
            return Err(ConfigError::Invalid {
                field: "capture.width",
                reason: "width and height must both be 0 (full screen) or both be set"
                    .to_string(),
            });
        }
        if self.webrtc.video_channel_label.is_empty() {
            return Err(ConfigError::Invalid {
                field: "webrtc.video_channel_label",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// The socket address the signaling server binds to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `bind_address` is not an IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .server
            .bind_address
            .parse()
            .map_err(|_| ConfigError::Invalid {
                field: "server.bind_address",
                reason: format!("'{}' is not an IP address", self.server.bind_address),
            })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            x: self.capture.x,
            y: self.capture.y,
            width: self.capture.width,
            height: self.capture.height,
            frame_rate: self.capture.frame_rate,
        }
    }

    /// Per-session tunables for the session engine.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            capture: self.capture_config(),
            stop_timeout: Duration::from_millis(self.capture.stop_timeout_ms),
            video_label: self.webrtc.video_channel_label.clone(),
            video_channel_id: self.webrtc.video_channel_id,
            release_held_keys_on_teardown: self.input.release_held_keys_on_teardown,
            ..SessionSettings::default()
        }
    }

    /// The key map for `platform`, with extension buttons if enabled.
    pub fn keymap(&self, platform: KeyPlatform) -> KeyMap {
        if self.input.extended_buttons {
            KeyMap::with_extensions(platform)
        } else {
            KeyMap::standard(platform)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
