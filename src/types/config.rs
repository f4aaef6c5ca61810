//! Configuration structures.
//!
//! Configuration is built from defaults, optionally overlaid by a JSON
//! document and command-line flags.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::errors::Result;

/// Global host configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Per-client dispatcher limits.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Suspend/resume state machine tuning.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

impl Config {
    /// Parse a JSON config document. Missing sections fall back to defaults.
    pub fn from_json(doc: &str) -> Result<Self> {
        Ok(serde_json::from_str(doc)?)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IPC server bind address (TCP).
    pub listen_addr: String,

    /// Idle connections are dropped after this long without a frame.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Slow consumers that cannot accept a frame within this window are dropped.
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:50071".to_string(),
            read_timeout: Duration::from_secs(300),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum concurrently open client sessions.
    pub max_sessions: usize,

    /// Maximum frame payload size in bytes for framed transports.
    pub max_frame_bytes: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_sessions: 256,
            max_frame_bytes: 1024 * 1024,
        }
    }
}

/// Lifecycle state machine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Settle time applied before each transition is committed.
    #[serde(with = "humantime_serde")]
    pub transition_delay: Duration,
}
