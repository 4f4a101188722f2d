//! HTTP listener and realtime chat settings.

use serde::{Deserialize, Serialize};

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP + WebSocket port.
    pub port: u16,
    /// Browser origins allowed by CORS. Empty means any origin.
    pub allowed_origins: Vec<String>,
    /// Seconds to wait for sessions to drain on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            allowed_origins: Vec::new(),
            shutdown_timeout_secs: 10,
        }
    }
}

/// Per-connection chat session settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeSettings {
    /// Bounded outbound queue length per session. Messages beyond this are dropped.
    pub outbound_queue_capacity: usize,
    /// Interval between server pings, in seconds.
    pub heartbeat_interval_secs: u64,
    /// A session with no inbound traffic for this long is closed.
    pub heartbeat_timeout_secs: u64,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
    /// Store chat messages received over WebSocket before forwarding them.
    pub persist_messages: bool,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 1024 * 1024,
            persist_messages: true,
        }
    }
}
