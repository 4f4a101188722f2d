//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tbibi_settings::TbibiSettings;

/// Configuration for the chat server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Browser origins allowed by CORS. Empty allows any origin.
    pub allowed_origins: Vec<String>,
    /// Bounded outbound queue length per session.
    pub outbound_queue_capacity: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a session after this many seconds without inbound traffic.
    pub heartbeat_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Persist chat messages received over WebSocket before routing them.
    pub persist_messages: bool,
    /// How long shutdown waits for sessions to drain.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            allowed_origins: Vec::new(),
            outbound_queue_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 1024 * 1024,
            persist_messages: true,
            shutdown_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Project the server-facing sections of the loaded settings.
    pub fn from_settings(settings: &TbibiSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            allowed_origins: settings.server.allowed_origins.clone(),
            outbound_queue_capacity: settings.realtime.outbound_queue_capacity,
            heartbeat_interval_secs: settings.realtime.heartbeat_interval_secs,
            heartbeat_timeout_secs: settings.realtime.heartbeat_timeout_secs,
            max_message_size: settings.realtime.max_message_size,
            persist_messages: settings.realtime.persist_messages,
            shutdown_timeout_secs: settings.server.shutdown_timeout_secs,
        }
    }

    /// Ping cadence and inactivity limit for session writers.
    ///
    /// A zero interval is raised to [`Heartbeat::MIN_INTERVAL`].
    pub fn heartbeat(&self) -> Heartbeat {
        Heartbeat {
            interval: Duration::from_secs(self.heartbeat_interval_secs)
                .max(Heartbeat::MIN_INTERVAL),
            timeout: Duration::from_secs(self.heartbeat_timeout_secs),
        }
    }

    /// Shutdown drain timeout.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Ping cadence and inactivity limit applied by each session's writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Heartbeat {
    /// Time between pings.
    pub interval: Duration,
    /// Close the session when nothing was received for this long.
    pub timeout: Duration,
}

impl Heartbeat {
    /// Shortest ping period a writer will run with.
    pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

    /// `interval`, raised to [`Self::MIN_INTERVAL`] if shorter.
    pub fn ping_period(&self) -> Duration {
        self.interval.max(Self::MIN_INTERVAL)
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        ServerConfig::default().heartbeat()
    }
}
