//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and implement
//! [`Default`] with production values. Every struct is `#[serde(default)]`
//! so a partial JSON file only needs to name the keys it changes.

mod server;
mod storage;

pub use server::*;
pub use storage::*;

use serde::{Deserialize, Serialize};

/// Root settings type for the tbibi backend.
///
/// Loaded from `~/.tbibi/settings.json` with defaults applied for missing
/// fields. Environment variables can override specific values. Example:
///
/// ```json
/// {
///   "server": { "port": 4000, "allowedOrigins": ["http://localhost:3000"] },
///   "realtime": { "outboundQueueCapacity": 64 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TbibiSettings {
    /// HTTP listener and CORS settings.
    pub server: ServerSettings,
    /// WebSocket chat session tuning.
    pub realtime: RealtimeSettings,
    /// Chat store database settings.
    pub database: DatabaseSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(TbibiSettings::default()).unwrap();
        assert!(json["server"].get("allowedOrigins").is_some());
        assert!(json["realtime"].get("outboundQueueCapacity").is_some());
        assert!(json["database"].get("busyTimeoutMs").is_some());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: TbibiSettings =
            serde_json::from_str(r#"{"realtime": {"persistMessages": false}}"#).unwrap();
        assert!(!settings.realtime.persist_messages);
        assert_eq!(settings.realtime.outbound_queue_capacity, 256);
        assert_eq!(settings.server.port, 3001);
    }

    #[test]
    fn empty_json_is_default() {
        let settings: TbibiSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.logging.level, "info");
    }
}
