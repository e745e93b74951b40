//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may contain any subset of fields; missing fields keep their default.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Accepted `maxMessageSize` values, in bytes.
pub const MAX_MESSAGE_SIZE_RANGE: RangeInclusive<usize> = 64..=16 * 1024 * 1024;

/// Root settings for the Stimmung server.
///
/// ```json
/// {
///   "server": { "port": 9090 },
///   "room": { "namePattern": "[A-Za-z ]+", "allowKick": false }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StimmungSettings {
    /// Network and connection settings.
    pub server: ServerSettings,
    /// Room behavior.
    pub room: RoomSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl StimmungSettings {
    /// Reject combinations that would make the server misbehave.
    pub fn validate(&self) -> Result<()> {
        let server = &self.server;
        if server.heartbeat_interval_secs == 0 {
            return Err(SettingsError::invalid("heartbeatIntervalSecs", "must be positive"));
        }
        if server.heartbeat_timeout_secs < server.heartbeat_interval_secs {
            return Err(SettingsError::invalid(
                "heartbeatTimeoutSecs",
                format!(
                    "{}s is shorter than the {}s interval",
                    server.heartbeat_timeout_secs, server.heartbeat_interval_secs
                ),
            ));
        }
        if !MAX_MESSAGE_SIZE_RANGE.contains(&server.max_message_size) {
            return Err(SettingsError::invalid(
                "maxMessageSize",
                format!(
                    "{} is outside {}..={}",
                    server.max_message_size,
                    MAX_MESSAGE_SIZE_RANGE.start(),
                    MAX_MESSAGE_SIZE_RANGE.end()
                ),
            ));
        }
        if server.send_queue_capacity == 0 {
            return Err(SettingsError::invalid("sendQueueCapacity", "must be positive"));
        }
        if let Some(pattern) = &self.room.name_pattern {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(SettingsError::invalid("namePattern", format!("{pattern:?}: {e}")));
            }
        }
        Ok(())
    }
}

/// Network and connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP/WebSocket port. `0` picks a free port.
    pub port: u16,
    /// Seconds between WebSocket pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds without a pong before a client is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
    /// Per-client outbound queue length.
    pub send_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
        }
    }
}

/// Room behavior.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomSettings {
    /// Regex every display name must match in full. `None` accepts any name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_pattern: Option<String>,
    /// Whether any participant may clear all cards.
    pub allow_reset: bool,
    /// Whether any participant may disconnect another.
    pub allow_kick: bool,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            name_pattern: None,
            allow_reset: true,
            allow_kick: true,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults() {
        let s = StimmungSettings::default();
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.server.send_queue_capacity, 256);
        assert!(s.room.allow_reset);
        assert!(s.room.allow_kick);
        assert!(s.room.name_pattern.is_none());
        assert_eq!(s.logging.level, "info");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(StimmungSettings::default()).unwrap();
        assert_eq!(json["server"]["heartbeatIntervalSecs"], 30);
        assert_eq!(json["server"]["sendQueueCapacity"], 256);
        assert_eq!(json["room"]["allowKick"], true);
        assert!(json["room"].get("namePattern").is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: StimmungSettings =
            serde_json::from_str(r#"{"room": {"allowKick": false}}"#).unwrap();
        assert!(!s.room.allow_kick);
        assert!(s.room.allow_reset);
        assert_eq!(s.server.port, 8080);
    }

    #[test]
    fn validate_rejects_bad_pattern() {
        let mut s = StimmungSettings::default();
        s.room.name_pattern = Some("([a-z".into());
        assert_matches!(s.validate(), Err(SettingsError::Invalid { field: "namePattern", .. }));
    }

    #[test]
    fn validate_rejects_timeout_below_interval() {
        let mut s = StimmungSettings::default();
        s.server.heartbeat_interval_secs = 60;
        s.server.heartbeat_timeout_secs = 30;
        assert_matches!(s.validate(), Err(SettingsError::Invalid { .. }));
    }

    #[test]
    fn validate_rejects_message_size_out_of_range() {
        let mut s = StimmungSettings::default();
        s.server.max_message_size = 0;
        assert_matches!(s.validate(), Err(SettingsError::Invalid { field: "maxMessageSize", .. }));
        s.server.max_message_size = 64 * 1024 * 1024;
        assert_matches!(s.validate(), Err(SettingsError::Invalid { field: "maxMessageSize", .. }));
        s.server.max_message_size = 64;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_queue() {
        let mut s = StimmungSettings::default();
        s.server.send_queue_capacity = 0;
        assert!(s.validate().is_err());
    }
}
