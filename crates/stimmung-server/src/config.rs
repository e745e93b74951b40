//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stimmung_core::ModerationPolicy;
use stimmung_settings::StimmungSettings;

use crate::errors::ServerError;

/// Configuration for the Stimmung server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Heartbeat timeout in seconds.
    pub heartbeat_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound queue length per client.
    pub send_queue_capacity: usize,
    /// Full-match pattern for display names.
    pub name_pattern: Option<String>,
    /// Whether participants may reset all cards.
    pub allow_reset: bool,
    /// Whether participants may kick each other.
    pub allow_kick: bool,
}

impl ServerConfig {
    /// Moderation switches for the room.
    pub fn moderation(&self) -> ModerationPolicy {
        ModerationPolicy {
            allow_reset: self.allow_reset,
            allow_kick: self.allow_kick,
        }
    }

    /// Ping interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Pong timeout as a [`Duration`].
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// Reject values that would fail inside every upgraded session.
    pub fn validate(&self) -> Result<(), ServerError> {
        let invalid = |field, reason| Err(ServerError::InvalidConfig { field, reason });
        if self.heartbeat_interval_secs == 0 {
            return invalid("heartbeat_interval_secs", "must be positive");
        }
        if self.heartbeat_timeout_secs < self.heartbeat_interval_secs {
            return invalid("heartbeat_timeout_secs", "must not be shorter than the interval");
        }
        if self.send_queue_capacity == 0 {
            return invalid("send_queue_capacity", "must be positive");
        }
        if self.max_message_size == 0 {
            return invalid("max_message_size", "must be positive");
        }
        Ok(())
    }

    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
            name_pattern: None,
            allow_reset: true,
            allow_kick: true,
        }
    }
}

impl From<&StimmungSettings> for ServerConfig {
    fn from(settings: &StimmungSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            heartbeat_interval_secs: server.heartbeat_interval_secs,
            heartbeat_timeout_secs: server.heartbeat_timeout_secs,
            max_message_size: server.max_message_size,
            send_queue_capacity: server.send_queue_capacity,
            name_pattern: settings.room.name_pattern.clone(),
            allow_reset: settings.room.allow_reset,
            allow_kick: settings.room.allow_kick,
        }
    }
}
