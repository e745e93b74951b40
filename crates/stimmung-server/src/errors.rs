//! Server error types.

use thiserror::Error;

/// Errors surfaced by the transport layer.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Other socket IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The configured display-name pattern does not compile.
    #[error("invalid name pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    /// A configuration value would break every session.
    #[error("invalid config {field}: {reason}")]
    InvalidConfig {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// The room actor has stopped.
    #[error("room is unavailable")]
    RoomUnavailable,
}
