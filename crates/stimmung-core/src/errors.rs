//! Error types for room event processing and delivery.
//!
//! None of these are fatal. An [`EventError`] means an inbound event was
//! dropped without changing state; a [`DeliveryError`] means one recipient
//! missed one message.

use thiserror::Error;

use crate::ids::{ParticipantId, SessionKey};

/// Why an inbound event was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// The session was never opened (or is already closed).
    #[error("session {0} is not open")]
    UnknownSession(SessionKey),
    /// The session already joined; a second join is ignored.
    #[error("session {0} already joined the room")]
    DuplicateJoin(SessionKey),
    /// The session sent a participant-only event before joining.
    #[error("session {0} has not joined the room")]
    NotJoined(SessionKey),
    /// A kick referenced an id that is not active.
    #[error("no active participant with id {id}")]
    UnknownTarget {
        /// The id the event referenced.
        id: ParticipantId,
    },
    /// The payload could not be parsed as an inbound event.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    /// The join name does not match the configured name pattern.
    #[error("display name {0:?} is not allowed")]
    InvalidName(String),
    /// The moderation policy disables this action.
    #[error("{action} is disabled by the room policy")]
    Forbidden {
        /// Event kind that was refused.
        action: &'static str,
    },
}

/// Why a single send to a session failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The session's outbound channel is closed.
    #[error("session channel closed")]
    Closed,
    /// The session's outbound queue is full.
    #[error("session queue full")]
    QueueFull,
}

/// Encoding or decoding failure at the wire boundary.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON could not be parsed or produced.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
