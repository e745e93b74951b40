//! Fan-out of outbound messages to joined connections.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::DeliveryError;
use crate::ids::SessionKey;
use crate::protocol::{OutboundMessage, Payload};
use crate::registry::ConnectionRegistry;

/// Transport session as seen by the room.
///
/// `send` must not block: implementations enqueue the payload and return.
/// `close` asks the transport to shut the session down; the transport later
/// reports the close back to the room like any other disconnect.
pub trait SessionHandle {
    /// Queue a payload for delivery.
    fn send(&self, payload: &Payload) -> Result<(), DeliveryError>;
    /// Request that the session be closed.
    fn close(&self);
}

impl<T: SessionHandle + ?Sized> SessionHandle for Arc<T> {
    fn send(&self, payload: &Payload) -> Result<(), DeliveryError> {
        (**self).send(payload)
    }

    fn close(&self) {
        (**self).close();
    }
}

/// Who receives a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every live joined connection.
    All,
    /// One joined connection.
    Session(SessionKey),
}

/// A message addressed to a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Recipients.
    pub target: Target,
    /// What to send.
    pub message: OutboundMessage,
}

impl Delivery {
    /// Address a message to everyone.
    pub fn to_all(message: OutboundMessage) -> Self {
        Self {
            target: Target::All,
            message,
        }
    }

    /// Address a message to one session.
    pub fn to_session(key: SessionKey, message: OutboundMessage) -> Self {
        Self {
            target: Target::Session(key),
            message,
        }
    }
}

/// Outcome of delivering one or more messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Successful sends.
    pub delivered: usize,
    /// Sessions whose send failed (now marked stale).
    pub failed: Vec<SessionKey>,
    /// Stale connections that were not attempted.
    pub skipped: usize,
}

impl DeliveryReport {
    /// Fold another report into this one.
    pub fn merge(&mut self, other: DeliveryReport) {
        self.delivered += other.delivered;
        self.failed.extend(other.failed);
        self.skipped += other.skipped;
    }
}

/// Delivers encoded messages to registry connections.
pub struct Broadcaster;

impl Broadcaster {
    /// Encode `delivery.message` once and send it to every addressed, live
    /// connection. A failed send marks that connection stale and moves on.
    pub fn deliver<S: SessionHandle>(
        registry: &mut ConnectionRegistry<S>,
        delivery: &Delivery,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let payload = match delivery.message.encode() {
            Ok(p) => p,
            Err(e) => {
                warn!(kind = delivery.message.kind(), error = %e, "failed to encode outbound message");
                return report;
            }
        };

        for conn in registry.iter() {
            let addressed = match delivery.target {
                Target::All => true,
                Target::Session(key) => conn.session_key == key,
            };
            if !addressed {
                continue;
            }
            if !conn.is_live() {
                report.skipped += 1;
                continue;
            }
            match conn.session.send(&payload) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(participant_id = %conn.id, session = %conn.session_key, error = %e, "failed to deliver message");
                    report.failed.push(conn.session_key);
                }
            }
        }

        for key in &report.failed {
            registry.mark_stale(*key);
        }

        debug!(
            kind = delivery.message.kind(),
            delivered = report.delivered,
            failed = report.failed.len(),
            skipped = report.skipped,
            "delivered message"
        );
        report
    }
}
