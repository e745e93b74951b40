//! The room actor: one task that owns the [`Room`] and applies commands in
//! arrival order.
//!
//! Session tasks never touch room state. They send [`RoomCommand`]s through
//! a cloneable [`RoomHandle`]; the actor drains the channel and runs each
//! event to completion, including its deliveries, before reading the next.
//! The actor stops once every handle is dropped.
//!
//! The queue is bounded. A session that floods frames waits on its own
//! send while the actor catches up; other sessions are unaffected.

use std::sync::Arc;

use metrics::{counter, gauge};
use stimmung_core::{Applied, EventError, Room, RoomEvent, RoomStats, SessionKey};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::ServerError;
use crate::metrics::{ROOM_CARDS, ROOM_EVENTS_REJECTED_TOTAL, ROOM_EVENTS_TOTAL, ROOM_PARTICIPANTS};
use crate::websocket::connection::ClientConnection;

/// Commands buffered ahead of the actor.
pub const ROOM_QUEUE_CAPACITY: usize = 1024;

/// Room as driven by the server.
pub type ServerRoom = Room<Arc<ClientConnection>>;

/// Messages accepted by the room actor.
pub enum RoomCommand {
    /// A session was admitted and upgraded.
    Opened {
        /// Session key.
        key: SessionKey,
        /// Delivery handle for the session.
        session: Arc<ClientConnection>,
        /// Name pinned by admission.
        pinned_name: Option<String>,
    },
    /// A text frame arrived on a session.
    Message {
        /// Session key.
        key: SessionKey,
        /// Frame text.
        text: String,
    },
    /// A session ended.
    Closed {
        /// Session key.
        key: SessionKey,
    },
    /// Request current counters.
    Stats {
        /// Reply channel.
        reply: oneshot::Sender<RoomStats>,
    },
}

/// Cloneable sender side of the room actor.
#[derive(Clone)]
pub struct RoomHandle {
    tx: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    async fn send(&self, command: RoomCommand) -> Result<(), ServerError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ServerError::RoomUnavailable)
    }

    /// Report a newly opened session.
    pub async fn opened(
        &self,
        key: SessionKey,
        session: Arc<ClientConnection>,
        pinned_name: Option<String>,
    ) -> Result<(), ServerError> {
        self.send(RoomCommand::Opened {
            key,
            session,
            pinned_name,
        })
        .await
    }

    /// Forward a text frame. Waits while the queue is full.
    pub async fn message(&self, key: SessionKey, text: String) -> Result<(), ServerError> {
        self.send(RoomCommand::Message { key, text }).await
    }

    /// Report that a session ended.
    pub async fn closed(&self, key: SessionKey) -> Result<(), ServerError> {
        self.send(RoomCommand::Closed { key }).await
    }

    /// Fetch current counters.
    pub async fn stats(&self) -> Result<RoomStats, ServerError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Stats { reply }).await?;
        rx.await.map_err(|_| ServerError::RoomUnavailable)
    }
}

/// Owner of the room state.
pub struct RoomActor {
    room: ServerRoom,
    rx: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    /// Spawn the actor on the current runtime.
    pub fn spawn(room: ServerRoom) -> (RoomHandle, JoinHandle<()>) {
        Self::spawn_with_capacity(room, ROOM_QUEUE_CAPACITY)
    }

    /// Spawn with a custom queue length (at least one).
    pub fn spawn_with_capacity(room: ServerRoom, capacity: usize) -> (RoomHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let actor = Self { room, rx };
        let task = tokio::spawn(actor.run());
        (RoomHandle { tx }, task)
    }

    async fn run(mut self) {
        info!("room actor started");
        while let Some(command) = self.rx.recv().await {
            let event = match command {
                RoomCommand::Stats { reply } => {
                    let _ = reply.send(self.room.stats());
                    continue;
                }
                RoomCommand::Opened {
                    key,
                    session,
                    pinned_name,
                } => RoomEvent::Opened {
                    key,
                    session,
                    pinned_name,
                },
                RoomCommand::Message { key, text } => RoomEvent::Message { key, text },
                RoomCommand::Closed { key } => RoomEvent::Closed { key },
            };
            let applied = self.room.apply(event);
            self.record(&applied);
        }
        info!("room actor stopped");
    }

    #[allow(clippy::cast_precision_loss)]
    fn record(&self, applied: &Applied) {
        match &applied.outcome {
            Ok(kind) => {
                counter!(ROOM_EVENTS_TOTAL, "kind" => *kind).increment(1);
            }
            Err(e) => {
                counter!(ROOM_EVENTS_REJECTED_TOTAL, "reason" => rejection_reason(e)).increment(1);
                debug!(error = %e, "event dropped");
            }
        }
        if !applied.report.failed.is_empty() {
            warn!(
                failed = applied.report.failed.len(),
                delivered = applied.report.delivered,
                "some deliveries failed"
            );
        }
        let stats = self.room.stats();
        gauge!(ROOM_PARTICIPANTS).set(stats.participants as f64);
        gauge!(ROOM_CARDS).set(stats.cards as f64);
    }
}

fn rejection_reason(err: &EventError) -> &'static str {
    match err {
        EventError::UnknownSession(_) => "unknown_session",
        EventError::DuplicateJoin(_) => "duplicate_join",
        EventError::NotJoined(_) => "not_joined",
        EventError::UnknownTarget { .. } => "unknown_target",
        EventError::MalformedPayload(_) => "malformed_payload",
        EventError::InvalidName(_) => "invalid_name",
        EventError::Forbidden { .. } => "forbidden",
    }
}
