//! One admitted client as the room sees it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::Mutex;
use stimmung_core::{DeliveryError, Payload, SessionHandle, SessionKey};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::metrics::WS_BROADCAST_DROPS_TOTAL;

/// Room-side handle for a socket: a bounded outbound queue, a pong flag for
/// the watchdog, and a token that ends the session.
///
/// Payloads never block the room. A full queue or a gone writer is reported
/// to the broadcaster, which marks the connection stale; the room then
/// cancels the close token so the session ends and reports `Closed`.
pub struct ClientConnection {
    /// Transport session key.
    pub key: SessionKey,
    outbound: mpsc::Sender<Payload>,
    opened: Instant,
    heard: AtomicBool,
    last_heard: Mutex<Instant>,
    dropped: AtomicU64,
    close: CancellationToken,
}

impl ClientConnection {
    /// Wrap the writer's queue. The client counts as heard at creation.
    pub fn new(key: SessionKey, outbound: mpsc::Sender<Payload>) -> Self {
        let opened = Instant::now();
        Self {
            key,
            outbound,
            opened,
            heard: AtomicBool::new(true),
            last_heard: Mutex::new(opened),
            dropped: AtomicU64::new(0),
            close: CancellationToken::new(),
        }
    }

    /// Record a ping or pong from the client.
    pub fn heard_from(&self) {
        *self.last_heard.lock() = Instant::now();
        self.heard.store(true, Ordering::Relaxed);
    }

    /// Whether the client was heard since the previous call. Clears the flag.
    pub fn take_heard(&self) -> bool {
        self.heard.swap(false, Ordering::Relaxed)
    }

    /// Time since the last ping or pong, or since creation.
    pub fn silent_for(&self) -> Duration {
        self.last_heard.lock().elapsed()
    }

    /// Time since the connection was created.
    pub fn open_for(&self) -> Duration {
        self.opened.elapsed()
    }

    /// Payloads this client never got.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Cancelled by a kick, the watchdog, or the session ending.
    pub fn close_token(&self) -> CancellationToken {
        self.close.clone()
    }

    /// Whether the close token has fired.
    pub fn is_closing(&self) -> bool {
        self.close.is_cancelled()
    }
}

impl SessionHandle for ClientConnection {
    fn send(&self, payload: &Payload) -> Result<(), DeliveryError> {
        let err = match self.outbound.try_send(payload.clone()) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(_)) => DeliveryError::QueueFull,
            Err(TrySendError::Closed(_)) => DeliveryError::Closed,
        };
        let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
        counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
        Err(err)
    }

    fn close(&self) {
        self.close.cancel();
    }
}
