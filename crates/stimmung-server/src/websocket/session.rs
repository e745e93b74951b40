//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use stimmung_core::{Payload, SessionKey};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::heartbeat::{Verdict, Watchdog};
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_HEARTBEAT_TIMEOUTS_TOTAL,
};
use crate::room_actor::RoomHandle;

/// How long the writer may take to flush a close frame after the reader ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Extract frame text. Binary frames are accepted when they are UTF-8.
fn frame_text(msg: &Message) -> Option<String> {
    match msg {
        Message::Text(t) => Some(t.as_str().to_owned()),
        Message::Binary(data) => std::str::from_utf8(data).ok().map(str::to_owned),
        _ => None,
    }
}

/// Run a WebSocket session for an admitted client.
///
/// 1. Registers the session with the room (pending until it joins)
/// 2. Forwards text frames to the room in arrival order
/// 3. Writes queued room messages and periodic pings to the socket
/// 4. Ends on client close, kick, heartbeat timeout, or server shutdown
/// 5. Reports the close to the room, which runs leave cleanup
#[instrument(skip_all, fields(session = %key))]
pub async fn run_ws_session(
    ws: WebSocket,
    key: SessionKey,
    pinned_name: Option<String>,
    room: RoomHandle,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Payload>(config.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(key, send_tx));
    let close = connection.close_token();

    if room.opened(key, connection.clone(), pinned_name).await.is_err() {
        warn!("room unavailable, dropping connection");
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    }

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    // Liveness watchdog; a timeout closes the session like a kick would.
    let heartbeat = {
        let connection = connection.clone();
        let watchdog = Watchdog::from_config(&config);
        let stop = close.clone();
        tokio::spawn(async move {
            if let Verdict::Unresponsive { missed } = watchdog.watch(connection.clone(), stop).await
            {
                warn!(
                    missed,
                    silent_for = ?connection.silent_for(),
                    "client unresponsive, disconnecting"
                );
                counter!(WS_HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
                connection.close_token().cancel();
            }
        })
    };

    // Outbound writer with periodic pings.
    let outbound = {
        let close = close.clone();
        let interval = config.heartbeat_interval();
        tokio::spawn(async move {
            let mut ping_interval = tokio::time::interval(interval);
            let _ = ping_interval.tick().await;

            loop {
                tokio::select! {
                    msg = send_rx.recv() => {
                        let Some(text) = msg else { break };
                        if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    _ = ping_interval.tick() => {
                        if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                            break;
                        }
                    }
                    () = close.cancelled() => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        })
    };

    loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            () = close.cancelled() => {
                debug!("close requested");
                break;
            }
            () = shutdown.cancelled() => {
                debug!("server shutting down");
                break;
            }
        };
        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "websocket read error");
                break;
            }
            None => break,
        };

        match msg {
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => connection.heard_from(),
            other => {
                let Some(text) = frame_text(&other) else {
                    debug!("ignoring non-UTF8 binary frame");
                    continue;
                };
                // A full room queue holds this reader only.
                let forwarded = tokio::select! {
                    sent = room.message(key, text) => sent,
                    () = close.cancelled() => break,
                    () = shutdown.cancelled() => break,
                };
                if forwarded.is_err() {
                    warn!("room unavailable, closing session");
                    break;
                }
            }
        }
    }

    // Ends the writer (with a close frame) and the heartbeat.
    connection.close_token().cancel();
    let _ = room.closed(key).await;

    let writer = outbound.abort_handle();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, outbound).await.is_err() {
        writer.abort();
    }
    heartbeat.abort();

    info!(dropped = connection.dropped(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.open_for().as_secs_f64());
}
