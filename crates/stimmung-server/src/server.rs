//! `StimmungServer`: Axum HTTP + WebSocket server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use stimmung_core::SessionKey;
use stimmung_core::room::name_pattern;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::admission::{Admission, AdmissionRequest, NamePatternAdmission, OpenAdmission};
use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_ADMISSION_REFUSED_TOTAL;
use crate::room_actor::{RoomActor, RoomHandle, ServerRoom};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_ws_session;

/// WebSocket subprotocol offered at `/ws`.
pub const WS_PROTOCOL: &str = "stimmung";

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Sender side of the room actor.
    pub room: RoomHandle,
    /// Upgrade-time admission policy.
    pub admission: Arc<dyn Admission>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
    next_session: Arc<AtomicU64>,
}

/// The Stimmung server.
pub struct StimmungServer {
    config: Arc<ServerConfig>,
    room: RoomHandle,
    admission: Arc<dyn Admission>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
    next_session: Arc<AtomicU64>,
}

impl StimmungServer {
    /// Create a server and spawn its room actor.
    ///
    /// Fails on a config that would break sessions or a pattern that does
    /// not compile. With a name pattern configured, join names are validated
    /// against it and admission pins a valid `?name=` query parameter.
    pub fn new(config: ServerConfig, metrics: PrometheusHandle) -> Result<Self, ServerError> {
        config.validate()?;
        let pattern = config.name_pattern.as_deref().map(name_pattern).transpose()?;

        let mut room: ServerRoom = ServerRoom::new(config.moderation());
        let admission: Arc<dyn Admission> = match pattern {
            Some(pattern) => {
                room = room.with_name_pattern(pattern.clone());
                Arc::new(NamePatternAdmission::new(pattern))
            }
            None => Arc::new(OpenAdmission),
        };
        let (room, task) = RoomActor::spawn(room);
        drop(task);

        Ok(Self {
            config: Arc::new(config),
            room,
            admission,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
            next_session: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Replace the admission policy.
    #[must_use]
    pub fn with_admission(mut self, admission: Arc<dyn Admission>) -> Self {
        self.admission = admission;
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            room: self.room.clone(),
            admission: self.admission.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            next_session: self.next_session.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the server task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
            info!("server stopped");
        });

        info!(addr = %local_addr, "stimmung server listening");
        Ok((local_addr, handle))
    }

    /// Sender side of the room actor.
    pub fn room(&self) -> &RoomHandle {
        &self.room
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /ws
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let request = AdmissionRequest {
        query,
        origin: headers
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
    };
    let admitted = match state.admission.admit(&request) {
        Ok(admitted) => admitted,
        Err(e) => {
            warn!(error = %e, origin = ?request.origin, "connection refused");
            counter!(WS_ADMISSION_REFUSED_TOTAL).increment(1);
            return (StatusCode::FORBIDDEN, e.to_string()).into_response();
        }
    };

    let key = SessionKey(state.next_session.fetch_add(1, Ordering::Relaxed));
    let shutdown = state.shutdown.token();
    ws.protocols([WS_PROTOCOL])
        .max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            state.shutdown.track(run_ws_session(
                socket,
                key,
                admitted.display_name,
                state.room,
                state.config,
                shutdown,
            ))
        })
        .into_response()
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let stats = state.room.stats().await.ok();
    let status = if stats.is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health::health_check(state.start_time, stats)))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}
