//! # stimmung-server
//!
//! Axum HTTP + `WebSocket` transport for the Stimmung room.
//!
//! - `WebSocket` gateway at `/ws`: admission, per-client send queue,
//!   heartbeat, frame forwarding
//! - A single room actor that owns all room state and applies events in
//!   arrival order
//! - `/health` and `/metrics` endpoints
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod admission;
pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod room_actor;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use admission::{Admission, AdmissionError, AdmissionRequest, Admitted, NamePatternAdmission, OpenAdmission};
pub use config::ServerConfig;
pub use errors::ServerError;
pub use room_actor::{RoomActor, RoomCommand, RoomHandle};
pub use server::{StimmungServer, WS_PROTOCOL};
pub use shutdown::ShutdownCoordinator;
