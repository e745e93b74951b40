//! `WebSocket` gateway: per-client connection state, heartbeat and the
//! session loop.

pub mod connection;
pub mod heartbeat;
pub mod session;
