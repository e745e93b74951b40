//! # stimmung-core
//!
//! In-memory state and event processing for a single Stimmung room.
//!
//! - [`ids`]: participant id allocation and transport session keys
//! - [`registry`]: the active connections, keyed by session and by id
//! - [`cards`]: the raised cards, deduplicated by `(owner, label)`
//! - [`protocol`]: inbound event envelope and outbound message encoding
//! - [`room`]: the event processor that ties the above together
//! - [`broadcast`]: fan-out of encoded messages to live sessions
//!
//! Nothing in this crate is async or locked. Callers are expected to drive a
//! [`room::Room`] from a single task so that every event is applied to
//! completion before the next one is looked at.

#![deny(unsafe_code)]

pub mod broadcast;
pub mod cards;
pub mod errors;
pub mod ids;
pub mod protocol;
pub mod registry;
pub mod room;

pub use broadcast::{Broadcaster, Delivery, DeliveryReport, SessionHandle, Target};
pub use cards::{Card, CardState};
pub use errors::{DeliveryError, EventError, ProtocolError};
pub use ids::{IdAllocator, ParticipantId, SessionKey};
pub use protocol::{InboundEvent, OutboundMessage, Payload};
pub use registry::{Connection, ConnectionRegistry, RosterEntry};
pub use room::{Applied, ModerationPolicy, Room, RoomEvent, RoomStats, Transition};
