//! Wire format: the inbound event envelope and outbound messages.
//!
//! Both directions are JSON objects discriminated by a `"type"` field. Every
//! outbound message is produced by `serde_json` from an [`OutboundMessage`];
//! user-supplied text is never spliced into JSON by hand.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cards::Card;
use crate::errors::ProtocolError;
use crate::ids::ParticipantId;
use crate::registry::RosterEntry;

/// An encoded outbound message, shared between all recipients.
pub type Payload = Arc<str>;

/// Event sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundEvent {
    /// Enter the room under a display name.
    Join {
        /// Requested display name.
        name: String,
    },
    /// Relay a chat message to everyone.
    Msg {
        /// Message text.
        msg: String,
    },
    /// Raise a card.
    Raise {
        /// Card label.
        card: String,
    },
    /// Lower a card.
    Lower {
        /// Card label.
        card: String,
    },
    /// Clear every card in the room.
    Reset,
    /// Disconnect another participant.
    Kick {
        /// Target participant.
        id: ParticipantId,
    },
    /// Leave the room without closing the socket.
    Leave,
    /// Any `type` this server does not know.
    #[serde(other)]
    Unknown,
}

impl InboundEvent {
    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Wire name of the event kind (`"unknown"` for unrecognized kinds).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Msg { .. } => "msg",
            Self::Raise { .. } => "raise",
            Self::Lower { .. } => "lower",
            Self::Reset => "reset",
            Self::Kick { .. } => "kick",
            Self::Leave => "leave",
            Self::Unknown => "unknown",
        }
    }
}

/// Whether a card echo announces a raise or a lower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardAction {
    /// The card went up.
    Raise,
    /// The card went down.
    Lower,
}

/// A card as it appears inside an `all` snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardView {
    /// Always [`CardAction::Raise`] in snapshots.
    #[serde(rename = "type")]
    pub action: CardAction,
    /// Card label.
    pub card: String,
    /// Owner id.
    pub id: ParticipantId,
    /// Owner display name.
    pub name: String,
}

impl From<&Card> for CardView {
    fn from(card: &Card) -> Self {
        Self {
            action: CardAction::Raise,
            card: card.label.clone(),
            id: card.owner_id.clone(),
            name: card.owner_name.clone(),
        }
    }
}

/// Message sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage {
    /// Full card snapshot.
    All {
        /// Raised cards, oldest first.
        cards: Vec<CardView>,
    },
    /// Participant roster.
    Connected {
        /// Active participants in join order.
        connected: Vec<RosterEntry>,
    },
    /// Relayed chat message.
    Msg {
        /// Sender display name.
        name: String,
        /// Message text.
        msg: String,
    },
    /// A card went up.
    Raise {
        /// Card label.
        card: String,
        /// Owner id.
        id: ParticipantId,
        /// Owner display name.
        name: String,
    },
    /// A card went down.
    Lower {
        /// Card label.
        card: String,
        /// Owner id.
        id: ParticipantId,
        /// Owner display name.
        name: String,
    },
    /// The board was cleared.
    Reset,
}

impl OutboundMessage {
    /// Snapshot message for a card list.
    pub fn snapshot(cards: &[Card]) -> Self {
        Self::All {
            cards: cards.iter().map(CardView::from).collect(),
        }
    }

    /// Wire name of the message kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::All { .. } => "all",
            Self::Connected { .. } => "connected",
            Self::Msg { .. } => "msg",
            Self::Raise { .. } => "raise",
            Self::Lower { .. } => "lower",
            Self::Reset => "reset",
        }
    }

    /// Serialize to a shareable payload.
    pub fn encode(&self) -> Result<Payload, ProtocolError> {
        Ok(Arc::from(serde_json::to_string(self)?))
    }
}
