//! The set of currently raised cards.

use crate::ids::ParticipantId;

/// One raised card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    /// Participant that raised the card.
    pub owner_id: ParticipantId,
    /// Display name of the owner at raise time.
    pub owner_name: String,
    /// Caller-supplied card label (e.g. `"green"`).
    pub label: String,
}

impl Card {
    fn matches(&self, owner_id: &ParticipantId, label: &str) -> bool {
        self.owner_id == *owner_id && self.label == label
    }
}

/// Raised cards in raise order.
///
/// At most one card exists per `(owner_id, label)` pair.
#[derive(Debug, Default)]
pub struct CardState {
    cards: Vec<Card>,
}

impl CardState {
    /// Empty card set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every raised card, oldest first.
    pub fn all(&self) -> &[Card] {
        &self.cards
    }

    /// Raise a card. Returns `false` (and changes nothing) if the owner
    /// already has a card with this label up.
    pub fn raise(&mut self, owner_id: &ParticipantId, owner_name: &str, label: &str) -> bool {
        if self.cards.iter().any(|c| c.matches(owner_id, label)) {
            return false;
        }
        self.cards.push(Card {
            owner_id: owner_id.clone(),
            owner_name: owner_name.to_owned(),
            label: label.to_owned(),
        });
        true
    }

    /// Remove every card matching `(owner_id, label)`. Returns how many went.
    pub fn lower(&mut self, owner_id: &ParticipantId, label: &str) -> usize {
        let before = self.cards.len();
        self.cards.retain(|c| !c.matches(owner_id, label));
        before - self.cards.len()
    }

    /// Remove every card owned by `owner_id`.
    pub fn remove_all_for(&mut self, owner_id: &ParticipantId) -> usize {
        let before = self.cards.len();
        self.cards.retain(|c| c.owner_id != *owner_id);
        before - self.cards.len()
    }

    /// Clear the board.
    pub fn reset(&mut self) -> usize {
        let removed = self.cards.len();
        self.cards.clear();
        removed
    }

    /// Number of raised cards.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Whether no card is raised.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}
