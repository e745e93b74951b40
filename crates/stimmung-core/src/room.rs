//! The room event processor.
//!
//! A [`Room`] owns the connection registry and the card state and applies
//! one [`RoomEvent`] at a time. Processing an event yields a [`Transition`]:
//! the messages to deliver, the sessions to close, and the outcome. The
//! transition is computed before anything is sent, so delivery never
//! observes half-applied state.
//!
//! Sessions move through two states. An opened session is *pending*: it
//! receives nothing until it sends `join`. A joined session owns a
//! [`Connection`](crate::registry::Connection) and receives every broadcast
//! until it leaves or closes.

use std::collections::HashMap;

use rand::Rng;
use rand::rngs::StdRng;
use regex::Regex;
use tracing::{debug, info};

use crate::broadcast::{Broadcaster, Delivery, DeliveryReport, SessionHandle};
use crate::cards::CardState;
use crate::errors::EventError;
use crate::ids::{IdAllocator, SessionKey};
use crate::protocol::{InboundEvent, OutboundMessage};
use crate::registry::{Connection, ConnectionRegistry};

/// Something the transport observed on one session.
#[derive(Debug)]
pub enum RoomEvent<S> {
    /// A transport session was admitted.
    Opened {
        /// Session identity.
        key: SessionKey,
        /// Delivery handle, owned by the room from now on.
        session: S,
        /// Display name fixed by admission; overrides the join payload.
        pinned_name: Option<String>,
    },
    /// A text frame arrived.
    Message {
        /// Sending session.
        key: SessionKey,
        /// Raw frame text.
        text: String,
    },
    /// The transport session ended.
    Closed {
        /// Session identity.
        key: SessionKey,
    },
}

/// Which moderation actions any participant may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModerationPolicy {
    /// Whether `reset` is accepted.
    pub allow_reset: bool,
    /// Whether `kick` is accepted.
    pub allow_kick: bool,
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self {
            allow_reset: true,
            allow_kick: true,
        }
    }
}

/// Result of processing one event, before delivery.
#[derive(Debug, PartialEq, Eq)]
pub struct Transition {
    /// Messages to send, in order.
    pub deliveries: Vec<Delivery>,
    /// Sessions the transport should close.
    pub close: Vec<SessionKey>,
    /// Event kind on success, or why the event was dropped.
    pub outcome: Result<&'static str, EventError>,
}

impl Transition {
    fn ok(kind: &'static str) -> Self {
        Self {
            deliveries: Vec::new(),
            close: Vec::new(),
            outcome: Ok(kind),
        }
    }

    fn rejected(err: EventError) -> Self {
        Self {
            deliveries: Vec::new(),
            close: Vec::new(),
            outcome: Err(err),
        }
    }

    fn with(mut self, delivery: Delivery) -> Self {
        self.deliveries.push(delivery);
        self
    }
}

/// Result of [`Room::apply`].
#[derive(Debug)]
pub struct Applied {
    /// Event kind on success, or why the event was dropped.
    pub outcome: Result<&'static str, EventError>,
    /// Combined delivery outcome.
    pub report: DeliveryReport,
    /// Number of sessions asked to close.
    pub closed: usize,
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoomStats {
    /// Open transport sessions, joined or not.
    pub sessions: usize,
    /// Joined participants.
    pub participants: usize,
    /// Raised cards.
    pub cards: usize,
}

/// Compile a display-name pattern that must match the whole name.
pub fn name_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

/// The single shared room.
pub struct Room<S, R = StdRng> {
    registry: ConnectionRegistry<S>,
    cards: CardState,
    pending: HashMap<SessionKey, S>,
    pinned: HashMap<SessionKey, String>,
    allocator: IdAllocator<R>,
    policy: ModerationPolicy,
    name_pattern: Option<Regex>,
}

impl<S> Room<S, StdRng> {
    /// Room with an OS-seeded id allocator.
    pub fn new(policy: ModerationPolicy) -> Self {
        Self::with_allocator(IdAllocator::from_os_rng(), policy)
    }
}

impl<S, R: Rng> Room<S, R> {
    /// Room with a caller-provided id allocator.
    pub fn with_allocator(allocator: IdAllocator<R>, policy: ModerationPolicy) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            cards: CardState::new(),
            pending: HashMap::new(),
            pinned: HashMap::new(),
            allocator,
            policy,
            name_pattern: None,
        }
    }

    /// Require join names to match `pattern` (see [`name_pattern`]).
    #[must_use]
    pub fn with_name_pattern(mut self, pattern: Regex) -> Self {
        self.name_pattern = Some(pattern);
        self
    }

    /// Active connections.
    pub fn registry(&self) -> &ConnectionRegistry<S> {
        &self.registry
    }

    /// Raised cards.
    pub fn cards(&self) -> &CardState {
        &self.cards
    }

    /// Current counters.
    pub fn stats(&self) -> RoomStats {
        RoomStats {
            sessions: self.pending.len() + self.registry.len(),
            participants: self.registry.len(),
            cards: self.cards.len(),
        }
    }

    /// Apply one event to the room state and compute what to send.
    pub fn handle(&mut self, event: RoomEvent<S>) -> Transition {
        match event {
            RoomEvent::Opened {
                key,
                session,
                pinned_name,
            } => {
                debug!(session = %key, pinned = pinned_name.is_some(), "session opened");
                let _ = self.pending.insert(key, session);
                if let Some(name) = pinned_name {
                    let _ = self.pinned.insert(key, name);
                }
                Transition::ok("open")
            }
            RoomEvent::Message { key, text } => match InboundEvent::parse(&text) {
                Ok(inbound) => self.process(key, inbound),
                Err(e) => {
                    debug!(session = %key, error = %e, "malformed payload");
                    Transition::rejected(EventError::MalformedPayload(e.to_string()))
                }
            },
            RoomEvent::Closed { key } => {
                let _ = self.pending.remove(&key);
                let _ = self.pinned.remove(&key);
                let (transition, _) = self.depart(key, "close");
                transition
            }
        }
    }

    fn process(&mut self, key: SessionKey, event: InboundEvent) -> Transition {
        match event {
            InboundEvent::Join { name } => self.join(key, name),
            InboundEvent::Msg { msg } => {
                let Some(caller) = self.registry.find_by_session(key) else {
                    return Transition::rejected(EventError::NotJoined(key));
                };
                let name = caller.display_name.clone();
                Transition::ok("msg").with(Delivery::to_all(OutboundMessage::Msg { name, msg }))
            }
            InboundEvent::Raise { card } => {
                let Some(caller) = self.registry.find_by_session(key) else {
                    return Transition::rejected(EventError::NotJoined(key));
                };
                if !self.cards.raise(&caller.id, &caller.display_name, &card) {
                    debug!(participant_id = %caller.id, card = %card, "duplicate raise dropped");
                    return Transition::ok("raise");
                }
                Transition::ok("raise").with(Delivery::to_all(OutboundMessage::Raise {
                    card,
                    id: caller.id.clone(),
                    name: caller.display_name.clone(),
                }))
            }
            InboundEvent::Lower { card } => {
                let Some(caller) = self.registry.find_by_session(key) else {
                    return Transition::rejected(EventError::NotJoined(key));
                };
                if self.cards.lower(&caller.id, &card) == 0 {
                    debug!(participant_id = %caller.id, card = %card, "lower without raised card");
                    return Transition::ok("lower");
                }
                Transition::ok("lower").with(Delivery::to_all(OutboundMessage::Lower {
                    card,
                    id: caller.id.clone(),
                    name: caller.display_name.clone(),
                }))
            }
            InboundEvent::Reset => {
                let Some(caller) = self.registry.find_by_session(key) else {
                    return Transition::rejected(EventError::NotJoined(key));
                };
                if !self.policy.allow_reset {
                    return Transition::rejected(EventError::Forbidden { action: "reset" });
                }
                let removed = self.cards.reset();
                info!(participant_id = %caller.id, removed, "cards reset");
                Transition::ok("reset").with(Delivery::to_all(OutboundMessage::Reset))
            }
            InboundEvent::Kick { id } => {
                if !self.policy.allow_kick {
                    return Transition::rejected(EventError::Forbidden { action: "kick" });
                }
                let Some(target) = self.registry.find_by_id(&id) else {
                    return Transition::rejected(EventError::UnknownTarget { id });
                };
                info!(participant_id = %target.id, by = %key, "participant kicked");
                let mut transition = Transition::ok("kick");
                transition.close.push(target.session_key);
                transition
            }
            InboundEvent::Leave => {
                let (transition, removed) = self.depart(key, "leave");
                match removed {
                    Some(conn) => {
                        let _ = self.pending.insert(key, conn.session);
                        transition
                    }
                    None => Transition::rejected(EventError::NotJoined(key)),
                }
            }
            InboundEvent::Unknown => {
                debug!(session = %key, "ignoring unknown event type");
                Transition::ok("unknown")
            }
        }
    }

    fn join(&mut self, key: SessionKey, requested: String) -> Transition {
        if self.registry.find_by_session(key).is_some() {
            return Transition::rejected(EventError::DuplicateJoin(key));
        }
        let name = self.pinned.get(&key).cloned().unwrap_or(requested);
        if let Some(pattern) = &self.name_pattern {
            if !pattern.is_match(&name) {
                return Transition::rejected(EventError::InvalidName(name));
            }
        }
        let Some(session) = self.pending.remove(&key) else {
            return Transition::rejected(EventError::UnknownSession(key));
        };

        let conn = self.registry.add(name, key, session, &mut self.allocator);
        info!(participant_id = %conn.id, name = %conn.display_name, session = %key, "participant joined");

        Transition::ok("join")
            .with(Delivery::to_session(
                key,
                OutboundMessage::snapshot(self.cards.all()),
            ))
            .with(Delivery::to_all(OutboundMessage::Connected {
                connected: self.registry.roster(),
            }))
    }

    /// Remove the session's connection and its cards. Broadcasts the new
    /// snapshot and roster when a connection was actually removed.
    fn depart(&mut self, key: SessionKey, kind: &'static str) -> (Transition, Option<Connection<S>>) {
        let Some(conn) = self.registry.remove_by_session(key) else {
            return (Transition::ok(kind), None);
        };
        let removed_cards = self.cards.remove_all_for(&conn.id);
        info!(participant_id = %conn.id, removed_cards, reason = kind, "participant left");

        let transition = Transition::ok(kind)
            .with(Delivery::to_all(OutboundMessage::snapshot(self.cards.all())))
            .with(Delivery::to_all(OutboundMessage::Connected {
                connected: self.registry.roster(),
            }));
        (transition, Some(conn))
    }
}

impl<S: SessionHandle, R: Rng> Room<S, R> {
    /// Process an event, deliver its messages and execute close directives.
    pub fn apply(&mut self, event: RoomEvent<S>) -> Applied {
        let transition = self.handle(event);
        let mut report = DeliveryReport::default();
        for delivery in &transition.deliveries {
            report.merge(Broadcaster::deliver(&mut self.registry, delivery));
        }
        // A session that missed a message is closed so its `Closed` event
        // runs the usual cleanup instead of leaving it stale.
        let mut closing = transition.close;
        for key in &report.failed {
            if !closing.contains(key) {
                closing.push(*key);
            }
        }
        let mut closed = 0;
        for key in &closing {
            if let Some(conn) = self.registry.find_by_session(*key) {
                conn.session.close();
                closed += 1;
            }
        }
        Applied {
            outcome: transition.outcome,
            report,
            closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Target;
    use crate::broadcast::testing::RecordingSession;
    use crate::ids::ParticipantId;
    use assert_matches::assert_matches;
    use serde_json::{Value, json};

    type TestRoom = Room<RecordingSession>;

    fn room() -> TestRoom {
        Room::with_allocator(IdAllocator::seeded(3), ModerationPolicy::default())
    }

    fn open(room: &mut TestRoom, key: u64) -> RecordingSession {
        let session = RecordingSession::default();
        let applied = room.apply(RoomEvent::Opened {
            key: SessionKey(key),
            session: session.clone(),
            pinned_name: None,
        });
        assert_eq!(applied.outcome, Ok("open"));
        session
    }

    fn send(room: &mut TestRoom, key: u64, value: &Value) -> Applied {
        room.apply(RoomEvent::Message {
            key: SessionKey(key),
            text: value.to_string(),
        })
    }

    fn join(room: &mut TestRoom, key: u64, name: &str) -> (RecordingSession, ParticipantId) {
        let session = open(room, key);
        let applied = send(room, key, &json!({"type": "join", "name": name}));
        assert_eq!(applied.outcome, Ok("join"));
        let id = room.registry().find_by_session(SessionKey(key)).unwrap().id.clone();
        (session, id)
    }

    #[test]
    fn join_sends_snapshot_then_roster() {
        let mut room = room();
        let (alice, alice_id) = join(&mut room, 1, "Alice");
        assert_eq!(
            alice.take(),
            vec![
                json!({"type": "all", "cards": []}),
                json!({"type": "connected", "connected": [{"name": "Alice", "id": alice_id.as_str()}]}),
            ]
        );
    }

    #[test]
    fn join_roster_reaches_existing_participants() {
        let mut room = room();
        let (alice, alice_id) = join(&mut room, 1, "Alice");
        let _ = alice.take();
        let (_bob, bob_id) = join(&mut room, 2, "Bob");
        assert_eq!(
            alice.take(),
            vec![json!({"type": "connected", "connected": [
                {"name": "Alice", "id": alice_id.as_str()},
                {"name": "Bob", "id": bob_id.as_str()},
            ]})]
        );
    }

    #[test]
    fn late_joiner_gets_current_cards() {
        let mut room = room();
        let (_alice, alice_id) = join(&mut room, 1, "Alice");
        let _ = send(&mut room, 1, &json!({"type": "raise", "card": "green"}));
        let (bob, _) = join(&mut room, 2, "Bob");
        assert_eq!(
            bob.take()[0],
            json!({"type": "all", "cards": [
                {"type": "raise", "card": "green", "id": alice_id.as_str(), "name": "Alice"}
            ]})
        );
    }

    #[test]
    fn pending_sessions_receive_nothing() {
        let mut room = room();
        let watcher = open(&mut room, 9);
        let _ = join(&mut room, 1, "Alice");
        let _ = send(&mut room, 1, &json!({"type": "msg", "msg": "hi"}));
        assert!(watcher.messages().is_empty());
        assert_eq!(room.stats(), RoomStats { sessions: 2, participants: 1, cards: 0 });
    }

    #[test]
    fn duplicate_join_is_ignored() {
        let mut room = room();
        let (alice, _) = join(&mut room, 1, "Alice");
        let _ = alice.take();
        let applied = send(&mut room, 1, &json!({"type": "join", "name": "Alice again"}));
        assert_eq!(applied.outcome, Err(EventError::DuplicateJoin(SessionKey(1))));
        assert!(alice.messages().is_empty());
        assert_eq!(room.registry().len(), 1);
    }

    #[test]
    fn join_from_unopened_session_is_rejected() {
        let mut room = room();
        let applied = send(&mut room, 5, &json!({"type": "join", "name": "Ghost"}));
        assert_eq!(applied.outcome, Err(EventError::UnknownSession(SessionKey(5))));
        assert!(room.registry().is_empty());
    }

    #[test]
    fn pinned_name_overrides_payload() {
        let mut room = room();
        let session = RecordingSession::default();
        let _ = room.apply(RoomEvent::Opened {
            key: SessionKey(1),
            session,
            pinned_name: Some("Dr. Authenticated".into()),
        });
        let _ = send(&mut room, 1, &json!({"type": "join", "name": "Impostor"}));
        let roster = room.registry().roster();
        assert_eq!(roster[0].name, "Dr. Authenticated");
    }

    #[test]
    fn name_pattern_rejects_bad_names() {
        let mut room = room().with_name_pattern(name_pattern("[A-Za-z ]+").unwrap());
        let session = open(&mut room, 1);
        let applied = send(&mut room, 1, &json!({"type": "join", "name": "R2-D2"}));
        assert_eq!(applied.outcome, Err(EventError::InvalidName("R2-D2".into())));
        assert!(session.messages().is_empty());

        // Still pending: a valid name succeeds afterwards.
        let applied = send(&mut room, 1, &json!({"type": "join", "name": "Artoo"}));
        assert_eq!(applied.outcome, Ok("join"));
    }

    #[test]
    fn name_pattern_must_match_whole_name() {
        let pattern = name_pattern("[a-z]+").unwrap();
        assert!(pattern.is_match("alice"));
        assert!(!pattern.is_match("alice!"));
        assert!(!pattern.is_match(""));
    }

    #[test]
    fn msg_is_relayed_to_everyone() {
        let mut room = room();
        let (alice, _) = join(&mut room, 1, "Alice");
        let (bob, _) = join(&mut room, 2, "Bob");
        let _ = (alice.take(), bob.take());

        let applied = send(&mut room, 2, &json!({"type": "msg", "msg": "hello \"world\""}));
        assert_eq!(applied.outcome, Ok("msg"));
        assert_eq!(applied.report.delivered, 2);
        let expected = json!({"type": "msg", "name": "Bob", "msg": "hello \"world\""});
        assert_eq!(alice.take(), vec![expected.clone()]);
        assert_eq!(bob.take(), vec![expected]);
    }

    #[test]
    fn msg_before_join_is_rejected() {
        let mut room = room();
        let (alice, _) = join(&mut room, 1, "Alice");
        let _ = alice.take();
        let _ = open(&mut room, 2);
        let applied = send(&mut room, 2, &json!({"type": "msg", "msg": "psst"}));
        assert_eq!(applied.outcome, Err(EventError::NotJoined(SessionKey(2))));
        assert!(alice.messages().is_empty());
    }

    #[test]
    fn raise_broadcasts_card_once() {
        let mut room = room();
        let (alice, alice_id) = join(&mut room, 1, "Alice");
        let _ = alice.take();

        let _ = send(&mut room, 1, &json!({"type": "raise", "card": "green"}));
        assert_eq!(
            alice.take(),
            vec![json!({"type": "raise", "card": "green", "id": alice_id.as_str(), "name": "Alice"})]
        );

        let applied = send(&mut room, 1, &json!({"type": "raise", "card": "green"}));
        assert_eq!(applied.outcome, Ok("raise"));
        assert!(alice.take().is_empty());
        assert_eq!(room.cards().len(), 1);
    }

    #[test]
    fn lower_removes_pair_and_keeps_others() {
        let mut room = room();
        let (alice, alice_id) = join(&mut room, 1, "Alice");
        let (_bob, bob_id) = join(&mut room, 2, "Bob");
        let _ = send(&mut room, 1, &json!({"type": "raise", "card": "green"}));
        let _ = send(&mut room, 2, &json!({"type": "raise", "card": "green"}));
        let _ = alice.take();

        let _ = send(&mut room, 1, &json!({"type": "lower", "card": "green"}));
        assert_eq!(
            alice.take(),
            vec![json!({"type": "lower", "card": "green", "id": alice_id.as_str(), "name": "Alice"})]
        );
        let cards = room.cards().all();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].owner_id, bob_id);
    }

    #[test]
    fn lower_without_raise_sends_nothing() {
        let mut room = room();
        let (alice, _) = join(&mut room, 1, "Alice");
        let _ = alice.take();
        let applied = send(&mut room, 1, &json!({"type": "lower", "card": "red"}));
        assert_eq!(applied.outcome, Ok("lower"));
        assert!(alice.take().is_empty());
    }

    #[test]
    fn reset_clears_all_owners() {
        let mut room = room();
        let (alice, _) = join(&mut room, 1, "Alice");
        let _ = join(&mut room, 2, "Bob");
        let _ = join(&mut room, 3, "Carol");
        for key in 1..=3 {
            let _ = send(&mut room, key, &json!({"type": "raise", "card": "green"}));
            let _ = send(&mut room, key, &json!({"type": "raise", "card": "red"}));
        }
        assert_eq!(room.cards().len(), 6);
        let _ = alice.take();

        let applied = send(&mut room, 2, &json!({"type": "reset"}));
        assert_eq!(applied.outcome, Ok("reset"));
        assert!(room.cards().is_empty());
        assert_eq!(alice.take(), vec![json!({"type": "reset"})]);
    }

    #[test]
    fn reset_can_be_disabled() {
        let mut room: TestRoom = Room::with_allocator(
            IdAllocator::seeded(3),
            ModerationPolicy {
                allow_reset: false,
                allow_kick: true,
            },
        );
        let _ = join(&mut room, 1, "Alice");
        let _ = send(&mut room, 1, &json!({"type": "raise", "card": "green"}));
        let applied = send(&mut room, 1, &json!({"type": "reset"}));
        assert_eq!(applied.outcome, Err(EventError::Forbidden { action: "reset" }));
        assert_eq!(room.cards().len(), 1);
    }

    #[test]
    fn kick_closes_target_then_close_cleans_up() {
        let mut room = room();
        let (alice, alice_id) = join(&mut room, 1, "Alice");
        let (bob, bob_id) = join(&mut room, 2, "Bob");
        let _ = send(&mut room, 1, &json!({"type": "raise", "card": "green"}));
        let _ = send(&mut room, 2, &json!({"type": "raise", "card": "red"}));
        let _ = (alice.take(), bob.take());

        let applied = send(&mut room, 2, &json!({"type": "kick", "id": alice_id.as_str()}));
        assert_eq!(applied.outcome, Ok("kick"));
        assert_eq!(applied.closed, 1);
        assert!(alice.closed.get());
        assert!(!bob.closed.get());
        // Kick itself broadcasts nothing.
        assert!(bob.messages().is_empty());

        // The transport reports the close.
        let applied = room.apply(RoomEvent::Closed { key: SessionKey(1) });
        assert_eq!(applied.outcome, Ok("close"));
        assert_eq!(
            bob.take(),
            vec![
                json!({"type": "all", "cards": [
                    {"type": "raise", "card": "red", "id": bob_id.as_str(), "name": "Bob"}
                ]}),
                json!({"type": "connected", "connected": [{"name": "Bob", "id": bob_id.as_str()}]}),
            ]
        );
        assert!(alice.messages().is_empty());
        assert!(room.registry().find_by_id(&alice_id).is_none());
    }

    #[test]
    fn kick_unknown_target_is_noop() {
        let mut room = room();
        let (alice, _) = join(&mut room, 1, "Alice");
        let applied = send(&mut room, 1, &json!({"type": "kick", "id": "nobody00"}));
        assert_matches!(applied.outcome, Err(EventError::UnknownTarget { .. }));
        assert_eq!(applied.closed, 0);
        assert!(!alice.closed.get());
    }

    #[test]
    fn kick_can_be_disabled() {
        let mut room: TestRoom = Room::with_allocator(
            IdAllocator::seeded(3),
            ModerationPolicy {
                allow_reset: true,
                allow_kick: false,
            },
        );
        let (alice, alice_id) = join(&mut room, 1, "Alice");
        let _ = join(&mut room, 2, "Bob");
        let applied = send(&mut room, 2, &json!({"type": "kick", "id": alice_id.as_str()}));
        assert_eq!(applied.outcome, Err(EventError::Forbidden { action: "kick" }));
        assert!(!alice.closed.get());
    }

    #[test]
    fn leave_cleans_up_and_returns_to_pending() {
        let mut room = room();
        let (alice, _) = join(&mut room, 1, "Alice");
        let (bob, bob_id) = join(&mut room, 2, "Bob");
        let _ = send(&mut room, 1, &json!({"type": "raise", "card": "green"}));
        let _ = (alice.take(), bob.take());

        let applied = send(&mut room, 1, &json!({"type": "leave"}));
        assert_eq!(applied.outcome, Ok("leave"));
        assert!(alice.messages().is_empty());
        assert_eq!(
            bob.take(),
            vec![
                json!({"type": "all", "cards": []}),
                json!({"type": "connected", "connected": [{"name": "Bob", "id": bob_id.as_str()}]}),
            ]
        );
        assert_eq!(room.stats(), RoomStats { sessions: 2, participants: 1, cards: 0 });

        // Can join again on the same session.
        let applied = send(&mut room, 1, &json!({"type": "join", "name": "Alice"}));
        assert_eq!(applied.outcome, Ok("join"));
    }

    #[test]
    fn leave_before_join_is_rejected() {
        let mut room = room();
        let _ = open(&mut room, 1);
        let applied = send(&mut room, 1, &json!({"type": "leave"}));
        assert_eq!(applied.outcome, Err(EventError::NotJoined(SessionKey(1))));
    }

    #[test]
    fn close_of_pending_session_broadcasts_nothing() {
        let mut room = room();
        let (alice, _) = join(&mut room, 1, "Alice");
        let _ = alice.take();
        let _ = open(&mut room, 2);
        let applied = room.apply(RoomEvent::Closed { key: SessionKey(2) });
        assert_eq!(applied.outcome, Ok("close"));
        assert!(alice.messages().is_empty());
        assert_eq!(room.stats().sessions, 1);
    }

    #[test]
    fn close_is_idempotent() {
        let mut room = room();
        let _ = join(&mut room, 1, "Alice");
        let first = room.handle(RoomEvent::Closed { key: SessionKey(1) });
        assert_eq!(first.deliveries.len(), 2);
        let second = room.handle(RoomEvent::Closed { key: SessionKey(1) });
        assert!(second.deliveries.is_empty());
        assert_eq!(second.outcome, Ok("close"));
    }

    #[test]
    fn malformed_payload_changes_nothing() {
        let mut room = room();
        let (alice, _) = join(&mut room, 1, "Alice");
        let (bob, _) = join(&mut room, 2, "Bob");
        let _ = (alice.take(), bob.take());

        let applied = room.apply(RoomEvent::Message {
            key: SessionKey(2),
            text: "{not json".into(),
        });
        assert_matches!(applied.outcome, Err(EventError::MalformedPayload(_)));
        assert_eq!(applied.report, DeliveryReport::default());
        assert!(alice.messages().is_empty());
        assert!(bob.messages().is_empty());
        assert!(!bob.closed.get());
        assert_eq!(room.registry().len(), 2);
    }

    #[test]
    fn unknown_event_type_is_ignored() {
        let mut room = room();
        let (alice, _) = join(&mut room, 1, "Alice");
        let _ = alice.take();
        let applied = send(&mut room, 1, &json!({"type": "wave"}));
        assert_eq!(applied.outcome, Ok("unknown"));
        assert!(alice.messages().is_empty());
    }

    #[test]
    fn failed_delivery_marks_stale_without_aborting() {
        let mut room = room();
        let (alice, _) = join(&mut room, 1, "Alice");
        let (bob, _) = join(&mut room, 2, "Bob");
        let (carol, _) = join(&mut room, 3, "Carol");
        let _ = (alice.take(), bob.take(), carol.take());
        bob.failing.set(true);

        let applied = send(&mut room, 1, &json!({"type": "msg", "msg": "one"}));
        assert_eq!(applied.report.delivered, 2);
        assert_eq!(applied.report.failed, vec![SessionKey(2)]);
        assert_eq!(applied.closed, 1);
        assert!(bob.closed.get());
        assert!(!carol.closed.get());
        assert_eq!(carol.take().len(), 1);

        // Stale until the close arrives; still on the roster meanwhile.
        let applied = send(&mut room, 1, &json!({"type": "msg", "msg": "two"}));
        assert_eq!(applied.report.skipped, 1);
        assert_eq!(room.registry().len(), 3);

        let _ = room.apply(RoomEvent::Closed { key: SessionKey(2) });
        assert_eq!(room.registry().len(), 2);
        let roster = carol.take();
        assert_eq!(roster.last().map(|m| m["type"].clone()), Some(json!("connected")));
    }

    #[test]
    fn handle_is_pure_until_apply() {
        let mut room = room();
        let (alice, _) = join(&mut room, 1, "Alice");
        let _ = alice.take();
        let transition = room.handle(RoomEvent::Message {
            key: SessionKey(1),
            text: json!({"type": "reset"}).to_string(),
        });
        assert_eq!(transition.deliveries, vec![Delivery {
            target: Target::All,
            message: OutboundMessage::Reset,
        }]);
        assert!(alice.messages().is_empty());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn departures_remove_owned_cards(
                joins in 2usize..8,
                raises in proptest::collection::vec((0usize..8, 0u8..3), 0..32),
                leaver in 0usize..8,
            ) {
                let mut room = room();
                for k in 0..joins {
                    let _ = join(&mut room, k as u64, &format!("p{k}"));
                }
                for (k, label) in raises {
                    let _ = send(&mut room, (k % joins) as u64, &json!({"type": "raise", "card": format!("c{label}")}));
                }
                let leaver = (leaver % joins) as u64;
                let leaver_id = room.registry().find_by_session(SessionKey(leaver)).unwrap().id.clone();
                let others_before = room.cards().all().iter().filter(|c| c.owner_id != leaver_id).count();

                let _ = room.apply(RoomEvent::Closed { key: SessionKey(leaver) });

                prop_assert!(room.cards().all().iter().all(|c| c.owner_id != leaver_id));
                prop_assert_eq!(room.cards().len(), others_before);
                prop_assert!(room.registry().roster().iter().all(|e| e.id != leaver_id));
                prop_assert_eq!(room.registry().len(), joins - 1);
            }
        }
    }
}
