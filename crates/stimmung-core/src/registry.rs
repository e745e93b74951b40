//! Active connections in the room.

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ids::{IdAllocator, ParticipantId, SessionKey};

/// A joined participant bound to its transport session.
#[derive(Debug)]
pub struct Connection<S> {
    /// Public participant id.
    pub id: ParticipantId,
    /// Display name given at join.
    pub display_name: String,
    /// Key of the owning transport session.
    pub session_key: SessionKey,
    /// Handle used to deliver outbound messages.
    pub session: S,
    live: bool,
}

impl<S> Connection<S> {
    /// Whether the last delivery to this connection succeeded.
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Public roster view.
    pub fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            name: self.display_name.clone(),
            id: self.id.clone(),
        }
    }
}

/// One roster line: what other participants may see about a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Display name.
    pub name: String,
    /// Participant id.
    pub id: ParticipantId,
}

/// Every active connection, in join order.
#[derive(Debug)]
pub struct ConnectionRegistry<S> {
    connections: Vec<Connection<S>>,
}

impl<S> ConnectionRegistry<S> {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            connections: Vec::new(),
        }
    }

    /// Admit a participant under a freshly allocated id.
    pub fn add<R: Rng>(
        &mut self,
        display_name: String,
        session_key: SessionKey,
        session: S,
        allocator: &mut IdAllocator<R>,
    ) -> &Connection<S> {
        let id = allocator.allocate(&self.ids());
        let index = self.connections.len();
        self.connections.push(Connection {
            id,
            display_name,
            session_key,
            session,
            live: true,
        });
        &self.connections[index]
    }

    /// Remove every connection matching `predicate`, returning them.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&Connection<S>) -> bool) -> Vec<Connection<S>> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.connections.len());
        for conn in self.connections.drain(..) {
            if predicate(&conn) {
                removed.push(conn);
            } else {
                kept.push(conn);
            }
        }
        self.connections = kept;
        removed
    }

    /// Remove the connection bound to a transport session.
    pub fn remove_by_session(&mut self, key: SessionKey) -> Option<Connection<S>> {
        self.remove_where(|c| c.session_key == key).pop()
    }

    /// Remove the connection with the given id.
    pub fn remove_by_id(&mut self, id: &ParticipantId) -> Option<Connection<S>> {
        self.remove_where(|c| c.id == *id).pop()
    }

    /// Connection bound to a transport session.
    pub fn find_by_session(&self, key: SessionKey) -> Option<&Connection<S>> {
        self.connections.iter().find(|c| c.session_key == key)
    }

    /// Connection with the given id.
    pub fn find_by_id(&self, id: &ParticipantId) -> Option<&Connection<S>> {
        self.connections.iter().find(|c| c.id == *id)
    }

    /// Clear the liveness flag after a failed delivery.
    pub fn mark_stale(&mut self, key: SessionKey) {
        if let Some(conn) = self.connections.iter_mut().find(|c| c.session_key == key) {
            conn.live = false;
        }
    }

    /// All connections in join order.
    pub fn iter(&self) -> impl Iterator<Item = &Connection<S>> {
        self.connections.iter()
    }

    /// Public participant list in join order.
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.connections.iter().map(Connection::roster_entry).collect()
    }

    /// Ids currently in use.
    pub fn ids(&self) -> HashSet<ParticipantId> {
        self.connections.iter().map(|c| c.id.clone()).collect()
    }

    /// Number of connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl<S> Default for ConnectionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
