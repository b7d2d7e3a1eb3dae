//! Connection registry and room directory.
//!
//! Rooms are named groups of connections. A room named after a user id is that
//! user's mailbox; a room named after a chat id reaches the chat's members.
//! Membership is tracked both ways: the room map lists member connections and
//! every connection remembers the rooms it joined.
//!
//! Lock order is always connection entry first, room entry second. Broadcasts
//! copy the member list out of the room map before touching connections.

use crate::connection::{Connection, ConnectionId, Delivery, Outbox, RoomId, UserId};
use crate::error::HubError;
use bytes::Bytes;
use courier_protocol::{codec, Ident};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, trace, warn};

/// Connection table plus room membership.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    connections: DashMap<ConnectionId, Connection>,
    rooms: DashMap<RoomId, HashSet<ConnectionId>>,
}

impl RoomDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted connection.
    pub fn register(&self, outbox: Outbox) -> ConnectionId {
        let id = ConnectionId::generate();
        self.connections.insert(id.clone(), Connection::new(outbox));
        debug!(connection = %id, "Connection registered");
        id
    }

    /// Forget a connection, leaving every room it joined.
    ///
    /// Returns the removed state, or `None` if it was already gone.
    pub fn unregister(&self, connection_id: &ConnectionId) -> Option<Connection> {
        let (_, conn) = self.connections.remove(connection_id)?;
        for room in &conn.rooms {
            self.detach(room, connection_id);
        }
        debug!(connection = %connection_id, rooms = conn.rooms.len(), "Connection unregistered");
        Some(conn)
    }

    /// Whether the connection is registered.
    #[must_use]
    pub fn is_registered(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Bind a connection to its user.
    ///
    /// Binding again to the same user is accepted.
    ///
    /// # Errors
    ///
    /// Fails if the connection is unknown or bound to another user.
    pub fn bind_user(&self, connection_id: &ConnectionId, user: &str) -> Result<(), HubError> {
        let mut conn = self
            .connections
            .get_mut(connection_id)
            .ok_or_else(|| HubError::UnknownConnection(connection_id.to_string()))?;

        match conn.user.as_deref() {
            Some(bound) if bound != user => Err(HubError::AlreadyBound {
                connection: connection_id.to_string(),
                bound: bound.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                conn.user = Some(user.to_string());
                Ok(())
            }
        }
    }

    /// The user bound to a connection.
    #[must_use]
    pub fn user_of(&self, connection_id: &ConnectionId) -> Option<UserId> {
        self.connections
            .get(connection_id)
            .and_then(|c| c.user.clone())
    }

    /// Join a room. Idempotent; creates the room on first join.
    ///
    /// Returns `true` if the connection was not already a member. Identifiers
    /// that normalize to nothing and unknown connections are a no-op.
    pub fn join(&self, connection_id: &ConnectionId, room: impl Into<Ident>) -> bool {
        let Some(room) = room.into().into_inner() else {
            return false;
        };
        let Some(mut conn) = self.connections.get_mut(connection_id) else {
            return false;
        };

        self.rooms
            .entry(room.clone())
            .or_insert_with(|| {
                debug!(room = %room, "Creating new room");
                HashSet::new()
            })
            .insert(connection_id.clone());

        let added = conn.rooms.insert(room.clone());
        if added {
            debug!(room = %room, connection = %connection_id, "Joined");
        }
        added
    }

    /// Leave a room, deleting it once empty.
    ///
    /// Returns `true` if the connection was a member.
    pub fn leave(&self, connection_id: &ConnectionId, room: impl Into<Ident>) -> bool {
        let Some(room) = room.into().into_inner() else {
            return false;
        };
        let Some(mut conn) = self.connections.get_mut(connection_id) else {
            return false;
        };

        let was_member = conn.rooms.remove(&room);
        self.detach(&room, connection_id);
        if was_member {
            debug!(room = %room, connection = %connection_id, "Left");
        }
        was_member
    }

    /// Leave every room the connection is in.
    pub fn leave_all(&self, connection_id: &ConnectionId) {
        let Some(mut conn) = self.connections.get_mut(connection_id) else {
            return;
        };

        for room in std::mem::take(&mut conn.rooms) {
            self.detach(&room, connection_id);
        }
        debug!(connection = %connection_id, "Left all rooms");
    }

    /// Remove a member from the room map and drop the room if it emptied.
    fn detach(&self, room: &str, connection_id: &ConnectionId) {
        let emptied = match self.rooms.get_mut(room) {
            Some(mut members) => {
                members.remove(connection_id);
                members.is_empty()
            }
            None => false,
        };

        if emptied && self.rooms.remove_if(room, |_, members| members.is_empty()).is_some() {
            debug!(room = %room, "Deleted empty room");
        }
    }

    /// Send an event to every member of a room except `exclude`.
    ///
    /// Returns the number of recipients. A missing or empty room delivers to
    /// nobody and is not an error.
    pub fn broadcast<T: Serialize + ?Sized>(
        &self,
        room: impl Into<Ident>,
        event: &str,
        payload: &T,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        let Some(room) = room.into().into_inner() else {
            return 0;
        };

        let members: Vec<ConnectionId> = match self.rooms.get(&room) {
            Some(members) => members
                .iter()
                .filter(|id| Some(*id) != exclude)
                .cloned()
                .collect(),
            None => {
                trace!(room = %room, event = %event, "Broadcast to non-existent room");
                return 0;
            }
        };

        let count = self.multicast(&members, event, payload);
        trace!(room = %room, event = %event, recipients = count, "Broadcast");
        count
    }

    /// Send an event to a list of connections, encoding it once.
    pub fn multicast<T: Serialize + ?Sized>(
        &self,
        connection_ids: &[ConnectionId],
        event: &str,
        payload: &T,
    ) -> usize {
        if connection_ids.is_empty() {
            return 0;
        }

        let Some(frame) = encode(event, payload) else {
            return 0;
        };

        connection_ids
            .iter()
            .filter(|id| self.deliver(id, Delivery::Frame(frame.clone())))
            .count()
    }

    /// Send an event to every registered connection except `exclude`.
    pub fn broadcast_all<T: Serialize + ?Sized>(
        &self,
        event: &str,
        payload: &T,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        let Some(frame) = encode(event, payload) else {
            return 0;
        };

        let count = self
            .connections
            .iter()
            .filter(|entry| Some(entry.key()) != exclude)
            .filter(|entry| entry.deliver(Delivery::Frame(frame.clone())))
            .count();
        trace!(event = %event, recipients = count, "Broadcast to all");
        count
    }

    /// Send an event to a single connection.
    pub fn send_to<T: Serialize + ?Sized>(
        &self,
        connection_id: &ConnectionId,
        event: &str,
        payload: &T,
    ) -> bool {
        match encode(event, payload) {
            Some(frame) => self.deliver(connection_id, Delivery::Frame(frame)),
            None => false,
        }
    }

    /// Queue a delivery for one connection.
    pub fn deliver(&self, connection_id: &ConnectionId, delivery: Delivery) -> bool {
        self.connections
            .get(connection_id)
            .map(|conn| conn.deliver(delivery))
            .unwrap_or(false)
    }

    /// Record a pong.
    pub fn mark_alive(&self, connection_id: &ConnectionId) {
        if let Some(mut conn) = self.connections.get_mut(connection_id) {
            conn.alive = true;
        }
    }

    /// One liveness pass: ping every connection that answered since the last
    /// pass. Returns the number pinged and the ids that did not answer.
    pub(crate) fn probe(&self) -> (usize, Vec<ConnectionId>) {
        let mut pinged = 0;
        let mut dead = Vec::new();
        for mut entry in self.connections.iter_mut() {
            if entry.alive {
                entry.alive = false;
                entry.deliver(Delivery::Ping);
                pinged += 1;
            } else {
                dead.push(entry.key().clone());
            }
        }
        (pinged, dead)
    }

    /// Check if a room exists.
    #[must_use]
    pub fn room_exists(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Number of members in a room.
    #[must_use]
    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }

    /// Members of a room.
    #[must_use]
    pub fn members(&self, room: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Rooms a connection has joined.
    #[must_use]
    pub fn rooms_of(&self, connection_id: &ConnectionId) -> Vec<RoomId> {
        self.connections
            .get(connection_id)
            .map(|c| c.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of non-empty rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

fn encode<T: Serialize + ?Sized>(event: &str, payload: &T) -> Option<Bytes> {
    match codec::encode_event(event, payload) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(event = %event, error = %e, "Failed to encode outbound frame");
            None
        }
    }
}
