//! Broadcast gateway for the rest of the application.
//!
//! Request handlers outside the hub (REST controllers, background jobs) emit
//! events to a room, a user, or everyone without holding any connection.
//!
//! ```rust
//! use std::sync::Arc;
//! use courier_core::Hub;
//! use serde_json::json;
//!
//! let hub = Arc::new(Hub::default());
//! let gateway = hub.gateway();
//!
//! // Nobody is connected yet, so nothing is delivered and nothing fails.
//! assert_eq!(gateway.to("chat-1").emit("group_updated", &json!({"name": "team"})), 0);
//! assert_eq!(gateway.emit("maintenance", &json!({"in": 5})), 0);
//! ```

use crate::hub::Hub;
use courier_protocol::Ident;
use serde::Serialize;
use std::sync::Arc;
use tracing::trace;

/// Cheap handle onto a running hub.
#[derive(Clone)]
pub struct Gateway {
    hub: Arc<Hub>,
}

impl Gateway {
    /// Wrap a hub.
    #[must_use]
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// The hub behind this gateway.
    #[must_use]
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Emit to every connection. Returns the number of recipients.
    pub fn emit<T: Serialize + ?Sized>(&self, event: &str, payload: &T) -> usize {
        let delivered = self.hub.rooms.broadcast_all(event, payload, None);
        trace!(event = %event, delivered, "Gateway emit to all");
        delivered
    }

    /// Target one room.
    pub fn to(&self, room: impl Into<Ident>) -> RoomEmitter<'_> {
        RoomEmitter {
            hub: &self.hub,
            room: room.into(),
        }
    }

    /// Target every connection of one user.
    pub fn to_user(&self, user: impl Into<Ident>) -> UserEmitter<'_> {
        UserEmitter {
            hub: &self.hub,
            user: user.into(),
        }
    }
}

/// Emits to the members of one room.
pub struct RoomEmitter<'a> {
    hub: &'a Hub,
    room: Ident,
}

impl RoomEmitter<'_> {
    /// Emit to the room. A missing room delivers to nobody.
    pub fn emit<T: Serialize + ?Sized>(&self, event: &str, payload: &T) -> usize {
        let delivered = self.hub.rooms.broadcast(&self.room, event, payload, None);
        trace!(room = %self.room, event = %event, delivered, "Gateway emit to room");
        delivered
    }
}

/// Emits to the live connections of one user.
pub struct UserEmitter<'a> {
    hub: &'a Hub,
    user: Ident,
}

impl UserEmitter<'_> {
    /// Emit to the user. An offline user receives nothing.
    pub fn emit<T: Serialize + ?Sized>(&self, event: &str, payload: &T) -> usize {
        let Some(user) = self.user.as_deref() else {
            return 0;
        };
        let connections = self.hub.presence.connections_of(user);
        let delivered = self.hub.rooms.multicast(&connections, event, payload);
        trace!(user = %user, event = %event, delivered, "Gateway emit to user");
        delivered
    }
}
