//! The hub: one instance owns every connection, room and presence entry.
//!
//! All state changes are short synchronous map operations. The only work that
//! waits on anything external, persisting a user's last-seen time, is spawned
//! as its own task after the in-memory transition is complete.

use crate::connection::{ConnectionId, Delivery, Outbox};
use crate::gateway::Gateway;
use crate::presence::PresenceTracker;
use crate::rooms::RoomDirectory;
use crate::store::{NullUserStore, UserStore};
use courier_protocol::{codec, outbound, ClientEvent, StatusChange};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

/// What happened to an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A handler ran to completion.
    Handled,
    /// The event name is not one the hub handles.
    Ignored,
    /// Not a frame at all (bad JSON, no `event`, oversized).
    Dropped,
    /// The handler failed; the failure was logged.
    Failed,
}

impl FrameOutcome {
    /// Label for metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameOutcome::Handled => "handled",
            FrameOutcome::Ignored => "ignored",
            FrameOutcome::Dropped => "dropped",
            FrameOutcome::Failed => "failed",
        }
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    /// Number of live connections.
    pub connections: usize,
    /// Number of non-empty rooms.
    pub rooms: usize,
    /// Number of online users.
    pub online_users: usize,
}

/// The connection, room and presence hub.
pub struct Hub {
    pub(crate) rooms: RoomDirectory,
    pub(crate) presence: PresenceTracker,
    store: Arc<dyn UserStore>,
}

impl Hub {
    /// Create a hub that persists last-seen times to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        info!(store = store.name(), "Creating hub");
        Self {
            rooms: RoomDirectory::new(),
            presence: PresenceTracker::new(),
            store,
        }
    }

    /// The gateway other components use to inject events.
    #[must_use]
    pub fn gateway(self: &Arc<Self>) -> Gateway {
        Gateway::new(Arc::clone(self))
    }

    /// Room directory.
    #[must_use]
    pub fn rooms(&self) -> &RoomDirectory {
        &self.rooms
    }

    /// Presence tracker.
    #[must_use]
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.rooms.connection_count(),
            rooms: self.rooms.room_count(),
            online_users: self.presence.online_count(),
        }
    }

    /// Register a new transport session.
    pub fn connect(&self, outbox: Outbox) -> ConnectionId {
        self.rooms.register(outbox)
    }

    /// Clean up after a transport closed.
    ///
    /// Idempotent: returns `false` if the connection was already gone.
    pub fn disconnect(&self, connection_id: &ConnectionId) -> bool {
        self.close(connection_id, false)
    }

    /// Force a connection closed, as the heartbeat does for silent peers.
    pub fn terminate(&self, connection_id: &ConnectionId) -> bool {
        self.close(connection_id, true)
    }

    fn close(&self, connection_id: &ConnectionId, notify_transport: bool) -> bool {
        let Some(conn) = self.rooms.unregister(connection_id) else {
            return false;
        };

        if notify_transport {
            conn.deliver(Delivery::Close);
        }

        if let Some(user) = conn.user() {
            if self.presence.remove_connection(user, connection_id) {
                self.mark_offline_if_empty(user);
            }
        }

        debug!(connection = %connection_id, user = ?conn.user(), "Connection closed");
        true
    }

    /// Record a transport-level pong.
    pub fn mark_alive(&self, connection_id: &ConnectionId) {
        self.rooms.mark_alive(connection_id);
    }

    /// Decode and handle one inbound frame.
    ///
    /// Nothing is ever reported back to the peer: malformed frames and unknown
    /// events are dropped, handler failures are logged and the connection stays
    /// usable.
    pub fn handle_frame(&self, connection_id: &ConnectionId, raw: &[u8]) -> FrameOutcome {
        let frame = match codec::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                trace!(connection = %connection_id, error = %e, "Dropping malformed frame");
                return FrameOutcome::Dropped;
            }
        };

        let name = frame.event.clone();
        let event = match ClientEvent::parse(frame) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(connection = %connection_id, event = %name, "Ignoring unknown event");
                return FrameOutcome::Ignored;
            }
            Err(e) => {
                warn!(connection = %connection_id, event = %name, error = %e, "Event handling failed");
                return FrameOutcome::Failed;
            }
        };

        match self.dispatch(connection_id, event) {
            Ok(()) => FrameOutcome::Handled,
            Err(e) => {
                warn!(connection = %connection_id, event = %name, error = %e, "Event handling failed");
                FrameOutcome::Failed
            }
        }
    }

    /// Attribute a connection to `user` in presence.
    ///
    /// Returns whether the user came online, or `None` when the connection was
    /// closed while being attached. The entry is then rolled back so a closed
    /// connection never keeps its user online.
    pub(crate) fn attach_presence(
        &self,
        user: &str,
        connection_id: &ConnectionId,
    ) -> Option<bool> {
        let came_online = self.presence.mark_online(user, connection_id);
        if self.rooms.is_registered(connection_id) {
            return Some(came_online);
        }

        debug!(connection = %connection_id, user = %user, "Connection closed during attach");
        if self.presence.remove_connection(user, connection_id) {
            self.mark_offline_if_empty(user);
        }
        None
    }

    /// Tell everyone but `except` that a user came online.
    pub(crate) fn announce_online(&self, user: &str, except: &ConnectionId) {
        self.rooms
            .broadcast_all(outbound::STATUS_CHANGE, &StatusChange::online(user), Some(except));
        info!(user = %user, "User online");
    }

    /// Take a user offline if none of its connections remain.
    ///
    /// On the transition this broadcasts `status_change` to every connection
    /// and queues the last-seen write. Returns `true` on the transition.
    pub fn mark_offline_if_empty(&self, user: &str) -> bool {
        let Some(last_seen) = self.presence.mark_offline_if_empty(user) else {
            return false;
        };

        self.rooms.broadcast_all(
            outbound::STATUS_CHANGE,
            &StatusChange::offline(user, last_seen),
            None,
        );
        info!(user = %user, last_seen, "User offline");

        self.persist_last_seen(user.to_string(), last_seen);
        true
    }

    fn persist_last_seen(&self, user: String, last_seen: u64) {
        let Ok(runtime) = Handle::try_current() else {
            warn!(user = %user, "No runtime available, last-seen not persisted");
            return;
        };

        let store = Arc::clone(&self.store);
        runtime.spawn(async move {
            match store.update_last_seen(&user, last_seen).await {
                Ok(()) => debug!(user = %user, last_seen, "Persisted last-seen"),
                Err(e) => warn!(user = %user, store = store.name(), error = %e, "Error updating last-seen"),
            }
        });
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(Arc::new(NullUserStore))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{online, Client, FailingStore, RecordingStore};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_malformed_and_unknown_frames() {
        let hub = Hub::default();
        let mut a = Client::connect(&hub);

        assert_eq!(
            hub.handle_frame(&a.id, b"{not json"),
            FrameOutcome::Dropped
        );
        assert_eq!(a.send(&hub, json!({"data": 1})), FrameOutcome::Dropped);
        assert_eq!(a.send(&hub, json!({"event": "dance"})), FrameOutcome::Ignored);
        assert!(a.drain().is_empty());
        assert!(hub.rooms().is_registered(&a.id));
    }

    #[test]
    fn test_handler_failure_keeps_connection_usable() {
        let hub = Hub::default();
        let mut a = Client::connect(&hub);

        let outcome = a.send(&hub, json!({"event": "new_message", "data": {"sender": "u1"}}));
        assert_eq!(outcome, FrameOutcome::Failed);
        assert!(a.drain().is_empty());

        let outcome = a.send(&hub, json!({"event": "setup", "data": {"_id": "u1"}}));
        assert_eq!(outcome, FrameOutcome::Handled);
        assert_eq!(a.events(), vec!["online_users"]);
    }

    #[tokio::test]
    async fn test_abrupt_disconnect_persists_last_seen_once() {
        let (store, mut writes) = RecordingStore::new();
        let hub = Hub::new(store);
        let a = online(&hub, "u1");
        let mut b = online(&hub, "u2");

        assert!(hub.disconnect(&a.id));
        assert!(!hub.disconnect(&a.id));

        assert!(!hub.presence().is_online("u1"));
        assert!(!hub.rooms().room_exists("u1"));

        let frames = b.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["event"], "status_change");
        assert_eq!(frames[0]["data"]["user_id"], "u1");
        assert_eq!(frames[0]["data"]["status"], "offline");
        let last_seen = frames[0]["data"]["last_seen"].as_u64().unwrap();

        let write = timeout(Duration::from_secs(1), writes.recv()).await.unwrap();
        assert_eq!(write, Some(("u1".to_string(), last_seen)));
        assert!(writes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_offline_emitted_once_for_many_connections() {
        let (store, mut writes) = RecordingStore::new();
        let hub = Hub::new(store);
        let phone = online(&hub, "u1");
        let laptop = online(&hub, "u1");
        let tablet = online(&hub, "u1");
        let mut watcher = online(&hub, "u2");

        hub.disconnect(&phone.id);
        hub.terminate(&laptop.id);
        assert!(watcher.frames().is_empty());
        assert!(hub.presence().is_online("u1"));

        hub.disconnect(&tablet.id);
        let offline: Vec<_> = watcher
            .frames()
            .into_iter()
            .filter(|f| f["data"]["status"] == "offline")
            .collect();
        assert_eq!(offline.len(), 1);

        let write = timeout(Duration::from_secs(1), writes.recv()).await.unwrap();
        assert_eq!(write.map(|(user, _)| user), Some("u1".to_string()));
        assert!(writes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_persistence_failure_leaves_state_alone() {
        let hub = Hub::new(Arc::new(FailingStore));
        let a = online(&hub, "u1");

        assert!(hub.disconnect(&a.id));
        tokio::task::yield_now().await;

        assert!(!hub.presence().is_online("u1"));
        assert_eq!(hub.stats().online_users, 0);
    }

    #[test]
    fn test_terminate_notifies_transport() {
        let hub = Hub::default();
        let mut a = Client::connect(&hub);

        assert!(hub.terminate(&a.id));
        assert_eq!(a.drain(), vec![Delivery::Close]);
        assert_eq!(hub.stats().connections, 0);
    }

    #[test]
    fn test_terminate_during_setup_leaves_no_presence() {
        let hub = Hub::default();
        let mut watcher = online(&hub, "u2");
        let a = Client::connect(&hub);

        // The heartbeat closes the connection between binding and presence.
        hub.rooms.bind_user(&a.id, "u1").unwrap();
        hub.rooms.join(&a.id, "u1");
        assert!(hub.terminate(&a.id));

        assert_eq!(hub.attach_presence("u1", &a.id), None);
        assert!(!hub.presence().is_online("u1"));
        assert!(hub.presence().connections_of("u1").is_empty());
        assert!(!hub.disconnect(&a.id));
        assert!(watcher
            .frames()
            .iter()
            .all(|f| f["data"]["status"] != "online"));
    }

    #[test]
    fn test_attach_rollback_keeps_other_connections() {
        let hub = Hub::default();
        let phone = online(&hub, "u1");
        let laptop = Client::connect(&hub);
        hub.rooms.bind_user(&laptop.id, "u1").unwrap();
        hub.terminate(&laptop.id);

        assert_eq!(hub.attach_presence("u1", &laptop.id), None);
        assert_eq!(hub.presence().connections_of("u1"), vec![phone.id.clone()]);
        assert_eq!(hub.attach_presence("u1", &phone.id), Some(false));
    }
}
