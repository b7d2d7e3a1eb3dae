//! Presence tracking for Courier.
//!
//! A user is online while at least one of its connections is attributed to it.
//! The entry disappears when the last connection goes away, and that moment is
//! the user's last-seen time.

use crate::connection::{now_millis, ConnectionId, UserId};
use dashmap::DashMap;
use std::collections::HashSet;
use tracing::debug;

/// Presence entry for a single user.
#[derive(Debug, Clone, Default)]
pub struct PresenceEntry {
    /// Connections currently attributed to the user.
    pub connections: HashSet<ConnectionId>,
    /// When the user came online.
    pub since: u64,
}

/// Per-user presence map.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    users: DashMap<UserId, PresenceEntry>,
}

impl PresenceTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute a connection to a user, creating the entry if needed.
    ///
    /// Returns `true` if the user was offline before this call. Emits nothing;
    /// announcing the transition is the caller's job.
    pub fn mark_online(&self, user: &str, connection_id: &ConnectionId) -> bool {
        let mut created = false;
        let mut entry = self.users.entry(user.to_string()).or_insert_with(|| {
            created = true;
            PresenceEntry {
                connections: HashSet::new(),
                since: now_millis(),
            }
        });
        entry.connections.insert(connection_id.clone());

        if created {
            debug!(user = %user, connection = %connection_id, "Presence: user online");
        }
        created
    }

    /// Detach a connection from a user's entry without removing the entry.
    ///
    /// Returns `true` if the connection was attributed to the user.
    pub fn remove_connection(&self, user: &str, connection_id: &ConnectionId) -> bool {
        self.users
            .get_mut(user)
            .map(|mut entry| entry.connections.remove(connection_id))
            .unwrap_or(false)
    }

    /// Drop the user's entry if no connection is left.
    ///
    /// Returns the last-seen timestamp when the entry was removed by this call.
    /// The check and the removal are one atomic step, so concurrent callers for
    /// the same user see exactly one `Some`.
    pub fn mark_offline_if_empty(&self, user: &str) -> Option<u64> {
        self.users
            .remove_if(user, |_, entry| entry.connections.is_empty())
            .map(|_| {
                debug!(user = %user, "Presence: user offline");
                now_millis()
            })
    }

    /// Snapshot of every online user id.
    #[must_use]
    pub fn online_user_ids(&self) -> Vec<UserId> {
        self.users.iter().map(|e| e.key().clone()).collect()
    }

    /// Check if a user is online.
    #[must_use]
    pub fn is_online(&self, user: &str) -> bool {
        self.users.contains_key(user)
    }

    /// Connections attributed to a user.
    #[must_use]
    pub fn connections_of(&self, user: &str) -> Vec<ConnectionId> {
        self.users
            .get(user)
            .map(|e| e.connections.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of online users.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.users.len()
    }
}
