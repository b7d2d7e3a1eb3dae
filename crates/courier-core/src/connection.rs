//! Per-connection state owned by the hub.

use bytes::Bytes;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

/// A room identifier (a user id or a chat id).
pub type RoomId = String;

/// A user identifier.
pub type UserId = String;

/// Atomic counter for ensuring unique IDs even within the same nanosecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Current time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a process-unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{:x}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Something the transport must do for a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// An encoded frame, shared between every recipient of a broadcast.
    Frame(Bytes),
    /// Send a transport-level ping.
    Ping,
    /// Close the transport; the hub has already forgotten the connection.
    Close,
}

/// Sending half of a connection's outbox.
pub type Outbox = mpsc::UnboundedSender<Delivery>;

/// Receiving half of a connection's outbox, drained by the transport task.
pub type Inbox = mpsc::UnboundedReceiver<Delivery>;

/// Create a connection outbox.
#[must_use]
pub fn outbox() -> (Outbox, Inbox) {
    mpsc::unbounded_channel()
}

/// State of one live connection.
#[derive(Debug)]
pub struct Connection {
    pub(crate) user: Option<UserId>,
    pub(crate) rooms: HashSet<RoomId>,
    pub(crate) alive: bool,
    pub(crate) outbox: Outbox,
}

impl Connection {
    pub(crate) fn new(outbox: Outbox) -> Self {
        Self {
            user: None,
            rooms: HashSet::new(),
            alive: true,
            outbox,
        }
    }

    /// The user this connection was set up for.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Rooms this connection has joined.
    #[must_use]
    pub fn rooms(&self) -> &HashSet<RoomId> {
        &self.rooms
    }

    /// Queue a delivery. A closed outbox is not an error: the member
    /// simply misses the frame.
    pub(crate) fn deliver(&self, delivery: Delivery) -> bool {
        self.outbox.send(delivery).is_ok()
    }
}
