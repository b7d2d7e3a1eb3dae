//! # courier-core
//!
//! Connection registry, rooms, presence and event routing for the Courier
//! chat hub.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Rooms** - Connection table and bidirectional room membership
//! - **Presence** - Which users are online and through which connections
//! - **Hub** - Owns the state above and applies inbound frames to it
//! - **Router** - One handler per client event
//! - **Signaling** - Relays WebRTC call setup between users
//! - **Heartbeat** - Pings peers and terminates the silent ones
//! - **Gateway** - Lets the rest of the application emit to rooms and users
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Transport  │────▶│     Hub     │────▶│    Rooms    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                   │                   │
//!        │                   ▼                   ▼
//!  ┌───────────┐      ┌─────────────┐     ┌─────────────┐
//!  │ Heartbeat │      │  Presence   │     │   Outbox    │
//!  └───────────┘      └─────────────┘     └─────────────┘
//!                            │
//!                            ▼
//!                     ┌─────────────┐
//!                     │  UserStore  │
//!                     └─────────────┘
//! ```
//!
//! The transport owns the socket. The hub only ever writes [`Delivery`]
//! values into a connection's outbox.

pub mod connection;
pub mod error;
pub mod gateway;
pub mod heartbeat;
pub mod hub;
pub mod presence;
pub mod rooms;
mod router;
mod signaling;
pub mod store;

#[cfg(test)]
mod testing;

pub use connection::{outbox, ConnectionId, Delivery, Inbox, Outbox, RoomId, UserId};
pub use error::HubError;
pub use gateway::{Gateway, RoomEmitter, UserEmitter};
pub use heartbeat::{
    HeartbeatMonitor, SweepObserver, SweepReport, DEFAULT_INTERVAL as DEFAULT_HEARTBEAT_INTERVAL,
};
pub use hub::{FrameOutcome, Hub, HubStats};
pub use presence::PresenceTracker;
pub use rooms::RoomDirectory;
pub use store::{NullUserStore, StoreError, UserStore};
