//! # courier-protocol
//!
//! Wire protocol definitions for the Courier chat hub.
//!
//! Every frame, in both directions, is a JSON document:
//!
//! ```text
//! { "event": "<name>", "data": <event-specific payload> }
//! ```
//!
//! This crate covers:
//!
//! - `Frame` and the event-name constants
//! - JSON codec
//! - Identifier normalization shared by every room/user lookup
//! - Typed inbound events and outbound payloads
//!
//! ## Example
//!
//! ```rust
//! use courier_protocol::{codec, ClientEvent};
//!
//! let frame = codec::decode(br#"{"event":"join_chat","data":{"_id":42}}"#).unwrap();
//! let event = ClientEvent::parse(frame).unwrap().unwrap();
//! assert!(matches!(event, ClientEvent::JoinChat(id) if id.as_deref() == Some("42")));
//! ```

pub mod codec;
pub mod events;
pub mod frames;
pub mod ident;
pub mod notices;

pub use codec::{decode, encode, encode_event, ProtocolError};
pub use events::ClientEvent;
pub use frames::{inbound, outbound, Frame};
pub use ident::{normalize, Ident};
pub use notices::{Status, StatusChange};
