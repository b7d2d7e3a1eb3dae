//! Frame types for the Courier protocol.
//!
//! Every message in either direction is a single JSON document of the form
//! `{"event": "<name>", "data": <payload>}`. There is no envelope versioning,
//! no acknowledgement and no sequence number.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event names sent by clients.
pub mod inbound {
    pub const SETUP: &str = "setup";
    pub const JOIN_CHAT: &str = "join_chat";
    pub const NEW_MESSAGE: &str = "new_message";
    pub const REACTION_CHANGED: &str = "reaction_changed";
    pub const TYPING: &str = "typing";
    pub const STOP_TYPING: &str = "stop_typing";
    pub const MESSAGE_EDITED: &str = "message_edited";
    pub const MESSAGE_DELETED_EVERYONE: &str = "message_deleted_everyone";
    pub const MESSAGE_READ: &str = "message_read";
    pub const GO_OFFLINE: &str = "go_offline";
    pub const GO_ONLINE: &str = "go_online";
    pub const CALL_USER: &str = "call_user";
    pub const MAKE_ANSWER: &str = "make_answer";
    pub const ICE_CANDIDATE: &str = "ice_candidate";
    pub const REJECT_CALL: &str = "reject_call";
    pub const END_CALL: &str = "end_call";
}

/// Event names emitted by the hub itself.
///
/// Application events injected through the gateway use names chosen by
/// the caller and are not listed here.
pub mod outbound {
    pub const ONLINE_USERS: &str = "online_users";
    pub const STATUS_CHANGE: &str = "status_change";
    pub const MESSAGE_RECEIVED: &str = "message_received";
    pub const REACTION_UPDATED: &str = "reaction_updated";
    pub const TYPING: &str = "typing";
    pub const STOP_TYPING: &str = "stop_typing";
    pub const MESSAGE_EDITED: &str = "message_edited";
    pub const MESSAGE_DELETED_EVERYONE: &str = "message_deleted_everyone";
    pub const MESSAGE_READ: &str = "message_read";
    pub const CALL_MADE: &str = "call_made";
    pub const ANSWER_MADE: &str = "answer_made";
    pub const ICE_CANDIDATE: &str = "ice_candidate";
    pub const CALL_REJECTED: &str = "call_rejected";
    pub const CALL_ENDED: &str = "call_ended";
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Event name.
    pub event: String,
    /// Event-specific payload; absent data decodes as `null`.
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    /// Create a new frame.
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Borrowed frame used when encoding, so payloads are never cloned.
#[derive(Debug, Serialize)]
pub(crate) struct FrameRef<'a, T: Serialize + ?Sized> {
    pub event: &'a str,
    pub data: &'a T,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_missing_data_is_null() {
        let frame: Frame = serde_json::from_str(r#"{"event":"go_online"}"#).unwrap();
        assert_eq!(frame.event, inbound::GO_ONLINE);
        assert_eq!(frame.data, Value::Null);
    }
}
