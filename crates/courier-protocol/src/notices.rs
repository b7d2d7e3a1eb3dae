//! Outbound payloads produced by the hub.
//!
//! Events that forward the client's payload verbatim (`message_received`,
//! `reaction_updated`) have no type here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Presence status carried by `status_change`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Online,
    Offline,
}

/// Payload of `status_change`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub user_id: String,
    pub status: Status,
    /// Milliseconds since the Unix epoch; only present when going offline.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_seen: Option<u64>,
}

impl StatusChange {
    /// A user became reachable.
    #[must_use]
    pub fn online(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            status: Status::Online,
            last_seen: None,
        }
    }

    /// A user's last connection went away.
    #[must_use]
    pub fn offline(user_id: impl Into<String>, last_seen: u64) -> Self {
        Self {
            user_id: user_id.into(),
            status: Status::Offline,
            last_seen: Some(last_seen),
        }
    }
}

/// Payload of `typing` and `stop_typing`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice<'a> {
    pub chat_id: &'a str,
    pub user_id: Option<&'a str>,
}

/// Payload of `message_edited`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditNotice<'a> {
    pub message_id: &'a Value,
    pub content: &'a Value,
    pub is_edited: bool,
}

/// Payload of `message_deleted_everyone`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteNotice<'a> {
    pub message_id: &'a Value,
}

/// Payload of `message_read`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadNotice<'a> {
    pub message_id: &'a Value,
    pub user_id: Option<&'a str>,
}

/// Payload of `call_made`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOffer<'a> {
    pub signal: &'a Value,
    pub from: &'a Value,
    pub call_type: &'a Value,
    pub caller_info: &'a Value,
}

/// Payload of `answer_made`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallAnswer<'a> {
    pub signal: &'a Value,
    pub from: Option<&'a str>,
}

/// Payload of `ice_candidate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IceRelay<'a> {
    pub candidate: &'a Value,
    pub from: Option<&'a str>,
}

/// Payload of `call_rejected` and `call_ended`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallClosed<'a> {
    pub from: Option<&'a str>,
}
