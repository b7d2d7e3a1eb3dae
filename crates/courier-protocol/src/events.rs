//! Typed inbound events.
//!
//! A decoded [`Frame`] is turned into a [`ClientEvent`] with one payload type
//! per event kind. Unknown event names parse to `None`; a payload that does
//! not fit its kind is a [`ProtocolError::Payload`].

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::codec::ProtocolError;
use crate::frames::{inbound, Frame};
use crate::ident::{normalize, Ident};

/// `new_message`: fan out to every participant except the sender.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub participants: Vec<Ident>,
    pub sender: Ident,
    /// The untouched payload, forwarded as `message_received`.
    pub payload: Value,
}

#[derive(Deserialize)]
struct NewMessageShape {
    chat: ChatShape,
    sender: Ident,
}

#[derive(Deserialize)]
struct ChatShape {
    participants: Vec<Ident>,
}

/// `reaction_changed`: forward the payload to the chat room.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionChanged {
    pub chat_id: Ident,
    pub payload: Value,
}

/// `typing` / `stop_typing`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Typing {
    pub chat_id: Ident,
    /// When non-empty, notices go to these users' rooms instead of the chat room.
    pub participants: Option<Vec<Ident>>,
}

/// `message_edited`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEdited {
    #[serde(skip)]
    pub chat_id: Ident,
    #[serde(default)]
    pub message_id: Value,
    #[serde(default)]
    pub content: Value,
}

/// `message_deleted_everyone`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeleted {
    #[serde(skip)]
    pub chat_id: Ident,
    #[serde(default)]
    pub message_id: Value,
}

/// `message_read`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRead {
    #[serde(skip)]
    pub chat_id: Ident,
    #[serde(default)]
    pub message_id: Value,
    #[serde(default)]
    pub user_id: Ident,
}

/// `call_user`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallUser {
    #[serde(default)]
    pub user_to_call: Ident,
    #[serde(default)]
    pub signal_data: Value,
    #[serde(default)]
    pub from: Value,
    #[serde(default)]
    pub call_type: Value,
    #[serde(default)]
    pub caller_info: Value,
}

/// `make_answer`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MakeAnswer {
    #[serde(default)]
    pub signal_data: Value,
    #[serde(default)]
    pub to: Ident,
}

/// `ice_candidate`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IceCandidate {
    #[serde(default)]
    pub candidate: Value,
    #[serde(default)]
    pub to: Ident,
}

/// `reject_call` / `end_call`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallTarget {
    #[serde(default)]
    pub to: Ident,
}

/// An inbound event with its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Setup(Ident),
    JoinChat(Ident),
    NewMessage(NewMessage),
    ReactionChanged(ReactionChanged),
    Typing(Typing),
    StopTyping(Typing),
    MessageEdited(MessageEdited),
    MessageDeletedEveryone(MessageDeleted),
    MessageRead(MessageRead),
    GoOffline,
    GoOnline,
    CallUser(CallUser),
    MakeAnswer(MakeAnswer),
    IceCandidate(IceCandidate),
    RejectCall(CallTarget),
    EndCall(CallTarget),
}

impl ClientEvent {
    /// Parse a decoded frame.
    ///
    /// Returns `Ok(None)` for event names the hub does not handle.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Payload`] if the payload does not match the event.
    pub fn parse(frame: Frame) -> Result<Option<Self>, ProtocolError> {
        let Frame { event, data } = frame;

        let parsed = match event.as_str() {
            inbound::SETUP => ClientEvent::Setup(setup_user(&data)),
            inbound::JOIN_CHAT => {
                ClientEvent::JoinChat(chat_target(&data, &["chatId", "roomId"]))
            }
            inbound::NEW_MESSAGE => {
                let shape: NewMessageShape = typed(inbound::NEW_MESSAGE, data.clone())?;
                ClientEvent::NewMessage(NewMessage {
                    participants: shape.chat.participants,
                    sender: shape.sender,
                    payload: data,
                })
            }
            inbound::REACTION_CHANGED => ClientEvent::ReactionChanged(ReactionChanged {
                chat_id: chat_target(&data, &["chatId"]),
                payload: data,
            }),
            inbound::TYPING => ClientEvent::Typing(typing(&data)),
            inbound::STOP_TYPING => ClientEvent::StopTyping(typing(&data)),
            inbound::MESSAGE_EDITED => {
                let chat_id = chat_target(&data, &["chatId"]);
                let edited: MessageEdited = object_or_default(inbound::MESSAGE_EDITED, data)?;
                ClientEvent::MessageEdited(MessageEdited { chat_id, ..edited })
            }
            inbound::MESSAGE_DELETED_EVERYONE => {
                let chat_id = chat_target(&data, &["chatId"]);
                let deleted: MessageDeleted =
                    object_or_default(inbound::MESSAGE_DELETED_EVERYONE, data)?;
                ClientEvent::MessageDeletedEveryone(MessageDeleted { chat_id, ..deleted })
            }
            inbound::MESSAGE_READ => {
                let chat_id = chat_target(&data, &["chatId"]);
                let read: MessageRead = object_or_default(inbound::MESSAGE_READ, data)?;
                ClientEvent::MessageRead(MessageRead { chat_id, ..read })
            }
            inbound::GO_OFFLINE => ClientEvent::GoOffline,
            inbound::GO_ONLINE => ClientEvent::GoOnline,
            inbound::CALL_USER => ClientEvent::CallUser(typed(inbound::CALL_USER, data)?),
            inbound::MAKE_ANSWER => ClientEvent::MakeAnswer(typed(inbound::MAKE_ANSWER, data)?),
            inbound::ICE_CANDIDATE => {
                ClientEvent::IceCandidate(typed(inbound::ICE_CANDIDATE, data)?)
            }
            inbound::REJECT_CALL => ClientEvent::RejectCall(typed(inbound::REJECT_CALL, data)?),
            inbound::END_CALL => ClientEvent::EndCall(typed(inbound::END_CALL, data)?),
            _ => return Ok(None),
        };

        Ok(Some(parsed))
    }

    /// The wire name of this event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Setup(_) => inbound::SETUP,
            ClientEvent::JoinChat(_) => inbound::JOIN_CHAT,
            ClientEvent::NewMessage(_) => inbound::NEW_MESSAGE,
            ClientEvent::ReactionChanged(_) => inbound::REACTION_CHANGED,
            ClientEvent::Typing(_) => inbound::TYPING,
            ClientEvent::StopTyping(_) => inbound::STOP_TYPING,
            ClientEvent::MessageEdited(_) => inbound::MESSAGE_EDITED,
            ClientEvent::MessageDeletedEveryone(_) => inbound::MESSAGE_DELETED_EVERYONE,
            ClientEvent::MessageRead(_) => inbound::MESSAGE_READ,
            ClientEvent::GoOffline => inbound::GO_OFFLINE,
            ClientEvent::GoOnline => inbound::GO_ONLINE,
            ClientEvent::CallUser(_) => inbound::CALL_USER,
            ClientEvent::MakeAnswer(_) => inbound::MAKE_ANSWER,
            ClientEvent::IceCandidate(_) => inbound::ICE_CANDIDATE,
            ClientEvent::RejectCall(_) => inbound::REJECT_CALL,
            ClientEvent::EndCall(_) => inbound::END_CALL,
        }
    }
}

fn typed<T: DeserializeOwned>(event: &'static str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::Payload { event, source })
}

/// Chat events accept either a bare identifier or an object.
fn object_or_default<T: DeserializeOwned + Default>(
    event: &'static str,
    data: Value,
) -> Result<T, ProtocolError> {
    if data.is_object() {
        typed(event, data)
    } else {
        Ok(T::default())
    }
}

/// The first of `keys` that resolves to an identifier, else the whole payload.
fn chat_target(data: &Value, keys: &[&str]) -> Ident {
    let named = keys
        .iter()
        .filter_map(|key| data.get(*key))
        .find_map(normalize);

    match named {
        Some(id) => Ident::from(id),
        None => Ident::from_value(data),
    }
}

/// Users are named by `_id` or `id`; bare ids are taken as they are.
fn setup_user(data: &Value) -> Ident {
    if data.is_object() {
        ["_id", "id"]
            .iter()
            .filter_map(|key| data.get(*key))
            .find_map(normalize)
            .map(Ident::from)
            .unwrap_or_default()
    } else {
        Ident::from_value(data)
    }
}

fn typing(data: &Value) -> Typing {
    Typing {
        chat_id: chat_target(data, &["chatId", "roomId"]),
        participants: data
            .get("participants")
            .and_then(Value::as_array)
            .map(|list| list.iter().map(Ident::from_value).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(event: &str, data: Value) -> Result<Option<ClientEvent>, ProtocolError> {
        ClientEvent::parse(Frame::new(event, data))
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        assert_eq!(parse("dance", json!({})).unwrap(), None);
    }

    #[test]
    fn test_setup_normalizes_user() {
        let event = parse("setup", json!({"_id": "u1", "name": "Ann"})).unwrap();
        assert_eq!(event, Some(ClientEvent::Setup(Ident::from("u1"))));
        assert_eq!(event.unwrap().name(), "setup");
    }

    #[test]
    fn test_setup_reads_only_user_keys() {
        let event = parse("setup", json!({"_id": "", "id": 7})).unwrap();
        assert_eq!(event, Some(ClientEvent::Setup(Ident::from("7"))));

        let event = parse("setup", json!("u2")).unwrap();
        assert_eq!(event, Some(ClientEvent::Setup(Ident::from("u2"))));

        for data in [json!({"userId": "u1"}), json!({"chatId": "c1"})] {
            let Some(ClientEvent::Setup(user)) = parse("setup", data).unwrap() else {
                panic!("expected setup");
            };
            assert!(user.is_none());
        }
    }

    #[test]
    fn test_join_chat_prefers_chat_keys() {
        let data = json!({"_id": "m1", "chatId": "c1"});
        assert_eq!(
            parse("join_chat", data.clone()).unwrap(),
            Some(ClientEvent::JoinChat(Ident::from("c1")))
        );
        let Some(ClientEvent::Typing(typing)) = parse("typing", data).unwrap() else {
            panic!("expected typing");
        };
        assert_eq!(typing.chat_id, Ident::from("c1"));

        assert_eq!(
            parse("join_chat", json!({"roomId": "r1", "id": "x"})).unwrap(),
            Some(ClientEvent::JoinChat(Ident::from("r1")))
        );
        assert_eq!(
            parse("join_chat", json!({"_id": "c2"})).unwrap(),
            Some(ClientEvent::JoinChat(Ident::from("c2")))
        );
    }

    #[test]
    fn test_new_message_requires_participants() {
        let data = json!({
            "chat": {"participants": [{"_id": "u1"}, "u2", 3]},
            "sender": {"id": "u1"},
            "content": "hi"
        });
        let Some(ClientEvent::NewMessage(msg)) = parse("new_message", data.clone()).unwrap()
        else {
            panic!("expected new_message");
        };
        assert_eq!(msg.sender.as_deref(), Some("u1"));
        let ids: Vec<_> = msg.participants.iter().filter_map(Ident::as_deref).collect();
        assert_eq!(ids, ["u1", "u2", "3"]);
        assert_eq!(msg.payload, data);

        let err = parse("new_message", json!({"sender": "u1"})).unwrap_err();
        assert!(matches!(err, ProtocolError::Payload { event: "new_message", .. }));
        assert!(!err.is_silent());
    }

    #[test]
    fn test_typing_shapes() {
        let Some(ClientEvent::Typing(plain)) = parse("typing", json!("c1")).unwrap() else {
            panic!("expected typing");
        };
        assert_eq!(plain.chat_id.as_deref(), Some("c1"));
        assert!(plain.participants.is_none());

        let data = json!({"roomId": "c2", "participants": ["u1", {"_id": "u2"}]});
        let Some(ClientEvent::StopTyping(targeted)) = parse("stop_typing", data).unwrap() else {
            panic!("expected stop_typing");
        };
        assert_eq!(targeted.chat_id.as_deref(), Some("c2"));
        assert_eq!(targeted.participants.map(|p| p.len()), Some(2));
    }

    #[test]
    fn test_chat_id_prefers_field_over_whole_payload() {
        let data = json!({"_id": "reaction-1", "chatId": "c1", "emoji": "+1"});
        let Some(ClientEvent::ReactionChanged(r)) = parse("reaction_changed", data).unwrap()
        else {
            panic!("expected reaction_changed");
        };
        assert_eq!(r.chat_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_message_events() {
        let data = json!({"chatId": "c1", "messageId": "m1", "content": "edited"});
        let Some(ClientEvent::MessageEdited(edit)) = parse("message_edited", data).unwrap() else {
            panic!("expected message_edited");
        };
        assert_eq!(edit.chat_id.as_deref(), Some("c1"));
        assert_eq!(edit.message_id, json!("m1"));

        let Some(ClientEvent::MessageDeletedEveryone(del)) =
            parse("message_deleted_everyone", json!("c1")).unwrap()
        else {
            panic!("expected message_deleted_everyone");
        };
        assert_eq!(del.chat_id.as_deref(), Some("c1"));
        assert_eq!(del.message_id, Value::Null);

        let data = json!({"chatId": "c1", "messageId": "m1", "userId": {"_id": "u9"}});
        let Some(ClientEvent::MessageRead(read)) = parse("message_read", data).unwrap() else {
            panic!("expected message_read");
        };
        assert_eq!(read.user_id.as_deref(), Some("u9"));
    }

    #[test]
    fn test_signaling_payloads() {
        let data = json!({"userToCall": {"_id": "u2"}, "signalData": {"sdp": "x"}, "callType": "video"});
        let Some(ClientEvent::CallUser(call)) = parse("call_user", data).unwrap() else {
            panic!("expected call_user");
        };
        assert_eq!(call.user_to_call.as_deref(), Some("u2"));
        assert_eq!(call.from, Value::Null);

        assert!(matches!(
            parse("end_call", Value::Null),
            Err(ProtocolError::Payload { event: "end_call", .. })
        ));
    }
}
