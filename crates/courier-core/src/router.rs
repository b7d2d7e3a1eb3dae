//! Event routing: one handler per inbound event kind.
//!
//! Handlers run synchronously on the calling connection's task, so frames from
//! one connection are applied in arrival order.

use crate::connection::ConnectionId;
use crate::error::HubError;
use crate::hub::Hub;
use courier_protocol::events::{NewMessage, Typing};
use courier_protocol::notices::{DeleteNotice, EditNotice, ReadNotice, TypingNotice};
use courier_protocol::{outbound, ClientEvent, Ident};
use std::collections::HashSet;
use tracing::{debug, trace};

impl Hub {
    /// Apply a typed event sent by `connection_id`.
    ///
    /// # Errors
    ///
    /// Returns an error when the event cannot be applied, e.g. a required
    /// identifier is missing or the connection never ran `setup`.
    pub fn dispatch(
        &self,
        connection_id: &ConnectionId,
        event: ClientEvent,
    ) -> Result<(), HubError> {
        trace!(connection = %connection_id, event = event.name(), "Dispatching");

        match event {
            ClientEvent::Setup(user) => self.on_setup(connection_id, user),
            ClientEvent::JoinChat(room) => {
                self.rooms.join(connection_id, room);
                Ok(())
            }
            ClientEvent::NewMessage(message) => self.on_new_message(message),
            ClientEvent::ReactionChanged(reaction) => {
                self.rooms.broadcast(
                    reaction.chat_id,
                    outbound::REACTION_UPDATED,
                    &reaction.payload,
                    Some(connection_id),
                );
                Ok(())
            }
            ClientEvent::Typing(typing) => {
                self.on_typing(connection_id, outbound::TYPING, typing);
                Ok(())
            }
            ClientEvent::StopTyping(typing) => {
                self.on_typing(connection_id, outbound::STOP_TYPING, typing);
                Ok(())
            }
            ClientEvent::MessageEdited(edit) => {
                let notice = EditNotice {
                    message_id: &edit.message_id,
                    content: &edit.content,
                    is_edited: true,
                };
                self.rooms
                    .broadcast(&edit.chat_id, outbound::MESSAGE_EDITED, &notice, Some(connection_id));
                Ok(())
            }
            ClientEvent::MessageDeletedEveryone(delete) => {
                let notice = DeleteNotice {
                    message_id: &delete.message_id,
                };
                self.rooms.broadcast(
                    &delete.chat_id,
                    outbound::MESSAGE_DELETED_EVERYONE,
                    &notice,
                    Some(connection_id),
                );
                Ok(())
            }
            ClientEvent::MessageRead(read) => {
                let notice = ReadNotice {
                    message_id: &read.message_id,
                    user_id: read.user_id.as_deref(),
                };
                self.rooms
                    .broadcast(&read.chat_id, outbound::MESSAGE_READ, &notice, Some(connection_id));
                Ok(())
            }
            ClientEvent::GoOffline => self.on_go_offline(connection_id),
            ClientEvent::GoOnline => self.on_go_online(connection_id),
            ClientEvent::CallUser(call) => {
                self.relay_call(connection_id, call);
                Ok(())
            }
            ClientEvent::MakeAnswer(answer) => {
                self.relay_answer(connection_id, answer);
                Ok(())
            }
            ClientEvent::IceCandidate(candidate) => {
                self.relay_ice_candidate(connection_id, candidate);
                Ok(())
            }
            ClientEvent::RejectCall(target) => {
                self.relay_closed(connection_id, outbound::CALL_REJECTED, target);
                Ok(())
            }
            ClientEvent::EndCall(target) => {
                self.relay_closed(connection_id, outbound::CALL_ENDED, target);
                Ok(())
            }
        }
    }

    fn on_setup(&self, connection_id: &ConnectionId, user: Ident) -> Result<(), HubError> {
        let user = user.into_inner().ok_or(HubError::MissingIdentifier("user id"))?;

        self.rooms.bind_user(connection_id, &user)?;
        self.rooms.join(connection_id, &user);
        let Some(came_online) = self.attach_presence(&user, connection_id) else {
            return Ok(());
        };

        self.rooms.send_to(
            connection_id,
            outbound::ONLINE_USERS,
            &self.presence.online_user_ids(),
        );

        if came_online {
            self.announce_online(&user, connection_id);
        }
        Ok(())
    }

    /// Deliver to each participant's mailbox, never back to the sender.
    fn on_new_message(&self, message: NewMessage) -> Result<(), HubError> {
        let sender = message
            .sender
            .as_deref()
            .ok_or(HubError::MissingIdentifier("sender"))?;

        let mut seen = HashSet::new();
        let recipients = message
            .participants
            .iter()
            .filter_map(Ident::as_deref)
            .filter(|participant| *participant != sender && seen.insert(*participant));

        let mut delivered = 0;
        for participant in recipients {
            delivered += self.rooms.broadcast(
                participant,
                outbound::MESSAGE_RECEIVED,
                &message.payload,
                None,
            );
        }

        debug!(sender = %sender, recipients = delivered, "Relayed new message");
        Ok(())
    }

    fn on_typing(&self, connection_id: &ConnectionId, event: &str, typing: Typing) {
        let Some(chat_id) = typing.chat_id.as_deref() else {
            return;
        };
        let user = self.rooms.user_of(connection_id);
        let notice = TypingNotice {
            chat_id,
            user_id: user.as_deref(),
        };

        match typing.participants.filter(|list| !list.is_empty()) {
            Some(participants) => {
                for participant in participants.iter().filter_map(Ident::as_deref) {
                    if Some(participant) != user.as_deref() {
                        self.rooms
                            .broadcast(participant, event, &notice, Some(connection_id));
                    }
                }
            }
            None => {
                self.rooms
                    .broadcast(chat_id, event, &notice, Some(connection_id));
            }
        }
    }

    fn on_go_offline(&self, connection_id: &ConnectionId) -> Result<(), HubError> {
        let user = self.bound_user(connection_id)?;
        if self.presence.remove_connection(&user, connection_id) {
            self.mark_offline_if_empty(&user);
        }
        Ok(())
    }

    fn on_go_online(&self, connection_id: &ConnectionId) -> Result<(), HubError> {
        let user = self.bound_user(connection_id)?;
        if self.attach_presence(&user, connection_id) == Some(true) {
            self.announce_online(&user, connection_id);
        }
        Ok(())
    }

    fn bound_user(&self, connection_id: &ConnectionId) -> Result<String, HubError> {
        self.rooms
            .user_of(connection_id)
            .ok_or_else(|| HubError::NotBound(connection_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use crate::hub::{FrameOutcome, Hub};
    use crate::testing::{online, settle, Client, RecordingStore};
    use serde_json::json;

    #[test]
    fn test_setup_scenario() {
        let hub = Hub::default();
        let mut other = Client::connect(&hub);
        let mut a = Client::connect(&hub);

        let outcome = a.send(&hub, json!({"event": "setup", "data": {"_id": "u1"}}));
        assert_eq!(outcome, FrameOutcome::Handled);

        assert_eq!(
            a.frames(),
            vec![json!({"event": "online_users", "data": ["u1"]})]
        );
        assert_eq!(
            other.frames(),
            vec![json!({"event": "status_change", "data": {"user_id": "u1", "status": "online"}})]
        );
        assert!(hub.rooms().room_exists("u1"));
        assert!(hub.presence().is_online("u1"));
    }

    #[test]
    fn test_setup_requires_user_and_single_binding() {
        let hub = Hub::default();
        let mut a = Client::connect(&hub);

        let outcome = a.send(&hub, json!({"event": "setup", "data": {"name": "x"}}));
        assert_eq!(outcome, FrameOutcome::Failed);

        a.send(&hub, json!({"event": "setup", "data": "u1"}));
        a.drain();
        let outcome = a.send(&hub, json!({"event": "setup", "data": "u2"}));
        assert_eq!(outcome, FrameOutcome::Failed);
        assert!(!hub.presence().is_online("u2"));
        assert!(a.drain().is_empty());
    }

    #[test]
    fn test_second_connection_does_not_reannounce() {
        let hub = Hub::default();
        let _first = online(&hub, "u1");
        let mut watcher = online(&hub, "u2");
        let mut second = Client::connect(&hub);

        second.send(&hub, json!({"event": "setup", "data": {"id": "u1"}}));
        let online_users = &second.frames()[0];
        assert_eq!(online_users["event"], "online_users");
        assert_eq!(online_users["data"].as_array().map(Vec::len), Some(2));
        assert!(watcher.frames().is_empty());
        assert_eq!(hub.presence().connections_of("u1").len(), 2);
    }

    #[test]
    fn test_room_emit_reaches_only_members() {
        let hub = std::sync::Arc::new(Hub::default());
        let mut a = online(&hub, "u1");
        let mut b = online(&hub, "u2");
        settle(&mut [&mut a, &mut b]);

        a.send(&hub, json!({"event": "join_chat", "data": "c1"}));
        let delivered = hub
            .gateway()
            .to("c1")
            .emit("group_updated", &json!({"name": "team"}));

        assert_eq!(delivered, 1);
        assert_eq!(
            a.frames(),
            vec![json!({"event": "group_updated", "data": {"name": "team"}})]
        );
        assert!(b.frames().is_empty());
    }

    #[test]
    fn test_new_message_goes_to_participant_mailboxes() {
        let hub = Hub::default();
        let mut sender = online(&hub, "u1");
        let mut alice = online(&hub, "u2");
        let mut bob = online(&hub, "u3");
        let mut stranger = online(&hub, "u4");
        settle(&mut [&mut sender, &mut alice, &mut bob]);
        // Joined the chat room but not a participant: must not receive.
        stranger.send(&hub, json!({"event": "join_chat", "data": "c1"}));

        let data = json!({
            "_id": "m1",
            "content": "hello",
            "chat": {"_id": "c1", "participants": [{"_id": "u1"}, {"_id": "u2"}, "u3", "u3"]},
            "sender": {"_id": "u1"}
        });
        let outcome = sender.send(&hub, json!({"event": "new_message", "data": data}));
        assert_eq!(outcome, FrameOutcome::Handled);

        let expected = json!({"event": "message_received", "data": data});
        assert_eq!(alice.frames(), vec![expected.clone()]);
        assert_eq!(bob.frames(), vec![expected]);
        assert!(sender.frames().is_empty());
        assert!(stranger.frames().is_empty());
    }

    #[test]
    fn test_chat_room_broadcasts_exclude_sender() {
        let hub = Hub::default();
        let mut a = online(&hub, "u1");
        let mut b = online(&hub, "u2");
        settle(&mut [&mut a]);
        a.send(&hub, json!({"event": "join_chat", "data": {"_id": "c1"}}));
        b.send(&hub, json!({"event": "join_chat", "data": "c1"}));

        let reaction = json!({"chatId": "c1", "messageId": "m1", "emoji": "+1"});
        a.send(&hub, json!({"event": "reaction_changed", "data": reaction}));
        a.send(
            &hub,
            json!({"event": "message_edited", "data": {"chatId": "c1", "messageId": "m1", "content": "new"}}),
        );
        a.send(
            &hub,
            json!({"event": "message_deleted_everyone", "data": {"chatId": "c1", "messageId": "m2"}}),
        );
        a.send(
            &hub,
            json!({"event": "message_read", "data": {"chatId": "c1", "messageId": "m3", "userId": "u1"}}),
        );

        assert!(a.frames().is_empty());
        assert_eq!(
            b.frames(),
            vec![
                json!({"event": "reaction_updated", "data": reaction}),
                json!({"event": "message_edited", "data": {"messageId": "m1", "content": "new", "isEdited": true}}),
                json!({"event": "message_deleted_everyone", "data": {"messageId": "m2"}}),
                json!({"event": "message_read", "data": {"messageId": "m3", "userId": "u1"}}),
            ]
        );
    }

    #[test]
    fn test_typing_to_chat_room() {
        let hub = Hub::default();
        let mut a = online(&hub, "u1");
        let mut b = online(&hub, "u2");
        settle(&mut [&mut a]);
        a.send(&hub, json!({"event": "join_chat", "data": "c1"}));
        b.send(&hub, json!({"event": "join_chat", "data": "c1"}));

        a.send(&hub, json!({"event": "typing", "data": "c1"}));
        a.send(&hub, json!({"event": "stop_typing", "data": {"chatId": "c1", "participants": []}}));

        assert!(a.frames().is_empty());
        assert_eq!(
            b.events(),
            vec!["typing".to_string(), "stop_typing".to_string()]
        );
    }

    #[test]
    fn test_typing_to_participants() {
        let hub = Hub::default();
        let mut a = online(&hub, "u1");
        let mut a_laptop = online(&hub, "u1");
        let mut b = online(&hub, "u2");
        let mut c = online(&hub, "u3");
        settle(&mut [&mut a, &mut a_laptop, &mut b]);

        a.send(
            &hub,
            json!({"event": "typing", "data": {"chatId": "c1", "participants": ["u1", {"_id": "u2"}]}}),
        );

        assert!(a.frames().is_empty());
        assert!(a_laptop.frames().is_empty());
        assert_eq!(
            b.frames(),
            vec![json!({"event": "typing", "data": {"chatId": "c1", "userId": "u1"}})]
        );
        assert!(c.frames().is_empty());
    }

    #[tokio::test]
    async fn test_go_offline_and_online() {
        let (store, mut writes) = RecordingStore::new();
        let hub = Hub::new(store);
        let mut a = online(&hub, "u1");
        let mut watcher = online(&hub, "u2");
        settle(&mut [&mut a]);

        assert_eq!(a.send(&hub, json!({"event": "go_offline"})), FrameOutcome::Handled);
        assert!(!hub.presence().is_online("u1"));
        let offline = watcher.frames();
        assert_eq!(offline.len(), 1);
        assert_eq!(offline[0]["data"]["status"], "offline");
        // The connection stays open, so it hears its own offline notice.
        assert_eq!(a.events(), vec!["status_change"]);
        assert!(writes.recv().await.is_some());

        // A second go_offline is not a new transition.
        a.send(&hub, json!({"event": "go_offline"}));
        assert!(watcher.frames().is_empty());

        a.send(&hub, json!({"event": "go_online"}));
        assert!(hub.presence().is_online("u1"));
        assert_eq!(
            watcher.frames(),
            vec![json!({"event": "status_change", "data": {"user_id": "u1", "status": "online"}})]
        );
        assert!(a.frames().is_empty());
    }

    #[test]
    fn test_presence_events_require_setup() {
        let hub = Hub::default();
        let a = Client::connect(&hub);
        assert_eq!(a.send(&hub, json!({"event": "go_online"})), FrameOutcome::Failed);
        assert_eq!(a.send(&hub, json!({"event": "go_offline"})), FrameOutcome::Failed);
        assert_eq!(hub.presence().online_count(), 0);
    }
}
