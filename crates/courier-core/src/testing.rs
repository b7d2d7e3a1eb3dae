//! Helpers shared by the unit tests.

use crate::connection::{outbox, ConnectionId, Delivery, Inbox};
use crate::hub::{FrameOutcome, Hub};
use crate::store::{StoreError, UserStore};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A connected test client.
pub(crate) struct Client {
    pub id: ConnectionId,
    pub inbox: Inbox,
}

impl Client {
    pub fn connect(hub: &Hub) -> Self {
        let (tx, inbox) = outbox();
        Self {
            id: hub.connect(tx),
            inbox,
        }
    }

    pub fn send(&self, hub: &Hub, frame: Value) -> FrameOutcome {
        hub.handle_frame(&self.id, frame.to_string().as_bytes())
    }

    /// Drain queued frames as JSON values, skipping pings and closes.
    pub fn frames(&mut self) -> Vec<Value> {
        self.drain()
            .into_iter()
            .filter_map(|delivery| match delivery {
                Delivery::Frame(bytes) => serde_json::from_slice(&bytes).ok(),
                _ => None,
            })
            .collect()
    }

    /// Drain queued frames, keeping only their event names.
    pub fn events(&mut self) -> Vec<String> {
        self.frames()
            .into_iter()
            .filter_map(|f| f["event"].as_str().map(str::to_string))
            .collect()
    }

    pub fn drain(&mut self) -> Vec<Delivery> {
        let mut out = Vec::new();
        while let Ok(delivery) = self.inbox.try_recv() {
            out.push(delivery);
        }
        out
    }
}

/// Set up a client as `user` and discard what the setup produced.
pub(crate) fn online(hub: &Hub, user: &str) -> Client {
    let mut client = Client::connect(hub);
    client.send(hub, serde_json::json!({"event": "setup", "data": {"_id": user}}));
    client.drain();
    client
}

/// Discard whatever the clients have queued so far, such as presence
/// notices for users that came online after them.
pub(crate) fn settle(clients: &mut [&mut Client]) {
    for client in clients.iter_mut() {
        client.drain();
    }
}

/// Store that reports every write on a channel.
pub(crate) struct RecordingStore {
    tx: mpsc::UnboundedSender<(String, u64)>,
}

impl RecordingStore {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl UserStore for RecordingStore {
    async fn update_last_seen(&self, user_id: &str, last_seen: u64) -> Result<(), StoreError> {
        let _ = self.tx.send((user_id.to_string(), last_seen));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Store whose writes always fail.
pub(crate) struct FailingStore;

#[async_trait]
impl UserStore for FailingStore {
    async fn update_last_seen(&self, _user_id: &str, _last_seen: u64) -> Result<(), StoreError> {
        Err(StoreError::Backend("unavailable".into()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}
