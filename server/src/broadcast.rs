//! Broadcast dispatcher: computes outbound snapshots and fans them out
//!
//! Every structured payload is run through the payload codec before being
//! wrapped in its wire event. A broadcast triggered by one logical event
//! is exactly one message per channel; partial updates are never observable
//! mid-transition.

use log::{debug, error};
use serde::Serialize;
use shared::codec;
use shared::{EncodedPayload, GridSize, Participant, ServerEvent};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::Message;

/// Fan-out endpoint over all currently connected transport channels.
///
/// Holds one outbound sender per connection. Sends never block: channels
/// are unbounded and a failed send only means the connection is already
/// tearing down, which the dispatch loop cleans up separately.
pub struct BroadcastDispatcher {
    channels: HashMap<u32, UnboundedSender<Message>>,
}

impl BroadcastDispatcher {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    pub fn register(&mut self, conn_id: u32, sender: UnboundedSender<Message>) {
        self.channels.insert(conn_id, sender);
    }

    pub fn unregister(&mut self, conn_id: u32) -> bool {
        self.channels.remove(&conn_id).is_some()
    }

    pub fn connection_count(&self) -> usize {
        self.channels.len()
    }

    /// Pushes the initial state slices a fresh connection needs before it
    /// can join: the emoji catalog, grid dimensions, and background.
    pub fn send_welcome(
        &self,
        conn_id: u32,
        catalog: &[String],
        grid: GridSize,
        background: &str,
    ) {
        if let Some(payload) = self.encoded(&catalog) {
            self.send_to(conn_id, &ServerEvent::EmojiList(payload));
        }
        if let Some(payload) = self.encoded(&grid) {
            self.send_to(conn_id, &ServerEvent::GridSizeUpdate(payload));
        }
        if let Some(payload) = self.encoded(&background) {
            self.send_to(conn_id, &ServerEvent::BackgroundImageUpdate(payload));
        }
    }

    /// Sends the full participant snapshot to every connected channel.
    pub fn broadcast_participants(&self, snapshot: &BTreeMap<u32, Participant>) {
        if let Some(payload) = self.encoded(snapshot) {
            self.broadcast(&ServerEvent::UsersUpdate(payload));
        }
    }

    pub fn broadcast_grid(&self, grid: GridSize) {
        if let Some(payload) = self.encoded(&grid) {
            self.broadcast(&ServerEvent::GridSizeUpdate(payload));
        }
    }

    pub fn broadcast_background(&self, background: &str) {
        if let Some(payload) = self.encoded(&background) {
            self.broadcast(&ServerEvent::BackgroundImageUpdate(payload));
        }
    }

    pub fn broadcast_chat(&self, line: &str) {
        self.broadcast(&ServerEvent::ChatMessage(line.to_string()));
    }

    pub fn send_emoji_error(&self, conn_id: u32, reason: &str) {
        self.send_to(conn_id, &ServerEvent::EmojiError(reason.to_string()));
    }

    fn broadcast(&self, event: &ServerEvent) {
        let Some(message) = to_message(event) else {
            return;
        };

        for (conn_id, sender) in &self.channels {
            if sender.send(message.clone()).is_err() {
                debug!("Connection {} is gone, skipping broadcast", conn_id);
            }
        }
    }

    fn send_to(&self, conn_id: u32, event: &ServerEvent) {
        let Some(sender) = self.channels.get(&conn_id) else {
            return;
        };
        let Some(message) = to_message(event) else {
            return;
        };

        if sender.send(message).is_err() {
            debug!("Connection {} is gone, dropping message", conn_id);
        }
    }

    fn encoded<T: Serialize>(&self, value: &T) -> Option<EncodedPayload> {
        match codec::encode(value) {
            Ok(bytes) => Some(EncodedPayload(bytes)),
            Err(e) => {
                error!("Failed to encode payload: {}", e);
                None
            }
        }
    }
}

impl Default for BroadcastDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn to_message(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            error!("Failed to serialize wire event: {}", e);
            None
        }
    }
}
