//! Message stream processing.
//!
//! Turns `MESSAGE` frame bodies into chat messages and keeps the ordered,
//! deduplicated log of a room.

use std::collections::HashSet;

use clubchat_proto::{ChatMessage, MessageId, Result, Timestamp};

/// Lifecycle of the room subscription as seen by the stream processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StreamState {
    /// No subscription yet (joining, connecting, or reconnecting).
    #[default]
    Idle,
    /// Frames for the room are being received.
    Subscribed,
    /// Torn down; nothing is appended anymore.
    Unsubscribed,
}

/// Decode a `MESSAGE` body, stamping `created_at` when the server left it out.
///
/// # Errors
///
/// `ProtocolError::InvalidJson` when the body is not a chat message.
pub fn decode_message(body: &str, received_at: Timestamp) -> Result<ChatMessage> {
    let mut message = ChatMessage::from_json(body)?;
    if message.created_at.is_none() {
        message.created_at = Some(received_at);
    }
    Ok(message)
}

/// Append-only message log keyed by message id.
///
/// # Invariants
///
/// - No two entries share a `message_id`
/// - Order is arrival order; entries are never re-sorted or mutated
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    entries: Vec<ChatMessage>,
    ids: HashSet<MessageId>,
}

impl MessageLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append unless a message with the same id is present. Returns whether
    /// the message was appended.
    pub fn append(&mut self, message: ChatMessage) -> bool {
        if !self.ids.insert(message.message_id.clone()) {
            return false;
        }
        self.entries.push(message);
        true
    }

    /// Whether a message with `id` is present.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    /// Replace the whole log, keeping the first occurrence of each id.
    pub fn replace(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.entries.clear();
        self.ids.clear();
        for message in messages {
            self.append(message);
        }
    }

    /// Remove and return every entry in order.
    pub fn take(&mut self) -> Vec<ChatMessage> {
        self.ids.clear();
        std::mem::take(&mut self.entries)
    }

    /// Entries in order.
    pub fn entries(&self) -> &[ChatMessage] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
