//! Chat message bodies.

use serde::{Deserialize, Serialize};

use crate::{
    errors::Result,
    ids::{MessageId, RoomId, UserId},
    timestamp::Timestamp,
};

/// Kind of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Regular message written by a member.
    #[default]
    Talk,
    /// A member entered the room.
    Enter,
    /// A member left the room.
    Leave,
}

impl MessageKind {
    /// Whether this message announces a membership change (`ENTER`/`LEAVE`).
    pub fn is_membership_change(self) -> bool {
        matches!(self, Self::Enter | Self::Leave)
    }
}

/// A message as pushed on a room topic or returned by the history endpoint.
///
/// Immutable once appended to a log. `message_id` is the deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Server-assigned identifier, unique per room.
    pub message_id: MessageId,
    /// Room the message belongs to.
    pub room_id: RoomId,
    /// Sender. System messages may omit it.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Sender display name.
    #[serde(default)]
    pub nickname: Option<String>,
    /// Body text.
    #[serde(default)]
    pub message: String,
    /// Message kind.
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    /// Server creation time. Stamped locally when absent or unreadable.
    #[serde(default, deserialize_with = "crate::timestamp::deserialize_lenient")]
    pub created_at: Option<Timestamp>,
}

impl ChatMessage {
    /// Parse a `MESSAGE` frame body.
    ///
    /// # Errors
    ///
    /// `ProtocolError::InvalidJson` when the body is not a chat message.
    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }
}

/// Body of a `SEND` frame to the message destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    /// Target room.
    pub room_id: RoomId,
    /// Body text.
    pub message: String,
    /// Always `TALK` for user-composed messages.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Client-side send time.
    pub created_at: Timestamp,
}

impl OutgoingMessage {
    /// A `TALK` message for `room_id`.
    pub fn talk(room_id: RoomId, message: impl Into<String>, created_at: Timestamp) -> Self {
        Self { room_id, message: message.into(), kind: MessageKind::Talk, created_at }
    }

    /// JSON text for the frame body.
    ///
    /// # Errors
    ///
    /// `ProtocolError::InvalidJson` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_server_frame_with_numeric_ids() {
        let body = r#"{"messageId":11,"roomId":3,"userId":42,"nickname":"kim",
            "message":"hi","type":"TALK","createdAt":"2024-05-01T09:30:00"}"#;
        let msg = ChatMessage::from_json(body).unwrap();

        assert_eq!(msg.message_id, MessageId::from(11));
        assert_eq!(msg.room_id, RoomId::new("3"));
        assert_eq!(msg.user_id, Some(UserId::new("42")));
        assert_eq!(msg.kind, MessageKind::Talk);
        assert_eq!(msg.created_at.unwrap().as_str(), "2024-05-01T09:30:00");
    }

    #[test]
    fn missing_optional_fields_default() {
        let msg = ChatMessage::from_json(r#"{"messageId":"m1","roomId":"r1","type":"ENTER"}"#)
            .unwrap();
        assert!(msg.kind.is_membership_change());
        assert!(msg.created_at.is_none());
        assert!(msg.nickname.is_none());
        assert_eq!(msg.message, "");
    }

    #[test]
    fn unreadable_created_at_does_not_fail_message() {
        let body = r#"{"messageId":"m1","roomId":"r1","message":"hi","createdAt":"last tuesday"}"#;
        let msg = ChatMessage::from_json(body).unwrap();
        assert_eq!(msg.message, "hi");
        assert!(msg.created_at.is_none());

        let body = r#"{"messageId":"m2","roomId":"r1","createdAt":[2024,5,1,9,30,0]}"#;
        let msg = ChatMessage::from_json(body).unwrap();
        assert_eq!(msg.created_at.unwrap(), Timestamp::parse("2024-05-01T09:30:00Z").unwrap());

        let body = r#"{"messageId":"m3","roomId":"r1","createdAt":"2024-05-01 09:30:00"}"#;
        let msg = ChatMessage::from_json(body).unwrap();
        assert_eq!(msg.created_at.unwrap().as_str(), "2024-05-01 09:30:00");
    }

    #[test]
    fn reject_missing_message_id() {
        assert!(ChatMessage::from_json(r#"{"roomId":"r1"}"#).is_err());
        assert!(ChatMessage::from_json("not json").is_err());
    }

    #[test]
    fn outgoing_wire_shape() {
        let created = Timestamp::parse("2024-05-01T09:30:00.000Z").unwrap();
        let json = OutgoingMessage::talk(RoomId::new("7"), "hello", created).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["roomId"], "7");
        assert_eq!(value["message"], "hello");
        assert_eq!(value["type"], "TALK");
        assert_eq!(value["createdAt"], "2024-05-01T09:30:00.000Z");
    }
}
