//! Chat endpoints and STOMP destinations.

use crate::ids::RoomId;

/// Path of the raw WebSocket sub-endpoint of the SockJS chat endpoint.
pub const CHAT_ENDPOINT: &str = "/ws/chat/websocket";

/// Destination every chat message is sent to.
pub const SEND_DESTINATION: &str = "/app/message";

/// Topic a room's messages are pushed on.
pub fn room_topic(room: &RoomId) -> String {
    format!("/sub/ws/chat/rooms/{room}")
}
