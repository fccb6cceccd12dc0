//! Scripted chat backend.
//!
//! [`FakeBackend`] answers [`ApiRequest`]s from in-memory state the test sets
//! up. The free functions build the payloads and frames the real server
//! would send.

use clubchat_client::{ApiError, ApiRequest, ApiResponse};
use clubchat_proto::{
    ChatMessage, ClubRole, Command, Frame, Inbound, MessageId, MessageKind, RoomDirectory,
    RoomMember, RoomSummary, Timestamp, UserId, destination::room_topic,
};

/// In-memory backend state.
///
/// A successful join adds `self_id` to the member list with
/// `join_time`, the way the server records the join.
#[derive(Debug, Clone)]
pub struct FakeBackend {
    /// Answer to the subject lookup.
    pub user_id: Result<Option<UserId>, ApiError>,
    /// Current member list.
    pub members: Vec<RoomMember>,
    /// When set, member fetches fail with this error.
    pub members_error: Option<ApiError>,
    /// Answer to join calls.
    pub join_result: Result<(), ApiError>,
    /// Join time recorded for a successful join.
    pub join_time: Option<Timestamp>,
    /// Stored room history, in server order.
    pub history: Vec<ChatMessage>,
    /// When set, history fetches fail with this error.
    pub history_error: Option<ApiError>,
    /// Room directory.
    pub directory: RoomDirectory,
    /// Answer to room creation.
    pub create_result: Result<(), ApiError>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            user_id: Ok(None),
            members: Vec::new(),
            members_error: None,
            join_result: Ok(()),
            join_time: Timestamp::parse("2024-05-01T08:00:00").ok(),
            history: Vec::new(),
            history_error: None,
            directory: RoomDirectory::default(),
            create_result: Ok(()),
        }
    }
}

impl FakeBackend {
    /// Backend that resolves the token subject to `self_id`.
    pub fn for_user(self_id: &str) -> Self {
        Self { user_id: Ok(Some(UserId::new(self_id))), ..Self::default() }
    }

    /// Set the member list.
    #[must_use]
    pub fn with_members(mut self, members: Vec<RoomMember>) -> Self {
        self.members = members;
        self
    }

    /// Set the stored history.
    #[must_use]
    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    /// Set the room directory.
    #[must_use]
    pub fn with_directory(mut self, names: &[(&str, &str)], role: &str) -> Self {
        self.directory = RoomDirectory {
            club_name: "club".to_string(),
            chat_rooms: names
                .iter()
                .map(|(id, name)| RoomSummary { id: (*id).into(), name: (*name).to_string() })
                .collect(),
            role: Some(ClubRole::new(role)),
        };
        self
    }

    /// Answer `request` from the current state.
    pub fn respond(&mut self, request: &ApiRequest) -> ApiResponse {
        match request {
            ApiRequest::ResolveUserId { .. } => ApiResponse::UserId(self.user_id.clone()),
            ApiRequest::FetchMembers { purpose, .. } => {
                let result = match &self.members_error {
                    Some(error) => Err(error.clone()),
                    None => Ok(self.members.clone()),
                };
                ApiResponse::Members { purpose: *purpose, result }
            },
            ApiRequest::Join { .. } => {
                if self.join_result.is_ok() {
                    self.record_join();
                }
                ApiResponse::Joined(self.join_result.clone())
            },
            ApiRequest::FetchHistory { from, .. } => {
                let result = match &self.history_error {
                    Some(error) => Err(error.clone()),
                    None => Ok(self
                        .history
                        .iter()
                        .filter(|message| match (from, &message.created_at) {
                            (Some(from), Some(at)) => at >= from,
                            _ => true,
                        })
                        .cloned()
                        .collect()),
                };
                ApiResponse::History(result)
            },
            ApiRequest::ListRooms { .. } => ApiResponse::Rooms(Ok(self.directory.clone())),
            ApiRequest::CreateRoom { request, .. } => {
                if self.create_result.is_ok() {
                    let id = (self.directory.chat_rooms.len() + 1) as u64;
                    let summary = RoomSummary { id: id.into(), name: request.name.clone() };
                    self.directory.chat_rooms.push(summary);
                }
                ApiResponse::RoomCreated {
                    name: request.name.clone(),
                    result: self.create_result.clone(),
                }
            },
        }
    }

    fn record_join(&mut self) {
        let Ok(Some(self_id)) = &self.user_id else {
            return;
        };
        if self.members.iter().any(|member| &member.user_id == self_id) {
            return;
        }
        self.members.push(RoomMember {
            user_id: self_id.clone(),
            nickname: Some(format!("user-{self_id}")),
            club_role: ClubRole::default(),
            joined_at: self.join_time.clone(),
        });
    }
}

/// Member record with an optional join time.
pub fn member(user: &str, joined_at: Option<&str>) -> RoomMember {
    RoomMember {
        user_id: UserId::new(user),
        nickname: Some(format!("user-{user}")),
        club_role: ClubRole::default(),
        joined_at: joined_at.and_then(|at| Timestamp::parse(at).ok()),
    }
}

/// `TALK` message created at 2024-05-01T09:00:00.
pub fn chat(id: &str, room: &str, user: &str, text: &str) -> ChatMessage {
    message(id, room, user, text, MessageKind::Talk)
}

/// `ENTER` announcement for `user`.
pub fn enter(id: &str, room: &str, user: &str) -> ChatMessage {
    message(id, room, user, &format!("user-{user} entered"), MessageKind::Enter)
}

/// `LEAVE` announcement for `user`.
pub fn leave(id: &str, room: &str, user: &str) -> ChatMessage {
    message(id, room, user, &format!("user-{user} left"), MessageKind::Leave)
}

fn message(id: &str, room: &str, user: &str, text: &str, kind: MessageKind) -> ChatMessage {
    ChatMessage {
        message_id: MessageId::new(id),
        room_id: room.into(),
        user_id: Some(UserId::new(user)),
        nickname: Some(format!("user-{user}")),
        message: text.to_string(),
        kind,
        created_at: Timestamp::parse("2024-05-01T09:00:00").ok(),
    }
}

/// `CONNECTED` frame announcing 10s heart-beats.
pub fn connected_frame() -> Inbound {
    Inbound::Frame(
        Frame::new(Command::Connected)
            .with_header("version", "1.2")
            .with_header("heart-beat", "10000,10000"),
    )
}

/// `MESSAGE` frame carrying `message` for `subscription`.
pub fn message_frame(subscription: &str, message: &ChatMessage) -> Inbound {
    let body = serde_json::to_string(message).unwrap_or_default();
    Inbound::Frame(
        Frame::new(Command::Message)
            .with_header("subscription", subscription)
            .with_header("destination", room_topic(&message.room_id))
            .with_header("message-id", message.message_id.as_str())
            .with_body(body),
    )
}
