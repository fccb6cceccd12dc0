//! REST request and response bodies.
//!
//! Every response is wrapped in an [`ApiEnvelope`]; the interesting payload
//! sits under `data`.

use serde::{Deserialize, Serialize};

use crate::{
    ids::{RoomId, UserId},
    timestamp::Timestamp,
};

/// `{ "data": ... }` wrapper around every REST response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Payload. Absent or `null` on some error responses.
    pub data: Option<T>,
}

/// Role of a user within a club.
///
/// Kept as the server's string so unknown roles survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClubRole(String);

impl ClubRole {
    /// Create a role from its wire name.
    pub fn new(role: impl Into<String>) -> Self {
        Self(role.into())
    }

    /// Wire name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `ADMIN` or `OWNER`, case-insensitive.
    pub fn is_admin(&self) -> bool {
        let role = self.0.trim();
        role.eq_ignore_ascii_case("ADMIN") || role.eq_ignore_ascii_case("OWNER")
    }
}

impl Default for ClubRole {
    fn default() -> Self {
        Self::new("MEMBER")
    }
}

/// One member of a chat room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    /// Member's application user id.
    pub user_id: UserId,
    /// Display name.
    #[serde(default)]
    pub nickname: Option<String>,
    /// Role in the owning club.
    #[serde(default)]
    pub club_role: ClubRole,
    /// When the member joined the room.
    #[serde(default, deserialize_with = "crate::timestamp::deserialize_lenient")]
    pub joined_at: Option<Timestamp>,
}

impl RoomMember {
    /// Whether the member holds an admin or owner role.
    pub fn is_admin(&self) -> bool {
        self.club_role.is_admin()
    }
}

/// Entry of a club's room directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    /// Room id.
    pub id: RoomId,
    /// Room display name.
    #[serde(default)]
    pub name: String,
}

/// Response of the room directory endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RoomDirectory {
    /// Club display name.
    #[serde(default)]
    pub club_name: String,
    /// Rooms visible to the caller.
    #[serde(default)]
    pub chat_rooms: Vec<RoomSummary>,
    /// Caller's role in the club.
    #[serde(default)]
    pub role: Option<ClubRole>,
}

impl RoomDirectory {
    /// Admins and owners may create rooms.
    pub fn can_create_rooms(&self) -> bool {
        self.role.as_ref().is_some_and(ClubRole::is_admin)
    }
}

/// Body of the room creation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    /// Room name. Must not be blank.
    pub name: String,
    /// Optional image, sent as an empty string when unset.
    #[serde(default)]
    pub image_url: String,
    /// Room type.
    #[serde(rename = "type")]
    pub kind: String,
}

impl CreateRoomRequest {
    /// Room type used when none is given.
    pub const DEFAULT_KIND: &'static str = "MEMBER";

    /// Request for a members room with no image.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), image_url: String::new(), kind: Self::DEFAULT_KIND.to_string() }
    }

    /// Set the image url.
    #[must_use]
    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = url.into();
        self
    }

    /// Set the room type.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }
}

/// `data` of the subject lookup: either a bare id or `{ "userId": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserIdLookup {
    /// Object form.
    Object {
        /// Resolved id.
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    /// Bare id.
    Bare(UserId),
}

impl UserIdLookup {
    /// Resolved id, `None` when it is empty.
    pub fn into_user_id(self) -> Option<UserId> {
        let id = match self {
            Self::Object { user_id } | Self::Bare(user_id) => user_id,
        };
        (!id.is_empty()).then_some(id)
    }
}
