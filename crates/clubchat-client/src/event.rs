//! Session events and actions.

use std::fmt;

use clubchat_core::{AttemptId, ConnectionStatus};
use clubchat_proto::{
    ChatMessage, ClubId, CreateRoomRequest, Frame, Inbound, RoomDirectory, RoomId, RoomMember,
    Timestamp, UserId,
};

use crate::error::ApiError;

/// Room a view wants to show.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomTarget {
    /// Club that owns the room.
    pub club: ClubId,
    /// Room within the club.
    pub room: RoomId,
}

impl RoomTarget {
    /// Create a target.
    pub fn new(club: impl Into<ClubId>, room: impl Into<RoomId>) -> Self {
        Self { club: club.into(), room: room.into() }
    }
}

impl fmt::Display for RoomTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.club, self.room)
    }
}

/// Generation of the open room.
///
/// Bumped on every room switch and close. REST responses carry the epoch that
/// was current when the request was issued; a mismatch means the response
/// belongs to a room the view has left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RoomEpoch(u64);

impl RoomEpoch {
    /// Wrap a raw epoch.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value.
    pub fn get(self) -> u64 {
        self.0
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RoomEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Why a member list is being fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MembersPurpose {
    /// Room entry: decides whether a join is needed and finds the join time.
    Entry,
    /// After a join call, to learn our own join time.
    AfterJoin,
    /// Membership changed or the user opened the member list.
    Refresh,
}

/// REST call the driver must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    /// `GET /api/users/sub/{subject}/user-id`
    ResolveUserId {
        /// Token subject claim.
        subject: String,
    },

    /// `GET /api/clubs/{club}/chat/rooms/{room}/users`
    FetchMembers {
        /// Room to list.
        target: RoomTarget,
        /// What the result is used for.
        purpose: MembersPurpose,
    },

    /// `POST /api/clubs/{club}/chat/rooms/{room}/join`
    Join {
        /// Room to join.
        target: RoomTarget,
    },

    /// `GET /api/clubs/{club}/chat/rooms/{room}[?from=]`
    FetchHistory {
        /// Room to read.
        target: RoomTarget,
        /// Only messages created at or after this time. `None` for everything.
        from: Option<Timestamp>,
    },

    /// `GET /api/clubs/{club}/chat/list`
    ListRooms {
        /// Club to list.
        club: ClubId,
    },

    /// `POST /api/clubs/{club}/chat/create`
    CreateRoom {
        /// Owning club.
        club: ClubId,
        /// Room to create.
        request: CreateRoomRequest,
    },
}

/// Result of an [`ApiRequest`], fed back as [`SessionEvent::ApiCompleted`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResponse {
    /// Answer to `ResolveUserId`. `Ok(None)` when the server knows no user.
    UserId(Result<Option<UserId>, ApiError>),

    /// Answer to `FetchMembers`.
    Members {
        /// Purpose echoed from the request.
        purpose: MembersPurpose,
        /// Member list.
        result: Result<Vec<RoomMember>, ApiError>,
    },

    /// Answer to `Join`.
    Joined(Result<(), ApiError>),

    /// Answer to `FetchHistory`, in server order.
    History(Result<Vec<ChatMessage>, ApiError>),

    /// Answer to `ListRooms`.
    Rooms(Result<RoomDirectory, ApiError>),

    /// Answer to `CreateRoom`.
    RoomCreated {
        /// Name of the requested room.
        name: String,
        /// Outcome.
        result: Result<(), ApiError>,
    },
}

/// Events the caller feeds into the session.
///
/// The caller is responsible for:
/// - Forwarding view intents (open, close, send, refresh)
/// - Reporting transport lifecycle and frames, tagged with their attempt
/// - Reporting REST results, tagged with the epoch of the request
/// - Driving time forward via ticks
///
/// Generic over `I` (Instant type) to support both production and simulated
/// clocks.
#[derive(Debug, Clone)]
pub enum SessionEvent<I = std::time::Instant> {
    /// View wants to show a room. Switching rooms tears down the previous one.
    OpenRoom {
        /// Room to show.
        target: RoomTarget,
    },

    /// View is going away.
    CloseRoom,

    /// Transport finished opening.
    TransportOpened {
        /// Attempt from the matching `OpenTransport`.
        attempt: AttemptId,
    },

    /// Transport closed or failed.
    TransportClosed {
        /// Attempt from the matching `OpenTransport`.
        attempt: AttemptId,
        /// Human-readable cause.
        reason: String,
    },

    /// Decoded transport message.
    FrameReceived {
        /// Attempt of the transport that received it.
        attempt: AttemptId,
        /// Frame or heart-beat.
        frame: Inbound,
    },

    /// REST call finished.
    ApiCompleted {
        /// Epoch from the matching `Api` action.
        epoch: RoomEpoch,
        /// Outcome.
        response: ApiResponse,
    },

    /// User pressed send.
    SendMessage {
        /// Composed text.
        text: String,
    },

    /// User opened the member list.
    RefreshMembers,

    /// Load the room directory of a club.
    ListRooms {
        /// Club to list.
        club: ClubId,
    },

    /// Create a room in a club.
    CreateRoom {
        /// Owning club.
        club: ClubId,
        /// Room to create.
        request: CreateRoomRequest,
    },

    /// Time tick for timeouts, heart-beats, and delayed work.
    Tick {
        /// Current time from the environment.
        now: I,
    },
}

/// Actions produced by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Open the chat socket, replacing any previous one.
    OpenTransport {
        /// Tag for every event of this transport.
        attempt: AttemptId,
        /// Room the socket is for.
        room: RoomId,
    },

    /// Write a frame on the live socket.
    SendFrame(Frame),

    /// Write a heart-beat EOL on the live socket.
    SendHeartBeat,

    /// Close the socket of `attempt`.
    CloseTransport {
        /// Attempt to close.
        attempt: AttemptId,
    },

    /// Perform a REST call and report back with `epoch`.
    Api {
        /// Epoch to echo in `ApiCompleted`.
        epoch: RoomEpoch,
        /// Call to perform.
        request: ApiRequest,
    },

    /// Clear the compose input.
    ClearCompose,

    /// Connection status changed.
    StatusChanged(ConnectionStatus),

    /// The message log changed.
    LogUpdated,

    /// The member list changed.
    MembersUpdated,

    /// The room directory changed.
    DirectoryUpdated,

    /// A room was created.
    RoomCreated {
        /// Name of the new room.
        name: String,
    },

    /// Show a user-facing error.
    Alert {
        /// Message to show.
        message: String,
    },

    /// Credentials were rejected; the host should clear its session.
    Unauthorized,
}
