//! Client error types.

use thiserror::Error;

/// Failure of a REST call to the chat backend.
///
/// `Unauthorized` is kept apart from every other failure: the host reacts to
/// it by invalidating the stored credentials, not by retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// HTTP 401: the access token is missing, expired, or revoked
    #[error("unauthorized")]
    Unauthorized,

    /// HTTP 403
    #[error("forbidden")]
    Forbidden,

    /// HTTP 404
    #[error("not found")]
    NotFound,

    /// HTTP 5xx
    #[error("server error (HTTP {status})")]
    Server {
        /// Status code
        status: u16,
    },

    /// Any other non-success status
    #[error("unexpected HTTP status {status}")]
    Status {
        /// Status code
        status: u16,
    },

    /// Request never produced a response
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body did not have the expected shape
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// Classify an HTTP status. `None` for success codes.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            401 => Some(Self::Unauthorized),
            403 => Some(Self::Forbidden),
            404 => Some(Self::NotFound),
            500..=599 => Some(Self::Server { status }),
            status => Some(Self::Status { status }),
        }
    }

    /// Whether the credentials were rejected.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// HTTP 409. The join endpoint answers this for existing members.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Status { status: 409 })
    }

    /// Returns true if the same request may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Server { .. } | Self::Transport(_))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Mistakes in how the session API is called.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Room target had an empty club or room id
    #[error("room target needs a club id and a room id")]
    EmptyRoomTarget,

    /// Room creation without a name
    #[error("room name must not be empty")]
    EmptyRoomName,

    /// Outgoing message failed to serialize
    #[error("could not encode message: {0}")]
    Encode(String),
}
