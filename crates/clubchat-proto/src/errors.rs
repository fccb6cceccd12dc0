//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding wire data.
///
/// Every variant describes malformed input from the peer. None of them are
/// recoverable by retrying the same bytes; callers drop the offending frame
/// and keep the connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame text was empty after stripping heart-beat EOLs.
    #[error("empty frame")]
    EmptyFrame,

    /// Frame was not terminated by a NUL octet.
    #[error("frame is missing its NUL terminator")]
    MissingTerminator,

    /// Command line is not a STOMP command.
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    /// Header line without a `:` separator.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// Header contained an escape sequence STOMP 1.2 does not define.
    #[error("invalid escape sequence in header: {0:?}")]
    InvalidEscape(String),

    /// `content-length` header was not a number or exceeded the body.
    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    /// Frame lacks a header its command requires.
    #[error("{command} frame is missing required header {header:?}")]
    MissingHeader {
        /// Command of the offending frame.
        command: &'static str,
        /// Name of the missing header.
        header: &'static str,
    },

    /// `heart-beat` header was not two comma-separated integers.
    #[error("invalid heart-beat header: {0:?}")]
    InvalidHeartBeat(String),

    /// Timestamp was neither RFC 3339 nor an ISO 8601 local date-time.
    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    /// JSON body failed to deserialize.
    #[error("invalid JSON body: {0}")]
    InvalidJson(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidJson(err.to_string())
    }
}
