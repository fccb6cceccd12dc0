//! Error types for the connection controller.
//!
//! Errors split into two groups. Transient ones (timeouts, transport drops,
//! server `ERROR` frames) feed the reconnect policy. The rest are caller or
//! peer mistakes that retrying cannot fix.

use std::time::Duration;

use clubchat_proto::{Command, ProtocolError};
use thiserror::Error;

use crate::connection::ConnectionStatus;

/// Errors that can occur during connection state machine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Operation not allowed in the current status
    #[error("invalid state transition: cannot {operation} while {status}")]
    InvalidState {
        /// Status when the operation was attempted
        status: ConnectionStatus,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Frame not expected in the current status
    #[error("unexpected {command} frame while {status}")]
    UnexpectedFrame {
        /// Status when the frame arrived
        status: ConnectionStatus,
        /// Command of the unexpected frame
        command: Command,
    },

    /// `MESSAGE` for a subscription that is not active
    #[error("message for unknown subscription {0:?}")]
    UnknownSubscription(String),

    /// Transport open or STOMP handshake did not finish in time
    #[error("handshake timeout after {elapsed:?}")]
    HandshakeTimeout {
        /// How long we waited
        elapsed: Duration,
    },

    /// Server stopped sending anything, including heart-beats
    #[error("heart-beat timeout after {elapsed:?} of silence")]
    HeartBeatTimeout {
        /// How long the server was silent
        elapsed: Duration,
    },

    /// Server sent an `ERROR` frame
    #[error("server error: {0}")]
    Server(String),

    /// Malformed frame
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Underlying transport error
    #[error("transport error: {0}")]
    Transport(String),
}

impl ConnectionError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Protocol violations and misuse of the state machine are never
    /// transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::HandshakeTimeout { .. }
                | Self::HeartBeatTimeout { .. }
                | Self::Server(_)
                | Self::Transport(_)
        )
    }
}

impl From<ProtocolError> for ConnectionError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
