//! Client
//!
//! Action-based chat session state machine for the club chat backend. Owns the
//! connection lifecycle of one room view, the join/subscribe choreography,
//! the deduplicated message log, and the history backfill.
//!
//! # Architecture
//!
//! The client follows the same Sans-IO and action-based patterns as
//! [`clubchat_core`]. It receives events ([`SessionEvent`]), processes them
//! through pure state machine logic, and returns actions ([`SessionAction`])
//! for the caller to execute. REST calls are actions too: the caller performs
//! them and reports the result as [`SessionEvent::ApiCompleted`].
//!
//! # Components
//!
//! - [`ChatSession`]: top-level state machine for the open room
//! - [`Membership`]: join decision and member list freshness
//! - [`MessageLog`]: ordered, deduplicated message log
//! - [`HistoryReconciler`]: gates live frames until the backfill lands
//! - [`RoomSnapshot`]: read model for presentation code
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::connect`]: open the chat WebSocket
//! - [`transport::ApiClient`]: execute [`ApiRequest`]s over HTTP

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod event;
mod history;
mod identity;
mod membership;
mod session;
mod stream;
mod view;

#[cfg(feature = "transport")]
pub mod transport;

pub use clubchat_core::{
    AttemptId, ConnectionConfig, ConnectionStatus,
    env::{Environment, SystemEnv},
};
pub use error::{ApiError, ClientError};
pub use event::{
    ApiRequest, ApiResponse, MembersPurpose, RoomEpoch, RoomTarget, SessionAction, SessionEvent,
};
pub use history::HistoryReconciler;
pub use identity::{SelfIdentity, token_subject};
pub use membership::{JoinDecision, JoinState, Membership};
pub use session::{ChatSession, DEFAULT_MEMBER_REFRESH_DELAY, SessionConfig};
pub use stream::{MessageLog, StreamState, decode_message};
pub use view::{ANONYMOUS, Attribution, DayLabel, DaySection, LogEntry, RoomSnapshot};
