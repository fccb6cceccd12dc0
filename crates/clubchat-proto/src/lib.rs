//! Club chat wire protocol.
//!
//! Everything that crosses the network boundary of the chat client lives here:
//!
//! - [`Frame`]: STOMP 1.2 text frames, the unit exchanged over the chat socket
//! - [`HeartBeat`]: heart-beat header values and their negotiation
//! - [`payloads`]: JSON bodies carried by frames and by the REST endpoints
//! - [`ids`]: identifier newtypes that normalize numeric/string ids
//! - [`destination`]: subscription and send destinations
//!
//! The crate is pure: no I/O, no clocks. Encoding and decoding are total
//! functions over strings so they can be exercised directly by property
//! tests.

#![forbid(unsafe_code)]

pub mod destination;
pub mod errors;
pub mod frame;
pub mod heartbeat;
pub mod ids;
pub mod payloads;
pub mod timestamp;

pub use errors::{ProtocolError, Result};
pub use frame::{Command, Frame, Inbound};
pub use heartbeat::{HeartBeat, NegotiatedHeartBeat};
pub use ids::{ClubId, MessageId, RoomId, UserId};
pub use payloads::{
    chat::{ChatMessage, MessageKind, OutgoingMessage},
    rest::{
        ApiEnvelope, ClubRole, CreateRoomRequest, RoomDirectory, RoomMember, RoomSummary,
        UserIdLookup,
    },
};
pub use timestamp::Timestamp;
