//! Deterministic simulation harness for the club chat client.
//!
//! Virtual-time implementations of the [`Environment`](clubchat_core::Environment)
//! and [`Driver`](clubchat_app::Driver) traits, plus a scripted backend, so
//! session behavior is reproducible down to the millisecond.
//!
//! # Scenarios
//!
//! [`Scenario`] drives a [`ChatSession`](clubchat_client::ChatSession)
//! directly: it records every action, answers REST calls from a
//! [`FakeBackend`] when told to, and lets the test decide when transports open
//! and frames arrive.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks behavioral properties of the read model
//! after every event. Use [`InvariantRegistry::standard()`] for the common
//! session invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod invariants;
pub mod scenario;
pub mod sim_driver;
pub mod sim_env;

pub use backend::{FakeBackend, chat, connected_frame, enter, leave, member, message_frame};
pub use invariants::{
    Invariant, InvariantRegistry, InvariantResult, JoinedBeforeSubscribed,
    SubscriptionRequiresConnection, TargetlessIsQuiet, UniqueMessageIds, Violation,
};
pub use scenario::Scenario;
pub use sim_driver::{SimDriver, SimDriverError};
pub use sim_env::{SimEnv, SimInstant};
