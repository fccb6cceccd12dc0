//! Core
//!
//! Platform-independent building blocks of the club chat client:
//!
//! - [`env::Environment`]: time and sleeping, so protocol logic runs the same
//!   under a virtual clock in tests and the system clock in production
//! - [`connection::Connection`]: the connection controller, a pure state
//!   machine owning one STOMP session over one transport at a time
//!
//! Nothing here performs I/O. Methods take the current instant and return
//! actions for a driver to execute.

#![forbid(unsafe_code)]

pub mod connection;
pub mod env;
pub mod error;

pub use connection::{
    AttemptId, Connection, ConnectionAction, ConnectionConfig, ConnectionStatus,
};
pub use env::{Environment, SystemEnv};
pub use error::ConnectionError;
