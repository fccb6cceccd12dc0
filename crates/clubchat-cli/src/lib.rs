//! Terminal client for club chat rooms.
//!
//! A thin shell over [`clubchat_app::Driver`] that provides network and
//! terminal I/O. All orchestration logic lives in the generic
//! [`clubchat_app::Runtime`].
//!
//! - [`NetworkDriver`]: chat socket, REST calls, and stdin lines
//! - [`Transcript`]: prints the read model as it changes

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod network;
pub mod transcript;

pub use network::{NetworkDriver, NetworkError, SocketDrain};
pub use transcript::Transcript;
