//! Application layer for the club chat client
//!
//! Command handling and a generic runtime around the Sans-IO
//! [`ChatSession`](clubchat_client::ChatSession), so deterministic simulation
//! tests run the same orchestration code as production.
//!
//! # Components
//!
//! - [`Command`]: typed lines (`/open`, `/rooms`, plain text, ...)
//! - [`Driver`]: trait for platform-specific I/O
//! - [`Runtime`]: generic orchestration loop using a driver, publishing
//!   [`RoomSnapshot`](clubchat_client::RoomSnapshot)s to subscribers

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod command;
mod driver;
mod event;
mod runtime;

pub use command::{Command, HELP, parse};
pub use driver::Driver;
pub use event::{AppEvent, Notice};
pub use runtime::Runtime;
