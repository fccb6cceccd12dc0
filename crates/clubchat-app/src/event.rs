//! Runtime inputs and user-facing notices.

use clubchat_client::SessionEvent;

/// Inputs produced by a [`Driver`](crate::Driver).
///
/// Lines come from the user; session events come from the transport and the
/// REST client, already tagged with their attempt or epoch.
#[derive(Debug, Clone)]
pub enum AppEvent<I = std::time::Instant> {
    /// A line typed by the user.
    Line(String),

    /// Transport or REST outcome for the session.
    Session(SessionEvent<I>),

    /// Input closed or the user asked to leave.
    Quit,
}

/// Things the driver shows the user outside the read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Clear the compose input.
    ClearCompose,

    /// Error worth showing.
    Alert(String),

    /// Credentials were rejected.
    Unauthorized,

    /// A room was created.
    RoomCreated(String),

    /// Command usage hint.
    Usage(String),
}
