//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the runtime from specific I/O
//! implementations. The CLI implements it over stdin, a WebSocket, and an HTTP
//! client; the simulation harness implements it over in-memory queues and a
//! virtual clock. The generic [`crate::Runtime`] handles all orchestration.

use std::{future::Future, ops::Sub, time::Duration};

use clubchat_client::{ApiRequest, AttemptId, RoomEpoch};
use clubchat_proto::{Frame, RoomId};

use crate::{AppEvent, Notice};

/// Abstracts I/O operations for the chat runtime.
///
/// Operations that take time (opening the socket, REST calls) are started by
/// the runtime and finish later as [`AppEvent::Session`] inputs carrying the
/// attempt or epoch they were started with.
///
/// # Associated Types
///
/// - [`Error`](Driver::Error): Platform-specific error type
/// - [`Instant`](Driver::Instant): Time representation (real or virtual)
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Poll for the next input.
    ///
    /// Returns `None` when nothing arrived within the driver's poll interval,
    /// so the runtime can tick.
    fn poll_event(
        &mut self,
    ) -> impl Future<Output = Result<Option<AppEvent<Self::Instant>>, Self::Error>> + Send;

    /// Start opening the chat socket for `attempt`, replacing any previous
    /// socket.
    ///
    /// Completion is reported as `TransportOpened` or `TransportClosed`.
    fn open_transport(
        &mut self,
        attempt: AttemptId,
        room: RoomId,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Write a frame on the live socket.
    fn send_frame(&mut self, frame: Frame) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Write a heart-beat on the live socket.
    fn send_heart_beat(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Close the socket of `attempt` if it is still open.
    fn close_transport(
        &mut self,
        attempt: AttemptId,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Start a REST call. The result is reported as `ApiCompleted` with
    /// `epoch`.
    fn submit(
        &mut self,
        epoch: RoomEpoch,
        request: ApiRequest,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Show a notice to the user.
    ///
    /// # Errors
    ///
    /// Returns an error if the output is gone.
    fn notify(&mut self, notice: Notice) -> Result<(), Self::Error>;

    /// Current time instant.
    fn now(&self) -> Self::Instant;

    /// Stop all I/O and clean up resources.
    fn stop(&mut self);
}
