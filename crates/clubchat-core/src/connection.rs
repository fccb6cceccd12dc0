//! Connection controller.
//!
//! Owns one STOMP session over one transport at a time, on behalf of the room
//! currently desired by the view. Uses the action pattern: methods take time as
//! input and return actions for the driver to execute. The state machine never
//! touches a socket.
//!
//! # State Machine
//!
//! ```text
//!            connect(room)
//! ┌──────┐ ───────────────> ┌─────────┐  transport  ┌─────────────┐
//! │ Idle │                  │ Opening │ ──opened──> │ Handshaking │
//! └──────┘ <─── teardown ── └─────────┘             └─────────────┘
//!    ^                           │                     │        │
//!    │ retry budget spent        │ timeout/close       │        │ CONNECTED
//!    │                           v                     │        v
//!    │                    ┌────────────────┐   ERROR/  │   ┌───────────┐
//!    └─────────────────── │ RetryScheduled │ <─timeout─┘   │ Connected │
//!                         └────────────────┘ <──────────── └───────────┘
//!                            │  reconnect_delay       close / heart-beat
//!                            └──> Opening (same room only)   timeout
//! ```
//!
//! # Invariants
//!
//! - At most one transport is live. Every transport event carries the
//!   [`AttemptId`] of the socket that produced it; events from older attempts
//!   are ignored.
//! - A subscription only exists while connected, and only for the desired
//!   room.
//! - A scheduled reconnect only fires for the room that is still desired.

use std::{
    fmt,
    ops::Sub,
    time::{Duration, Instant},
};

use clubchat_proto::{
    Command, Frame, HeartBeat, Inbound, NegotiatedHeartBeat, RoomId, destination::room_topic,
};

use crate::error::ConnectionError;

/// Heart-beat interval offered in both directions.
pub const DEFAULT_HEART_BEAT: Duration = Duration::from_secs(10);

/// Time allowed from opening the transport to receiving `CONNECTED`.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay before retrying a failed connection.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Virtual host sent in the `CONNECT` frame.
pub const DEFAULT_HOST: &str = "localhost";

/// Identifies one transport (socket) opened by the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(u64);

impl AttemptId {
    /// Wrap a raw attempt number.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw attempt number.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connection status as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    /// No connection and none wanted
    #[default]
    Disconnected,
    /// First attempt for the current room in progress
    Connecting,
    /// Handshake complete, frames flow
    Connected,
    /// Previous attempt failed, another one is scheduled or in progress
    Reconnecting,
    /// Gave up; a new `connect` is required
    Failed,
}

impl ConnectionStatus {
    /// Whether frames can be sent.
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Actions returned by the connection state machine.
///
/// The driver executes these in order. Each teardown step is its own action
/// so a failure executing one does not prevent the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a new transport to the chat endpoint
    OpenTransport {
        /// Attempt the transport's events must be tagged with
        attempt: AttemptId,
        /// Room the transport is opened for
        room: RoomId,
    },

    /// Encode and write this frame on the live transport
    SendFrame(Frame),

    /// Write a heart-beat EOL on the live transport
    SendHeartBeat,

    /// Close the transport of this attempt
    CloseTransport {
        /// Attempt to close
        attempt: AttemptId,
    },

    /// Status changed
    StatusChanged(ConnectionStatus),

    /// Handshake completed; the room may now be subscribed
    Established {
        /// Room the session belongs to
        room: RoomId,
    },

    /// `MESSAGE` frame for the active subscription
    Deliver(Frame),
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Heart-beat offer sent in `CONNECT`
    pub heart_beat: HeartBeat,
    /// Time allowed to open the transport and complete the handshake
    pub connect_timeout: Duration,
    /// Delay before a failed connection is retried
    pub reconnect_delay: Duration,
    /// Consecutive failures tolerated before giving up. `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    /// Virtual host for the `CONNECT` frame
    pub host: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heart_beat: HeartBeat::new(DEFAULT_HEART_BEAT, DEFAULT_HEART_BEAT),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: None,
            host: DEFAULT_HOST.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
enum Phase<I> {
    Idle,
    Opening {
        attempt: AttemptId,
        since: I,
    },
    Handshaking {
        attempt: AttemptId,
        since: I,
    },
    Connected {
        attempt: AttemptId,
        heart_beat: NegotiatedHeartBeat,
        last_sent: I,
        last_received: I,
    },
    RetryScheduled {
        room: RoomId,
        since: I,
    },
}

#[derive(Debug, Clone)]
struct Subscription {
    id: String,
    room: RoomId,
}

/// Connection state machine
///
/// Pure: no I/O, no environment. Time is passed to the methods that need it.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug, Clone)]
pub struct Connection<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    config: ConnectionConfig,
    phase: Phase<I>,
    status: ConnectionStatus,
    /// Room the view wants; the reconnect guard compares against it.
    desired: Option<RoomId>,
    subscription: Option<Subscription>,
    next_attempt: u64,
    next_subscription: u64,
    /// Consecutive failures since the last successful handshake.
    failures: u32,
}

impl<I> Connection<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create an idle connection.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            status: ConnectionStatus::Disconnected,
            desired: None,
            subscription: None,
            next_attempt: 0,
            next_subscription: 0,
            failures: 0,
        }
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Configuration in use
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Room the connection is working towards. `None` after teardown.
    pub fn desired_room(&self) -> Option<&RoomId> {
        self.desired.as_ref()
    }

    /// Attempt of the live transport, if any.
    #[must_use]
    pub fn attempt(&self) -> Option<AttemptId> {
        match self.phase {
            Phase::Opening { attempt, .. }
            | Phase::Handshaking { attempt, .. }
            | Phase::Connected { attempt, .. } => Some(attempt),
            Phase::Idle | Phase::RetryScheduled { .. } => None,
        }
    }

    /// Whether the STOMP handshake has completed on the live transport.
    pub fn is_connected(&self) -> bool {
        matches!(self.phase, Phase::Connected { .. })
    }

    /// Id of the active subscription.
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription.as_ref().map(|sub| sub.id.as_str())
    }

    /// Whether `room` has a live subscription.
    pub fn is_subscribed_to(&self, room: &RoomId) -> bool {
        self.subscription.as_ref().is_some_and(|sub| &sub.room == room)
    }

    /// Negotiated heart-beat intervals while connected.
    pub fn heart_beat(&self) -> Option<NegotiatedHeartBeat> {
        match self.phase {
            Phase::Connected { heart_beat, .. } => Some(heart_beat),
            _ => None,
        }
    }

    /// Start connecting for `room`.
    ///
    /// A no-op when `room` is already desired and its connection is live or
    /// in progress. Otherwise tears down whatever exists and opens a new
    /// transport.
    pub fn connect(&mut self, room: RoomId, now: I) -> Vec<ConnectionAction> {
        if self.desired.as_ref() == Some(&room) {
            match self.phase {
                Phase::Connected { .. } if self.is_subscribed_to(&room) => {
                    tracing::debug!(%room, "already connected and subscribed");
                    return Vec::new();
                },
                Phase::Opening { .. } | Phase::Handshaking { .. } | Phase::Connected { .. } => {
                    tracing::debug!(%room, status = %self.status, "connection already in progress");
                    return Vec::new();
                },
                Phase::Idle | Phase::RetryScheduled { .. } => {},
            }
        }

        let mut actions = self.release();
        self.desired = Some(room.clone());
        self.failures = 0;
        self.start_attempt(room, now, ConnectionStatus::Connecting, &mut actions);
        actions
    }

    /// Tear down the session: unsubscribe, disconnect, close the transport.
    ///
    /// Steps that do not apply are skipped. Cancels any scheduled reconnect.
    pub fn teardown(&mut self) -> Vec<ConnectionAction> {
        if let Some(room) = self.desired.take() {
            tracing::debug!(%room, "tearing down chat connection");
        }
        let mut actions = self.release();
        self.failures = 0;
        self.set_status(ConnectionStatus::Disconnected, &mut actions);
        actions
    }

    /// Transport of `attempt` finished opening. Sends `CONNECT`.
    pub fn transport_opened(&mut self, attempt: AttemptId, now: I) -> Vec<ConnectionAction> {
        let Phase::Opening { attempt: current, since } = self.phase else {
            tracing::debug!(%attempt, "ignoring open of a transport that is not pending");
            return Vec::new();
        };
        if current != attempt {
            tracing::debug!(%attempt, %current, "ignoring open of stale transport");
            return Vec::new();
        }

        // Handshake shares the deadline of the transport open.
        self.phase = Phase::Handshaking { attempt, since };
        let offer = self.config.heart_beat.header_value();
        tracing::trace!(%attempt, elapsed = ?(now - since), "transport open, sending CONNECT");
        vec![ConnectionAction::SendFrame(Frame::connect(&self.config.host, &offer))]
    }

    /// Transport of `attempt` closed or errored.
    pub fn transport_closed(
        &mut self,
        attempt: AttemptId,
        reason: &str,
        now: I,
    ) -> Vec<ConnectionAction> {
        if self.attempt() != Some(attempt) {
            tracing::debug!(%attempt, reason, "ignoring close of stale transport");
            return Vec::new();
        }
        self.fail(ConnectionError::Transport(reason.to_string()), now)
    }

    /// Process one decoded transport message of `attempt`.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::UnexpectedFrame` if the command is invalid for the
    ///   current status
    /// - `ConnectionError::UnknownSubscription` for a `MESSAGE` that does not
    ///   belong to the active subscription (e.g. after unsubscribing)
    /// - `ConnectionError::Protocol` if a `MESSAGE` lacks its subscription
    ///
    /// Errors leave the connection untouched; the caller drops the frame.
    pub fn handle_inbound(
        &mut self,
        attempt: AttemptId,
        inbound: Inbound,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if self.attempt() != Some(attempt) {
            tracing::debug!(%attempt, "ignoring frame from stale transport");
            return Ok(Vec::new());
        }

        if let Phase::Connected { last_received, .. } = &mut self.phase {
            *last_received = now;
        }

        match inbound {
            Inbound::HeartBeat => Ok(Vec::new()),
            Inbound::Frame(frame) => self.handle_frame(frame, now),
        }
    }

    /// Subscribe to the topic of `room`.
    ///
    /// Idempotent while the subscription is live.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` if not connected, or `room` is not
    ///   the desired room
    pub fn subscribe(&mut self, room: &RoomId) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if !self.is_connected() || self.desired.as_ref() != Some(room) {
            return Err(ConnectionError::InvalidState {
                status: self.status,
                operation: "subscribe",
            });
        }
        if self.subscription.is_some() {
            return Ok(Vec::new());
        }

        let id = format!("sub-{}", self.next_subscription);
        self.next_subscription += 1;
        tracing::debug!(%room, subscription = %id, "subscribing to room topic");

        let frame = Frame::subscribe(&id, &room_topic(room));
        self.subscription = Some(Subscription { id, room: room.clone() });
        Ok(vec![ConnectionAction::SendFrame(frame)])
    }

    /// Send an application frame.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` if not connected
    pub fn send(&mut self, frame: Frame, now: I) -> Result<Vec<ConnectionAction>, ConnectionError> {
        let Phase::Connected { last_sent, .. } = &mut self.phase else {
            return Err(ConnectionError::InvalidState { status: self.status, operation: "send" });
        };
        *last_sent = now;
        Ok(vec![ConnectionAction::SendFrame(frame)])
    }

    /// Process periodic maintenance: handshake timeout, heart-beats, and
    /// scheduled reconnects.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        match &mut self.phase {
            Phase::Opening { since, .. } | Phase::Handshaking { since, .. } => {
                let elapsed = now - *since;
                if elapsed >= self.config.connect_timeout {
                    return self.fail(ConnectionError::HandshakeTimeout { elapsed }, now);
                }
            },
            Phase::Connected { heart_beat, last_sent, last_received, .. } => {
                let silence = now - *last_received;
                if heart_beat.incoming.is_some_and(|every| silence > every * 2) {
                    return self.fail(ConnectionError::HeartBeatTimeout { elapsed: silence }, now);
                }
                if heart_beat.outgoing.is_some_and(|every| now - *last_sent >= every) {
                    *last_sent = now;
                    return vec![ConnectionAction::SendHeartBeat];
                }
            },
            Phase::RetryScheduled { room, since } => {
                if now - *since >= self.config.reconnect_delay {
                    let room = room.clone();
                    if self.desired.as_ref() == Some(&room) {
                        let mut actions = Vec::new();
                        self.start_attempt(room, now, ConnectionStatus::Reconnecting, &mut actions);
                        return actions;
                    }
                    tracing::debug!(%room, "suppressing reconnect to a room no longer desired");
                    self.phase = Phase::Idle;
                }
            },
            Phase::Idle => {},
        }
        Vec::new()
    }

    fn handle_frame(
        &mut self,
        frame: Frame,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        let handshaking = matches!(self.phase, Phase::Handshaking { .. });
        let connected = self.is_connected();

        match frame.command {
            Command::Connected if handshaking => Ok(self.on_connected(&frame, now)),
            Command::Error => {
                let message = frame.header("message").unwrap_or("unspecified").to_string();
                tracing::error!(%message, body = %frame.body, "server sent ERROR frame");
                Ok(self.fail(ConnectionError::Server(message), now))
            },
            Command::Message if connected => {
                let id = frame.require_header("subscription")?;
                if self.subscription.as_ref().is_some_and(|sub| sub.id == id) {
                    Ok(vec![ConnectionAction::Deliver(frame)])
                } else {
                    Err(ConnectionError::UnknownSubscription(id.to_string()))
                }
            },
            Command::Receipt if connected => Ok(Vec::new()),
            command => Err(ConnectionError::UnexpectedFrame { status: self.status, command }),
        }
    }

    fn on_connected(&mut self, frame: &Frame, now: I) -> Vec<ConnectionAction> {
        let (Some(attempt), Some(room)) = (self.attempt(), self.desired.clone()) else {
            return Vec::new();
        };

        let server = match frame.header("heart-beat").map(HeartBeat::parse).transpose() {
            Ok(beat) => beat.unwrap_or(HeartBeat::DISABLED),
            Err(error) => {
                tracing::warn!(%error, "ignoring invalid server heart-beat");
                HeartBeat::DISABLED
            },
        };
        let heart_beat = self.config.heart_beat.negotiate(&server);

        tracing::info!(
            %room,
            %attempt,
            outgoing = ?heart_beat.outgoing,
            incoming = ?heart_beat.incoming,
            "chat connection established"
        );

        self.phase = Phase::Connected { attempt, heart_beat, last_sent: now, last_received: now };
        self.failures = 0;

        let mut actions = Vec::new();
        self.set_status(ConnectionStatus::Connected, &mut actions);
        actions.push(ConnectionAction::Established { room });
        actions
    }

    fn start_attempt(
        &mut self,
        room: RoomId,
        now: I,
        status: ConnectionStatus,
        actions: &mut Vec<ConnectionAction>,
    ) {
        self.next_attempt += 1;
        let attempt = AttemptId(self.next_attempt);
        tracing::info!(%room, %attempt, "opening chat transport");

        self.phase = Phase::Opening { attempt, since: now };
        self.set_status(status, actions);
        actions.push(ConnectionAction::OpenTransport { attempt, room });
    }

    /// Drop the live session, emitting the teardown steps that apply.
    fn release(&mut self) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();
        let subscription = self.subscription.take();

        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Connected { attempt, .. } => {
                if let Some(subscription) = subscription {
                    actions.push(ConnectionAction::SendFrame(Frame::unsubscribe(&subscription.id)));
                }
                let receipt = format!("disconnect-{}", attempt.get());
                actions.push(ConnectionAction::SendFrame(Frame::disconnect(&receipt)));
                actions.push(ConnectionAction::CloseTransport { attempt });
            },
            Phase::Opening { attempt, .. } | Phase::Handshaking { attempt, .. } => {
                actions.push(ConnectionAction::CloseTransport { attempt });
            },
            Phase::Idle | Phase::RetryScheduled { .. } => {},
        }

        actions
    }

    fn fail(&mut self, error: ConnectionError, now: I) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();
        self.subscription = None;
        if let Some(attempt) = self.attempt() {
            actions.push(ConnectionAction::CloseTransport { attempt });
        }
        self.phase = Phase::Idle;
        self.failures = self.failures.saturating_add(1);

        let within_budget =
            self.config.max_reconnect_attempts.is_none_or(|max| self.failures <= max);

        match self.desired.clone() {
            Some(room) if error.is_transient() && within_budget => {
                tracing::warn!(
                    %room,
                    %error,
                    retry_in = ?self.config.reconnect_delay,
                    "chat connection failed, scheduling reconnect"
                );
                self.phase = Phase::RetryScheduled { room, since: now };
                self.set_status(ConnectionStatus::Reconnecting, &mut actions);
            },
            _ => {
                tracing::warn!(%error, failures = self.failures, "chat connection failed");
                self.set_status(ConnectionStatus::Failed, &mut actions);
            },
        }

        actions
    }

    fn set_status(&mut self, status: ConnectionStatus, actions: &mut Vec<ConnectionAction>) {
        if self.status != status {
            tracing::debug!(from = %self.status, to = %status, "connection status changed");
            self.status = status;
            actions.push(ConnectionAction::StatusChanged(status));
        }
    }
}
