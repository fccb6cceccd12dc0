//! Chat session state machine.
//!
//! [`ChatSession`] owns everything that belongs to the open room: the
//! connection, the membership coordinator, the message log, and the history
//! reconciler. It sequences them on room entry:
//!
//! 1. Resolve the self identity (once per session) and fetch the members
//! 2. Join when the local user is not listed
//! 3. Subscribe once joined and the handshake has completed
//! 4. Backfill history from the join time, gating live frames until it lands
//!
//! Switching rooms bumps the [`RoomEpoch`]; responses issued for an earlier
//! epoch are discarded.

use std::time::Duration;

use clubchat_core::{Connection, ConnectionAction, ConnectionConfig, ConnectionStatus, Environment};
use clubchat_proto::{
    ChatMessage, ClubId, CreateRoomRequest, Frame, OutgoingMessage, RoomDirectory, RoomMember,
    Timestamp, UserId, destination::SEND_DESTINATION,
};

use crate::{
    error::{ApiError, ClientError},
    event::{
        ApiRequest, ApiResponse, MembersPurpose, RoomEpoch, RoomTarget, SessionAction,
        SessionEvent,
    },
    history::HistoryReconciler,
    identity::SelfIdentity,
    membership::{JoinDecision, Membership},
    stream::{MessageLog, StreamState, decode_message},
    view::{Attribution, LogEntry, RoomSnapshot},
};

/// Delay between an `ENTER`/`LEAVE` message and the member refetch it
/// triggers.
pub const DEFAULT_MEMBER_REFRESH_DELAY: Duration = Duration::from_millis(500);

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Connection timing and handshake parameters.
    pub connection: ConnectionConfig,
    /// Delay before refetching members after a membership change.
    pub member_refresh_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            member_refresh_delay: DEFAULT_MEMBER_REFRESH_DELAY,
        }
    }
}

/// Chat session for one view.
///
/// # Invariants
///
/// - At most one live transport and one subscription, both for `target`
/// - The log never holds two messages with the same id
/// - Nothing is appended after `CloseRoom`
/// - At most one join call per epoch
pub struct ChatSession<E: Environment> {
    env: E,
    member_refresh_delay: Duration,

    connection: Connection<E::Instant>,
    identity: SelfIdentity,

    epoch: RoomEpoch,
    target: Option<RoomTarget>,
    membership: Membership<E::Instant>,
    log: MessageLog,
    history: HistoryReconciler,
    stream: StreamState,
    /// Whether the current epoch has completed a handshake before. Later
    /// handshakes are reconnects and resync history.
    established_once: bool,

    directory: Option<RoomDirectory>,
    directory_club: Option<ClubId>,
}

impl<E: Environment> ChatSession<E> {
    /// Create a session for the bearer `token` (with or without the `Bearer `
    /// prefix). A missing or undecodable token leaves the self identity
    /// unknown.
    pub fn new(env: E, config: SessionConfig, token: Option<&str>) -> Self {
        Self {
            env,
            member_refresh_delay: config.member_refresh_delay,
            connection: Connection::new(config.connection),
            identity: SelfIdentity::from_token(token),
            epoch: RoomEpoch::default(),
            target: None,
            membership: Membership::new(),
            log: MessageLog::new(),
            history: HistoryReconciler::new(),
            stream: StreamState::Idle,
            established_once: false,
            directory: None,
            directory_club: None,
        }
    }

    /// Process an event and return the actions to execute, in order.
    pub fn handle(&mut self, event: SessionEvent<E::Instant>) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        match event {
            SessionEvent::OpenRoom { target } => {
                let now = self.env.now();
                self.open_room(target, now, &mut actions);
            },
            SessionEvent::CloseRoom => {
                let now = self.env.now();
                self.close_room(now, &mut actions);
            },
            SessionEvent::TransportOpened { attempt } => {
                let now = self.env.now();
                let connection = self.connection.transport_opened(attempt, now);
                self.apply(connection, now, &mut actions);
            },
            SessionEvent::TransportClosed { attempt, reason } => {
                let now = self.env.now();
                let connection = self.connection.transport_closed(attempt, &reason, now);
                self.apply(connection, now, &mut actions);
            },
            SessionEvent::FrameReceived { attempt, frame } => {
                let now = self.env.now();
                match self.connection.handle_inbound(attempt, frame, now) {
                    Ok(connection) => self.apply(connection, now, &mut actions),
                    Err(error) => tracing::warn!(%attempt, %error, "dropping inbound frame"),
                }
            },
            SessionEvent::ApiCompleted { epoch, response } => {
                let now = self.env.now();
                self.api_completed(epoch, response, now, &mut actions);
            },
            SessionEvent::SendMessage { text } => {
                let now = self.env.now();
                self.send_message(&text, now, &mut actions);
            },
            SessionEvent::RefreshMembers => {
                if let Some(target) = self.target.clone() {
                    let purpose = MembersPurpose::Refresh;
                    actions.push(self.request(ApiRequest::FetchMembers { target, purpose }));
                }
            },
            SessionEvent::ListRooms { club } => {
                self.directory_club = Some(club.clone());
                actions.push(self.request(ApiRequest::ListRooms { club }));
            },
            SessionEvent::CreateRoom { club, request } => {
                self.create_room(club, request, &mut actions);
            },
            SessionEvent::Tick { now } => self.tick(now, &mut actions),
        }
        actions
    }

    /// Read model of the current state.
    pub fn snapshot(&self) -> RoomSnapshot {
        let self_id = self.identity.user_id();
        RoomSnapshot {
            target: self.target.clone(),
            epoch: self.epoch,
            status: self.connection.status(),
            stream: self.stream,
            self_id: self_id.cloned(),
            joined: self.membership.is_joined(),
            backfill_pending: self.target.is_some() && self.history.is_gated(),
            entries: self
                .log
                .entries()
                .iter()
                .map(|message| LogEntry {
                    message: message.clone(),
                    attribution: Attribution::of(message, self_id),
                })
                .collect(),
            members: self.membership.members().to_vec(),
            directory: self.directory.clone(),
        }
    }

    /// Connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Message log in order.
    pub fn log(&self) -> &[ChatMessage] {
        self.log.entries()
    }

    /// Last fetched member list.
    pub fn members(&self) -> &[RoomMember] {
        self.membership.members()
    }

    /// Resolved self id.
    pub fn self_id(&self) -> Option<&UserId> {
        self.identity.user_id()
    }

    /// Open room.
    pub fn target(&self) -> Option<&RoomTarget> {
        self.target.as_ref()
    }

    /// Current room epoch.
    pub fn epoch(&self) -> RoomEpoch {
        self.epoch
    }

    /// Subscription lifecycle.
    pub fn stream_state(&self) -> StreamState {
        self.stream
    }

    /// Last loaded room directory.
    pub fn directory(&self) -> Option<&RoomDirectory> {
        self.directory.as_ref()
    }

    fn open_room(&mut self, target: RoomTarget, now: E::Instant, actions: &mut Vec<SessionAction>) {
        if target.club.is_empty() || target.room.is_empty() {
            actions.push(alert(&ClientError::EmptyRoomTarget));
            return;
        }

        if self.target.as_ref() == Some(&target) {
            // Same room: only revive the connection if it has given up.
            let connection = self.connection.connect(target.room.clone(), now);
            self.apply(connection, now, actions);
            return;
        }

        tracing::info!(%target, "opening chat room");
        self.epoch = self.epoch.next();
        self.target = Some(target.clone());
        self.reset_room();

        // Releases the previous room's session before the new attempt starts.
        let connection = self.connection.connect(target.room.clone(), now);
        self.apply(connection, now, actions);

        actions.push(SessionAction::LogUpdated);
        actions.push(SessionAction::MembersUpdated);

        self.resolve_identity(actions);
        let purpose = MembersPurpose::Entry;
        actions.push(self.request(ApiRequest::FetchMembers { target, purpose }));
        self.advance(now, actions);
    }

    fn close_room(&mut self, now: E::Instant, actions: &mut Vec<SessionAction>) {
        self.epoch = self.epoch.next();
        if let Some(target) = self.target.take() {
            tracing::info!(%target, "closing chat room");
        }

        let connection = self.connection.teardown();
        self.apply(connection, now, actions);

        // The log stays readable; nothing is appended to it anymore.
        self.stream = StreamState::Unsubscribed;
        self.membership = Membership::new();
        self.history = HistoryReconciler::new();
        self.established_once = false;
        actions.push(SessionAction::MembersUpdated);
    }

    fn reset_room(&mut self) {
        self.membership = Membership::new();
        self.log = MessageLog::new();
        self.history = HistoryReconciler::new();
        self.stream = StreamState::Idle;
        self.established_once = false;
    }

    fn resolve_identity(&mut self, actions: &mut Vec<SessionAction>) {
        if let SelfIdentity::Pending { subject, requested } = &mut self.identity {
            if !*requested {
                *requested = true;
                let subject = subject.clone();
                actions.push(self.request(ApiRequest::ResolveUserId { subject }));
            }
        }
    }

    /// Translate connection actions, reacting to the ones the session owns.
    fn apply(
        &mut self,
        connection: Vec<ConnectionAction>,
        now: E::Instant,
        actions: &mut Vec<SessionAction>,
    ) {
        for action in connection {
            match action {
                ConnectionAction::OpenTransport { attempt, room } => {
                    actions.push(SessionAction::OpenTransport { attempt, room });
                },
                ConnectionAction::SendFrame(frame) => actions.push(SessionAction::SendFrame(frame)),
                ConnectionAction::SendHeartBeat => actions.push(SessionAction::SendHeartBeat),
                ConnectionAction::CloseTransport { attempt } => {
                    actions.push(SessionAction::CloseTransport { attempt });
                },
                ConnectionAction::StatusChanged(status) => {
                    // The subscription died with the transport.
                    if !status.is_connected() && self.stream == StreamState::Subscribed {
                        self.stream = StreamState::Idle;
                    }
                    actions.push(SessionAction::StatusChanged(status));
                },
                ConnectionAction::Established { room } => {
                    if self.target.as_ref().is_some_and(|target| target.room == room) {
                        self.on_established(now, actions);
                    }
                },
                ConnectionAction::Deliver(frame) => self.on_message(&frame, now, actions),
            }
        }
    }

    fn on_established(&mut self, now: E::Instant, actions: &mut Vec<SessionAction>) {
        if self.established_once {
            // Frames pushed while the socket was down are only in history.
            tracing::info!(epoch = %self.epoch, "reconnected, resyncing history");
            self.history.regate();
        }
        self.established_once = true;
        self.advance(now, actions);
    }

    fn on_message(&mut self, frame: &Frame, now: E::Instant, actions: &mut Vec<SessionAction>) {
        if self.stream != StreamState::Subscribed {
            tracing::debug!(stream = ?self.stream, "dropping message outside subscription");
            return;
        }
        let Some(target) = &self.target else {
            return;
        };

        let received_at = Timestamp::from_utc(self.env.wall_clock());
        let message = match decode_message(&frame.body, received_at) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(%error, "dropping malformed chat message");
                return;
            },
        };
        if message.room_id != target.room {
            tracing::warn!(
                expected = %target.room,
                got = %message.room_id,
                "dropping message for another room"
            );
            return;
        }

        let message_id = message.message_id.clone();
        let membership_change = message.kind.is_membership_change();
        let gated = self.history.is_gated();
        let fresh = if gated {
            self.history.buffer(&self.log, message)
        } else {
            self.log.append(message)
        };

        if !fresh {
            tracing::debug!(%message_id, "discarding duplicate message");
            return;
        }
        if membership_change {
            tracing::debug!(%message_id, "membership changed, scheduling member refresh");
            self.membership.schedule_refresh(now);
        }
        if !gated {
            actions.push(SessionAction::LogUpdated);
        }
    }

    fn send_message(&mut self, text: &str, now: E::Instant, actions: &mut Vec<SessionAction>) {
        if text.is_empty() {
            return;
        }
        let Some(target) = &self.target else {
            tracing::debug!("no room open, not sending");
            return;
        };
        if !self.connection.is_connected() {
            tracing::debug!(status = %self.connection.status(), "not connected, not sending");
            return;
        }

        let created_at = Timestamp::from_utc(self.env.wall_clock());
        let outgoing = OutgoingMessage::talk(target.room.clone(), text, created_at);
        let body = match outgoing.to_json() {
            Ok(body) => body,
            Err(error) => {
                actions.push(alert(&ClientError::Encode(error.to_string())));
                return;
            },
        };

        match self.connection.send(Frame::send_json(SEND_DESTINATION, body), now) {
            Ok(connection) => {
                self.apply(connection, now, actions);
                actions.push(SessionAction::ClearCompose);
            },
            Err(error) => tracing::warn!(%error, "could not send message"),
        }
    }

    fn create_room(
        &mut self,
        club: ClubId,
        request: CreateRoomRequest,
        actions: &mut Vec<SessionAction>,
    ) {
        if request.name.trim().is_empty() {
            actions.push(alert(&ClientError::EmptyRoomName));
            return;
        }
        self.directory_club = Some(club.clone());
        actions.push(self.request(ApiRequest::CreateRoom { club, request }));
    }

    fn tick(&mut self, now: E::Instant, actions: &mut Vec<SessionAction>) {
        let connection = self.connection.tick(now);
        self.apply(connection, now, actions);

        let due = self.membership.take_due_refreshes(now, self.member_refresh_delay);
        if let Some(target) = &self.target {
            for _ in 0..due {
                let request = ApiRequest::FetchMembers {
                    target: target.clone(),
                    purpose: MembersPurpose::Refresh,
                };
                actions.push(SessionAction::Api { epoch: self.epoch, request });
            }
        }
    }

    fn api_completed(
        &mut self,
        epoch: RoomEpoch,
        response: ApiResponse,
        now: E::Instant,
        actions: &mut Vec<SessionAction>,
    ) {
        let room_scoped = matches!(
            response,
            ApiResponse::Members { .. } | ApiResponse::Joined(_) | ApiResponse::History(_)
        );
        if room_scoped && (epoch != self.epoch || self.target.is_none()) {
            tracing::debug!(
                %epoch,
                current = %self.epoch,
                "discarding response for a room no longer open"
            );
            return;
        }

        match response {
            ApiResponse::UserId(result) => self.on_user_id(result, now, actions),
            ApiResponse::Members { purpose, result } => {
                match result {
                    Ok(members) => {
                        tracing::debug!(count = members.len(), ?purpose, "members loaded");
                        self.membership.set_members(members);
                        actions.push(SessionAction::MembersUpdated);
                    },
                    Err(error) => {
                        if purpose == MembersPurpose::Entry {
                            self.membership.mark_unavailable();
                        }
                        self.api_failure("could not load room members", &error, actions);
                    },
                }
                if purpose == MembersPurpose::AfterJoin {
                    self.membership.refetch_done();
                }
                self.advance(now, actions);
            },
            ApiResponse::Joined(result) => match result {
                Err(error) if !error.is_conflict() => {
                    self.membership.join_failed();
                    self.api_failure("could not join the room", &error, actions);
                    self.advance(now, actions);
                },
                _ => {
                    self.membership.join_succeeded();
                    if let Some(target) = self.target.clone() {
                        let purpose = MembersPurpose::AfterJoin;
                        actions.push(self.request(ApiRequest::FetchMembers { target, purpose }));
                    }
                    self.advance(now, actions);
                },
            },
            ApiResponse::History(result) => {
                match result {
                    Ok(messages) => {
                        let backfill = messages.len();
                        let replayed = self.history.land(&mut self.log, messages);
                        tracing::debug!(backfill, replayed, "history backfill landed");
                    },
                    Err(error) => {
                        let flushed = self.history.abandon(&mut self.log);
                        tracing::debug!(flushed, "history backfill failed, flushing live buffer");
                        self.api_failure("could not load message history", &error, actions);
                    },
                }
                actions.push(SessionAction::LogUpdated);
            },
            ApiResponse::Rooms(result) => match result {
                Ok(directory) => {
                    self.directory = Some(directory);
                    actions.push(SessionAction::DirectoryUpdated);
                },
                Err(error) => self.api_failure("could not load chat rooms", &error, actions),
            },
            ApiResponse::RoomCreated { name, result } => match result {
                Ok(()) => {
                    tracing::info!(%name, "chat room created");
                    actions.push(SessionAction::RoomCreated { name });
                    if let Some(club) = self.directory_club.clone() {
                        actions.push(self.request(ApiRequest::ListRooms { club }));
                    }
                },
                Err(error) => self.api_failure("could not create room", &error, actions),
            },
        }
    }

    fn on_user_id(
        &mut self,
        result: Result<Option<UserId>, ApiError>,
        now: E::Instant,
        actions: &mut Vec<SessionAction>,
    ) {
        if self.identity.is_settled() {
            return;
        }

        self.identity = match result {
            Ok(Some(user_id)) => {
                tracing::debug!(%user_id, "self identity resolved");
                SelfIdentity::Known(user_id)
            },
            Ok(None) => {
                tracing::warn!("server knows no user for the token subject");
                SelfIdentity::Unknown
            },
            Err(error) => {
                tracing::warn!(%error, "could not resolve self identity");
                if error.is_unauthorized() {
                    actions.push(SessionAction::Unauthorized);
                }
                SelfIdentity::Unknown
            },
        };

        // Attribution of every entry may have changed.
        actions.push(SessionAction::LogUpdated);
        self.advance(now, actions);
    }

    /// Move the entry sequence forward as far as the known state allows.
    fn advance(&mut self, now: E::Instant, actions: &mut Vec<SessionAction>) {
        let Some(target) = self.target.clone() else {
            return;
        };

        if self.identity.is_settled() && self.membership.is_loaded() {
            match self.membership.ensure_joined(self.identity.user_id()) {
                JoinDecision::Join => {
                    tracing::info!(%target, "not a member, joining room");
                    actions.push(self.request(ApiRequest::Join { target: target.clone() }));
                },
                JoinDecision::AlreadyMember => tracing::debug!(%target, "already a member"),
                JoinDecision::Settled => {},
            }
        }

        if self.membership.is_joined()
            && self.connection.is_connected()
            && self.stream != StreamState::Subscribed
        {
            match self.connection.subscribe(&target.room) {
                Ok(connection) => {
                    self.stream = StreamState::Subscribed;
                    self.apply(connection, now, actions);
                },
                Err(error) => tracing::warn!(%error, "could not subscribe"),
            }
        }

        if self.history.needs_request()
            && self.identity.is_settled()
            && self.membership.history_ready()
        {
            let from = self.membership.joined_at(self.identity.user_id());
            if from.is_none() {
                tracing::debug!(%target, "join time unknown, fetching full history");
            }
            self.history.mark_requested();
            actions.push(self.request(ApiRequest::FetchHistory { target, from }));
        }
    }

    fn api_failure(&self, context: &str, error: &ApiError, actions: &mut Vec<SessionAction>) {
        tracing::warn!(%error, "{context}");
        if error.is_unauthorized() {
            actions.push(SessionAction::Unauthorized);
        } else {
            actions.push(SessionAction::Alert { message: format!("{context}: {error}") });
        }
    }

    fn request(&self, request: ApiRequest) -> SessionAction {
        SessionAction::Api { epoch: self.epoch, request }
    }
}

fn alert(error: &ClientError) -> SessionAction {
    tracing::warn!(%error, "rejecting request");
    SessionAction::Alert { message: error.to_string() }
}
