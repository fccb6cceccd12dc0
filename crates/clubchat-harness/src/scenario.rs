//! Scripted session scenarios.
//!
//! A [`Scenario`] owns a [`ChatSession`] on a [`SimEnv`] and plays the part
//! of the driver: it records every action, keeps track of the live transport
//! and subscription, and parks REST calls until the test completes them.
//! Completing them in a different order than they were issued is how the
//! race tests are written.
//!
//! Every event is followed by an invariant check of the session snapshot.

use std::{collections::VecDeque, time::Duration};

use clubchat_client::{
    ApiRequest, ApiResponse, AttemptId, ChatSession, RoomEpoch, RoomSnapshot, RoomTarget,
    SessionAction, SessionConfig, SessionEvent,
};
use clubchat_core::Environment;
use clubchat_proto::{ChatMessage, Command, Frame, Inbound, RoomId};

use crate::{
    backend::{FakeBackend, connected_frame, message_frame},
    invariants::InvariantRegistry,
    sim_env::{SimEnv, SimInstant},
};

/// Upper bound on REST completions drained by [`Scenario::complete_all`].
const MAX_COMPLETIONS: usize = 256;

/// A session under test plus everything it asked the outside world to do.
pub struct Scenario {
    env: SimEnv,
    session: ChatSession<SimEnv>,
    backend: FakeBackend,
    invariants: InvariantRegistry,

    pending: VecDeque<(RoomEpoch, ApiRequest)>,
    requests: Vec<(RoomEpoch, ApiRequest)>,
    live: Option<AttemptId>,
    opened: Vec<(AttemptId, RoomId)>,
    closed: Vec<AttemptId>,
    subscription: Option<String>,
    frames: Vec<Frame>,
    heart_beats: usize,
    actions: Vec<SessionAction>,
}

impl Scenario {
    /// Session for `token` answering REST calls from `backend`.
    pub fn new(token: Option<&str>, backend: FakeBackend) -> Self {
        Self::with_config(token, backend, SessionConfig::default())
    }

    /// Same as [`Scenario::new`] with a custom session configuration.
    pub fn with_config(token: Option<&str>, backend: FakeBackend, config: SessionConfig) -> Self {
        let env = SimEnv::new();
        let session = ChatSession::new(env.clone(), config, token);
        Self {
            env,
            session,
            backend,
            invariants: InvariantRegistry::standard(),
            pending: VecDeque::new(),
            requests: Vec::new(),
            live: None,
            opened: Vec::new(),
            closed: Vec::new(),
            subscription: None,
            frames: Vec::new(),
            heart_beats: 0,
            actions: Vec::new(),
        }
    }

    /// Feed one event, record its actions, and check invariants.
    pub fn handle(&mut self, event: SessionEvent<SimInstant>) -> Vec<SessionAction> {
        let context = format!("after {event:?}");
        let actions = self.session.handle(event);
        for action in &actions {
            self.record(action);
        }
        self.actions.extend(actions.iter().cloned());
        self.invariants.assert_all(&self.session.snapshot(), &context);
        actions
    }

    fn record(&mut self, action: &SessionAction) {
        match action {
            SessionAction::OpenTransport { attempt, room } => {
                self.opened.push((*attempt, room.clone()));
                self.live = Some(*attempt);
                self.subscription = None;
            },
            SessionAction::CloseTransport { attempt } => {
                self.closed.push(*attempt);
                if self.live == Some(*attempt) {
                    self.live = None;
                    self.subscription = None;
                }
            },
            SessionAction::SendFrame(frame) => {
                match frame.command {
                    Command::Subscribe => {
                        self.subscription = frame.header("id").map(str::to_string);
                    },
                    Command::Unsubscribe => self.subscription = None,
                    _ => {},
                }
                self.frames.push(frame.clone());
            },
            SessionAction::SendHeartBeat => self.heart_beats += 1,
            SessionAction::Api { epoch, request } => {
                self.pending.push_back((*epoch, request.clone()));
                self.requests.push((*epoch, request.clone()));
            },
            _ => {},
        }
    }

    /// Open `room` of `club`.
    pub fn open(&mut self, club: &str, room: &str) -> Vec<SessionAction> {
        self.handle(SessionEvent::OpenRoom { target: RoomTarget::new(club, room) })
    }

    /// Close the view.
    pub fn close(&mut self) -> Vec<SessionAction> {
        self.handle(SessionEvent::CloseRoom)
    }

    /// Report the live transport as open.
    pub fn accept_transport(&mut self) -> Vec<SessionAction> {
        match self.live {
            Some(attempt) => self.handle(SessionEvent::TransportOpened { attempt }),
            None => Vec::new(),
        }
    }

    /// Answer the `CONNECT` on the live transport.
    pub fn handshake(&mut self) -> Vec<SessionAction> {
        self.inbound(connected_frame())
    }

    /// Open the live transport and complete the handshake.
    pub fn connect(&mut self) -> Vec<SessionAction> {
        let mut actions = self.accept_transport();
        actions.extend(self.handshake());
        actions
    }

    /// Report the live transport as closed by the network.
    pub fn drop_transport(&mut self, reason: &str) -> Vec<SessionAction> {
        match self.live {
            Some(attempt) => {
                let reason = reason.to_string();
                self.handle(SessionEvent::TransportClosed { attempt, reason })
            },
            None => Vec::new(),
        }
    }

    /// Deliver `inbound` on the live transport.
    pub fn inbound(&mut self, frame: Inbound) -> Vec<SessionAction> {
        match self.live {
            Some(attempt) => self.handle(SessionEvent::FrameReceived { attempt, frame }),
            None => Vec::new(),
        }
    }

    /// Push `message` on the live subscription (or an unknown one when not
    /// subscribed).
    pub fn deliver(&mut self, message: &ChatMessage) -> Vec<SessionAction> {
        let subscription = self.subscription.clone().unwrap_or_else(|| "sub-none".to_string());
        self.inbound(message_frame(&subscription, message))
    }

    /// Push a raw `MESSAGE` body on the live subscription.
    pub fn deliver_raw(&mut self, body: &str) -> Vec<SessionAction> {
        let subscription = self.subscription.clone().unwrap_or_else(|| "sub-none".to_string());
        let frame = Frame::new(Command::Message)
            .with_header("subscription", subscription)
            .with_body(body);
        self.inbound(Inbound::Frame(frame))
    }

    /// Press send with `text`.
    pub fn send(&mut self, text: &str) -> Vec<SessionAction> {
        self.handle(SessionEvent::SendMessage { text: text.to_string() })
    }

    /// Move virtual time forward and tick.
    pub fn advance(&mut self, by: Duration) -> Vec<SessionAction> {
        self.env.advance(by);
        let now = self.env.now();
        self.handle(SessionEvent::Tick { now })
    }

    /// Answer the oldest parked REST call from the backend. `false` when none
    /// is parked.
    pub fn complete_next(&mut self) -> bool {
        let Some((epoch, request)) = self.pending.pop_front() else {
            return false;
        };
        let response = self.backend.respond(&request);
        self.handle(SessionEvent::ApiCompleted { epoch, response });
        true
    }

    /// Answer parked REST calls, including the ones they trigger, until none
    /// is left.
    pub fn complete_all(&mut self) {
        for _ in 0..MAX_COMPLETIONS {
            if !self.complete_next() {
                return;
            }
        }
    }

    /// Answer the oldest parked call matching `predicate`. `false` when none
    /// matches.
    pub fn complete_where(&mut self, predicate: impl Fn(&ApiRequest) -> bool) -> bool {
        let Some(index) = self.pending.iter().position(|(_, request)| predicate(request)) else {
            return false;
        };
        let Some((epoch, request)) = self.pending.remove(index) else {
            return false;
        };
        let response = self.backend.respond(&request);
        self.handle(SessionEvent::ApiCompleted { epoch, response });
        true
    }

    /// Remove the oldest parked call matching `predicate` without answering
    /// it.
    pub fn take_where(
        &mut self,
        predicate: impl Fn(&ApiRequest) -> bool,
    ) -> Option<(RoomEpoch, ApiRequest)> {
        let index = self.pending.iter().position(|(_, request)| predicate(request))?;
        self.pending.remove(index)
    }

    /// Feed a hand-written REST outcome.
    pub fn complete_with(&mut self, epoch: RoomEpoch, response: ApiResponse) -> Vec<SessionAction> {
        self.handle(SessionEvent::ApiCompleted { epoch, response })
    }

    /// The session under test.
    pub fn session(&self) -> &ChatSession<SimEnv> {
        &self.session
    }

    /// The backend, for changing answers mid-scenario.
    pub fn backend_mut(&mut self) -> &mut FakeBackend {
        &mut self.backend
    }

    /// The shared clock.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Read model.
    pub fn snapshot(&self) -> RoomSnapshot {
        self.session.snapshot()
    }

    /// Ids of the log, in order.
    pub fn log_ids(&self) -> Vec<String> {
        self.session.log().iter().map(|message| message.message_id.to_string()).collect()
    }

    /// Every REST call issued so far.
    pub fn requests(&self) -> &[(RoomEpoch, ApiRequest)] {
        &self.requests
    }

    /// REST calls issued so far that match `predicate`.
    pub fn count_requests(&self, predicate: impl Fn(&ApiRequest) -> bool) -> usize {
        self.requests.iter().filter(|(_, request)| predicate(request)).count()
    }

    /// REST calls still waiting for an answer.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Every action emitted so far.
    pub fn actions(&self) -> &[SessionAction] {
        &self.actions
    }

    /// Transports opened so far.
    pub fn opened(&self) -> &[(AttemptId, RoomId)] {
        &self.opened
    }

    /// Transports closed so far.
    pub fn closed(&self) -> &[AttemptId] {
        &self.closed
    }

    /// Live transport.
    pub fn live(&self) -> Option<AttemptId> {
        self.live
    }

    /// Frames written so far.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Frames written so far with `command`.
    pub fn frames_with(&self, command: Command) -> Vec<&Frame> {
        self.frames.iter().filter(|frame| frame.command == command).collect()
    }

    /// Heart-beats written so far.
    pub fn heart_beats(&self) -> usize {
        self.heart_beats
    }
}

#[cfg(test)]
mod tests {
    use clubchat_client::{ConnectionStatus, StreamState};

    use super::*;
    use crate::backend::chat;

    #[test]
    fn entry_sequence_reaches_subscription() {
        let mut scenario = Scenario::new(None, FakeBackend::default());
        scenario.open("1", "r1");
        scenario.connect();
        scenario.complete_all();

        assert_eq!(scenario.session().status(), ConnectionStatus::Connected);
        assert_eq!(scenario.session().stream_state(), StreamState::Subscribed);
        assert_eq!(scenario.frames_with(Command::Subscribe).len(), 1);
    }

    #[test]
    fn deliver_uses_live_subscription() {
        let mut scenario = Scenario::new(None, FakeBackend::default());
        scenario.open("1", "r1");
        scenario.connect();
        scenario.complete_all();

        scenario.deliver(&chat("m1", "r1", "2", "hi"));
        assert_eq!(scenario.log_ids(), ["m1"]);
    }
}
