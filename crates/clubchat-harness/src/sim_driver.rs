//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the CLI's network driver but
//! over in-memory queues and a virtual clock. It implements [`Driver`] so the
//! same [`clubchat_app::Runtime`] orchestration code runs in both production
//! and simulation.
//!
//! Clones share state, so a test can keep a handle for injection and
//! inspection after the driver has moved into the runtime.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use clubchat_app::{AppEvent, Driver, Notice};
use clubchat_client::{ApiRequest, AttemptId, RoomEpoch, SessionEvent};
use clubchat_core::Environment;
use clubchat_proto::{ChatMessage, Command, Frame, RoomId};

use crate::{
    backend::{FakeBackend, connected_frame, message_frame},
    sim_env::{SimEnv, SimInstant},
};

/// Error type for simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// Shared state for event injection and capture.
#[derive(Default)]
struct SharedState {
    pending: VecDeque<AppEvent<SimInstant>>,
    backend: Option<FakeBackend>,
    auto_connect: bool,
    live: Option<AttemptId>,
    subscription: Option<String>,
    frames: Vec<Frame>,
    heart_beats: usize,
    opened: Vec<(AttemptId, RoomId)>,
    closed: Vec<AttemptId>,
    submitted: Vec<(RoomEpoch, ApiRequest)>,
    notices: Vec<Notice>,
    stopped: bool,
}

/// Simulation driver for deterministic testing.
#[derive(Clone)]
pub struct SimDriver {
    env: SimEnv,
    state: Arc<Mutex<SharedState>>,
}

impl SimDriver {
    /// Driver on `env`'s clock with no backend: REST calls are recorded but
    /// never answered.
    pub fn new(env: SimEnv) -> Self {
        Self { env, state: Arc::new(Mutex::new(SharedState::default())) }
    }

    /// Answer REST calls from `backend` as soon as they are submitted.
    #[must_use]
    pub fn with_backend(self, backend: FakeBackend) -> Self {
        self.lock().backend = Some(backend);
        self
    }

    /// Complete every transport open and handshake on the next polls.
    #[must_use]
    pub fn with_auto_connect(self) -> Self {
        self.lock().auto_connect = true;
        self
    }

    /// The shared clock.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Inject a typed line.
    pub fn inject_line(&self, line: impl Into<String>) {
        self.inject_event(AppEvent::Line(line.into()));
    }

    /// Inject an `AppEvent` for processing.
    pub fn inject_event(&self, event: AppEvent<SimInstant>) {
        self.lock().pending.push_back(event);
    }

    /// Push `message` on the live subscription.
    ///
    /// # Errors
    ///
    /// Fails when no transport is live or nothing is subscribed.
    pub fn inject_message(&self, message: &ChatMessage) -> Result<(), SimDriverError> {
        let mut state = self.lock();
        let attempt = state.live.ok_or_else(|| SimDriverError("no live transport".into()))?;
        let subscription =
            state.subscription.clone().ok_or_else(|| SimDriverError("not subscribed".into()))?;
        let frame = message_frame(&subscription, message);
        state.pending.push_back(AppEvent::Session(SessionEvent::FrameReceived { attempt, frame }));
        Ok(())
    }

    /// Report the live transport as closed by the network.
    pub fn inject_transport_loss(&self, reason: &str) {
        let mut state = self.lock();
        if let Some(attempt) = state.live.take() {
            state.subscription = None;
            let event = SessionEvent::TransportClosed { attempt, reason: reason.to_string() };
            state.pending.push_back(AppEvent::Session(event));
        }
    }

    /// Check if there are pending events to process.
    pub fn has_pending(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    /// Take all captured outgoing frames.
    pub fn take_frames(&self) -> Vec<Frame> {
        std::mem::take(&mut self.lock().frames)
    }

    /// Captured frames with `command`.
    pub fn frames_with(&self, command: Command) -> Vec<Frame> {
        self.lock().frames.iter().filter(|frame| frame.command == command).cloned().collect()
    }

    /// Heart-beats written so far.
    pub fn heart_beats(&self) -> usize {
        self.lock().heart_beats
    }

    /// Transports opened so far.
    pub fn opened(&self) -> Vec<(AttemptId, RoomId)> {
        self.lock().opened.clone()
    }

    /// Transports closed so far.
    pub fn closed(&self) -> Vec<AttemptId> {
        self.lock().closed.clone()
    }

    /// REST calls submitted so far.
    pub fn submitted(&self) -> Vec<(RoomEpoch, ApiRequest)> {
        self.lock().submitted.clone()
    }

    /// Notices shown so far.
    pub fn notices(&self) -> Vec<Notice> {
        self.lock().notices.clone()
    }

    /// Whether the runtime stopped the driver.
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Instant = SimInstant;

    async fn poll_event(&mut self) -> Result<Option<AppEvent<SimInstant>>, Self::Error> {
        Ok(self.lock().pending.pop_front())
    }

    async fn open_transport(
        &mut self,
        attempt: AttemptId,
        room: RoomId,
    ) -> Result<(), Self::Error> {
        let mut state = self.lock();
        state.opened.push((attempt, room));
        state.live = Some(attempt);
        state.subscription = None;
        if state.auto_connect {
            let opened = SessionEvent::TransportOpened { attempt };
            let connected = SessionEvent::FrameReceived { attempt, frame: connected_frame() };
            state.pending.push_back(AppEvent::Session(opened));
            state.pending.push_back(AppEvent::Session(connected));
        }
        Ok(())
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<(), Self::Error> {
        let mut state = self.lock();
        if state.live.is_none() {
            return Err(SimDriverError(format!("{} frame without a live transport", frame.command)));
        }
        match frame.command {
            Command::Subscribe => state.subscription = frame.header("id").map(str::to_string),
            Command::Unsubscribe => state.subscription = None,
            _ => {},
        }
        state.frames.push(frame);
        Ok(())
    }

    async fn send_heart_beat(&mut self) -> Result<(), Self::Error> {
        self.lock().heart_beats += 1;
        Ok(())
    }

    async fn close_transport(&mut self, attempt: AttemptId) -> Result<(), Self::Error> {
        let mut state = self.lock();
        state.closed.push(attempt);
        if state.live == Some(attempt) {
            state.live = None;
            state.subscription = None;
        }
        Ok(())
    }

    async fn submit(&mut self, epoch: RoomEpoch, request: ApiRequest) -> Result<(), Self::Error> {
        let mut state = self.lock();
        state.submitted.push((epoch, request.clone()));
        let response = state.backend.as_mut().map(|backend| backend.respond(&request));
        if let Some(response) = response {
            let event = SessionEvent::ApiCompleted { epoch, response };
            state.pending.push_back(AppEvent::Session(event));
        }
        Ok(())
    }

    fn notify(&mut self, notice: Notice) -> Result<(), Self::Error> {
        self.lock().notices.push(notice);
        Ok(())
    }

    fn now(&self) -> SimInstant {
        self.env.now()
    }

    fn stop(&mut self) {
        self.lock().stopped = true;
    }
}
