//! Generic runtime for application orchestration.
//!
//! The Runtime drives the event loop, coordinating between:
//! - [`ChatSession`]: the session state machine
//! - [`Driver`]: platform-specific I/O
//! - subscribers of the [`RoomSnapshot`] read model

use clubchat_client::{
    ChatSession, Environment, RoomSnapshot, SessionAction, SessionConfig, SessionEvent,
};
use clubchat_proto::{ClubId, CreateRoomRequest};
use tokio::sync::watch;

use crate::{AppEvent, Command, Driver, HELP, Notice, command};

/// Generic runtime that orchestrates a session and a driver.
///
/// # Type Parameters
///
/// - `D`: Platform-specific I/O driver
/// - `E`: Environment the session reads time from; must share the driver's
///   clock
pub struct Runtime<D, E>
where
    D: Driver<Instant = E::Instant>,
    E: Environment,
{
    driver: D,
    session: ChatSession<E>,
    snapshots: watch::Sender<RoomSnapshot>,
}

impl<D, E> Runtime<D, E>
where
    D: Driver<Instant = E::Instant>,
    E: Environment,
{
    /// Create a runtime for the bearer `token`.
    pub fn new(driver: D, env: E, config: SessionConfig, token: Option<&str>) -> Self {
        let session = ChatSession::new(env, config, token);
        let (snapshots, _) = watch::channel(session.snapshot());
        Self { driver, session, snapshots }
    }

    /// Receive a new snapshot whenever the log, members, directory, or
    /// status change.
    pub fn subscribe(&self) -> watch::Receiver<RoomSnapshot> {
        self.snapshots.subscribe()
    }

    /// Run the main event loop until the driver reports [`AppEvent::Quit`].
    ///
    /// Each cycle:
    /// 1. Polls the driver for one input
    /// 2. Feeds it to the session and executes the resulting actions
    /// 3. Ticks the session with the driver's clock
    ///
    /// The open room is closed before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn run(mut self) -> Result<(), D::Error> {
        loop {
            let should_quit = self.process_cycle().await?;
            if should_quit {
                break;
            }
        }

        self.dispatch(SessionEvent::CloseRoom).await?;
        self.driver.stop();
        Ok(())
    }

    /// Process one cycle of the event loop.
    ///
    /// Returns `true` if the runtime should quit.
    pub async fn process_cycle(&mut self) -> Result<bool, D::Error> {
        match self.driver.poll_event().await? {
            Some(AppEvent::Quit) => return Ok(true),
            Some(AppEvent::Line(line)) => {
                if self.handle_line(&line).await? {
                    return Ok(true);
                }
            },
            Some(AppEvent::Session(event)) => self.dispatch(event).await?,
            None => {},
        }

        let now = self.driver.now();
        self.dispatch(SessionEvent::Tick { now }).await?;
        Ok(false)
    }

    /// Feed one event to the session and execute the resulting actions.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to execute an action.
    pub async fn dispatch(&mut self, event: SessionEvent<E::Instant>) -> Result<(), D::Error> {
        let actions = self.session.handle(event);
        self.execute(actions).await
    }

    /// The session.
    pub fn session(&self) -> &ChatSession<E> {
        &self.session
    }

    /// The driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Handle a typed line. Returns `true` if the user asked to quit.
    async fn handle_line(&mut self, line: &str) -> Result<bool, D::Error> {
        let event = match command::parse(line) {
            Command::Quit => return Ok(true),
            Command::Message { text } => SessionEvent::SendMessage { text },
            Command::Open { target } => SessionEvent::OpenRoom { target },
            Command::Close => SessionEvent::CloseRoom,
            Command::Members => SessionEvent::RefreshMembers,
            Command::Rooms { club } => match club.or_else(|| self.current_club()) {
                Some(club) => SessionEvent::ListRooms { club },
                None => {
                    self.driver.notify(Notice::Usage("no room open; use /rooms <club>".into()))?;
                    return Ok(false);
                },
            },
            Command::Create { club, name } => {
                SessionEvent::CreateRoom { club, request: CreateRoomRequest::new(name) }
            },
            Command::Help => {
                self.driver.notify(Notice::Usage(HELP.to_string()))?;
                return Ok(false);
            },
            Command::Unknown { input } => {
                self.driver.notify(Notice::Usage(format!("unknown command: {input}")))?;
                return Ok(false);
            },
            Command::InvalidArgs { command, error } => {
                self.driver.notify(Notice::Usage(format!("/{command}: {error}")))?;
                return Ok(false);
            },
        };

        self.dispatch(event).await?;
        Ok(false)
    }

    fn current_club(&self) -> Option<ClubId> {
        self.session.target().map(|target| target.club.clone())
    }

    /// Execute session actions in order, publishing one snapshot at the end
    /// if anything visible changed.
    async fn execute(&mut self, actions: Vec<SessionAction>) -> Result<(), D::Error> {
        let mut changed = false;

        for action in actions {
            match action {
                SessionAction::OpenTransport { attempt, room } => {
                    self.driver.open_transport(attempt, room).await?;
                },
                SessionAction::SendFrame(frame) => self.driver.send_frame(frame).await?,
                SessionAction::SendHeartBeat => self.driver.send_heart_beat().await?,
                SessionAction::CloseTransport { attempt } => {
                    self.driver.close_transport(attempt).await?;
                },
                SessionAction::Api { epoch, request } => {
                    self.driver.submit(epoch, request).await?;
                },
                SessionAction::ClearCompose => self.driver.notify(Notice::ClearCompose)?,
                SessionAction::RoomCreated { name } => {
                    self.driver.notify(Notice::RoomCreated(name))?;
                },
                SessionAction::Alert { message } => self.driver.notify(Notice::Alert(message))?,
                SessionAction::Unauthorized => self.driver.notify(Notice::Unauthorized)?,
                SessionAction::StatusChanged(_)
                | SessionAction::LogUpdated
                | SessionAction::MembersUpdated
                | SessionAction::DirectoryUpdated => changed = true,
            }
        }

        if changed {
            self.snapshots.send_replace(self.session.snapshot());
        }
        Ok(())
    }
}
