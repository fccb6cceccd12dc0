//! Network driver for the CLI.
//!
//! Implements the [`Driver`] trait over a tokio-tungstenite chat socket, a
//! reqwest API client, and lines read from stdin. Every slow operation runs on
//! its own task and reports back through one event channel, tagged with the
//! attempt or epoch it was started for, so the runtime loop never blocks on
//! the network.

use std::{
    io::{self, Write},
    mem,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use clubchat_app::{AppEvent, Driver, Notice};
use clubchat_client::{
    ApiRequest, AttemptId, RoomEpoch, SessionEvent,
    transport::{self, ApiClient, Endpoints, Outbound, SocketEvent, TransportError, Url},
};
use clubchat_proto::{Frame, RoomId};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
    task::{AbortHandle, JoinHandle},
};

/// How long `poll_event` waits before letting the runtime tick.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Frames buffered for a socket that is still opening.
const OUTBOUND_BUFFER: usize = 32;

/// How long a closed socket may take to flush and finish its close handshake.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Network driver errors.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// I/O error writing notices.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport setup error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// The socket of one attempt.
struct LiveSocket {
    attempt: AttemptId,
    outbound: mpsc::Sender<Outbound>,
    task: JoinHandle<()>,
}

/// Sockets that were closed but may still be flushing.
///
/// Cloned out of the driver so the caller can wait for the final frames after
/// the runtime has consumed the driver.
#[derive(Clone, Default)]
pub struct SocketDrain {
    closing: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl SocketDrain {
    /// Wait until every closed socket has finished or been aborted.
    pub async fn wait(&self) {
        let pending = mem::take(&mut *self.lock());
        for task in pending {
            // A reaper only fails by panicking; there is nothing left to flush.
            let _ = task.await;
        }
    }

    fn push(&self, task: JoinHandle<()>) {
        let mut closing = self.lock();
        closing.retain(|task| !task.is_finished());
        closing.push(task);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.closing.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Network driver implementing the [`Driver`] trait.
pub struct NetworkDriver {
    endpoints: Endpoints,
    token: String,
    api: ApiClient,
    connect_timeout: Duration,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
    socket: Option<LiveSocket>,
    drain: SocketDrain,
    stdin: Option<AbortHandle>,
}

impl NetworkDriver {
    /// Create a driver for `endpoints` authenticated with `token`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        endpoints: Endpoints,
        token: &str,
        connect_timeout: Duration,
    ) -> Result<Self, NetworkError> {
        let api = ApiClient::new(endpoints.clone(), token)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            endpoints,
            token: token.to_string(),
            api,
            connect_timeout,
            events_tx,
            events_rx,
            socket: None,
            drain: SocketDrain::default(),
            stdin: None,
        })
    }

    /// Handle for waiting on sockets this driver has closed.
    pub fn drain(&self) -> SocketDrain {
        self.drain.clone()
    }

    /// Start reading stdin lines. End of input becomes [`AppEvent::Quit`].
    pub fn read_stdin(&mut self) {
        let events = self.events_tx.clone();
        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let event = match lines.next_line().await {
                    Ok(Some(line)) => AppEvent::Line(line),
                    Ok(None) => AppEvent::Quit,
                    Err(error) => {
                        tracing::warn!(%error, "stdin failed");
                        AppEvent::Quit
                    },
                };
                let quit = matches!(event, AppEvent::Quit);
                if events.send(event).is_err() || quit {
                    return;
                }
            }
        });
        self.stdin = Some(task.abort_handle());
    }

    /// Queue a line as if it had been typed.
    pub fn inject_line(&self, line: impl Into<String>) {
        // The receiver lives in `self`.
        let _ = self.events_tx.send(AppEvent::Line(line.into()));
    }

    /// Close the current socket after its queued frames are written.
    ///
    /// Dropping the sender ends `run_attempt` once it has forwarded everything
    /// already queued. The attempt is aborted if it outlives the connect
    /// timeout plus [`CLOSE_GRACE`].
    fn close_socket(&mut self) {
        let Some(LiveSocket { attempt, outbound, task }) = self.socket.take() else {
            return;
        };
        tracing::debug!(%attempt, "closing chat socket");
        drop(outbound);

        if tokio::runtime::Handle::try_current().is_err() {
            task.abort();
            return;
        }
        let deadline = self.connect_timeout + CLOSE_GRACE;
        let abort = task.abort_handle();
        let reaper = tokio::spawn(async move {
            if tokio::time::timeout(deadline, task).await.is_err() {
                tracing::debug!(%attempt, "chat socket did not finish closing, aborting");
                abort.abort();
            }
        });
        self.drain.push(reaper);
    }

    async fn write(&mut self, outbound: Outbound) {
        let Some(socket) = &self.socket else {
            tracing::debug!("no chat socket, dropping outbound");
            return;
        };
        if socket.outbound.send(outbound).await.is_err() {
            // The close is already on its way as `TransportClosed`.
            tracing::debug!(attempt = %socket.attempt, "chat socket gone, dropping outbound");
        }
    }
}

/// Open the socket for `attempt` and pump it until it closes.
async fn run_attempt(
    attempt: AttemptId,
    url: Url,
    timeout: Duration,
    mut outbound: mpsc::Receiver<Outbound>,
    events: mpsc::UnboundedSender<AppEvent>,
) {
    let report = |event: SessionEvent<Instant>| events.send(AppEvent::Session(event)).is_ok();

    let mut socket = match transport::connect(&url, timeout).await {
        Ok(socket) => socket,
        Err(error) => {
            tracing::warn!(%attempt, %error, "chat socket failed to open");
            report(SessionEvent::TransportClosed { attempt, reason: error.to_string() });
            return;
        },
    };
    if !report(SessionEvent::TransportOpened { attempt }) {
        return;
    }

    loop {
        tokio::select! {
            next = outbound.recv() => {
                let Some(next) = next else {
                    let reason = socket.close(CLOSE_GRACE).await;
                    tracing::debug!(%attempt, ?reason, "chat socket closed locally");
                    return;
                };
                if socket.to_server.send(next).await.is_err() {
                    // The socket task ended; its close event is still queued.
                    tracing::debug!(%attempt, "chat socket gone, dropping outbound");
                }
            },
            event = socket.from_server.recv() => {
                let event = match event {
                    Some(SocketEvent::Inbound(frame)) => {
                        SessionEvent::FrameReceived { attempt, frame }
                    },
                    Some(SocketEvent::Closed(reason)) => {
                        report(SessionEvent::TransportClosed { attempt, reason });
                        return;
                    },
                    None => {
                        let reason = "socket task ended".to_string();
                        report(SessionEvent::TransportClosed { attempt, reason });
                        return;
                    },
                };
                if !report(event) {
                    return;
                }
            },
        }
    }
}

impl Driver for NetworkDriver {
    type Error = NetworkError;
    type Instant = Instant;

    async fn poll_event(&mut self) -> Result<Option<AppEvent>, Self::Error> {
        tokio::select! {
            biased;

            event = self.events_rx.recv() => Ok(Some(event.unwrap_or(AppEvent::Quit))),

            () = tokio::time::sleep(POLL_INTERVAL) => Ok(None),
        }
    }

    async fn open_transport(
        &mut self,
        attempt: AttemptId,
        room: RoomId,
    ) -> Result<(), Self::Error> {
        self.close_socket();

        let url = self.endpoints.chat_url(&self.token);
        let host = url.host_str().unwrap_or_default();
        tracing::info!(%attempt, %room, host, "opening chat socket");

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let task = tokio::spawn(run_attempt(
            attempt,
            url,
            self.connect_timeout,
            outbound_rx,
            self.events_tx.clone(),
        ));
        self.socket = Some(LiveSocket { attempt, outbound: outbound_tx, task });
        Ok(())
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<(), Self::Error> {
        self.write(Outbound::Frame(frame)).await;
        Ok(())
    }

    async fn send_heart_beat(&mut self) -> Result<(), Self::Error> {
        self.write(Outbound::HeartBeat).await;
        Ok(())
    }

    async fn close_transport(&mut self, attempt: AttemptId) -> Result<(), Self::Error> {
        if self.socket.as_ref().is_some_and(|socket| socket.attempt == attempt) {
            self.close_socket();
        }
        Ok(())
    }

    async fn submit(&mut self, epoch: RoomEpoch, request: ApiRequest) -> Result<(), Self::Error> {
        let api = self.api.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let response = api.execute(request).await;
            // Receiver gone means the runtime has stopped.
            let _ = events.send(AppEvent::Session(SessionEvent::ApiCompleted { epoch, response }));
        });
        Ok(())
    }

    fn notify(&mut self, notice: Notice) -> Result<(), Self::Error> {
        let mut out = io::stdout().lock();
        match notice {
            Notice::ClearCompose => {},
            Notice::Alert(message) => writeln!(out, "! {message}")?,
            Notice::Unauthorized => {
                writeln!(out, "! access token rejected; sign in again and restart")?;
            },
            Notice::RoomCreated(name) => writeln!(out, "* room created: {name}")?,
            Notice::Usage(text) => writeln!(out, "{text}")?,
        }
        out.flush()?;
        Ok(())
    }

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn stop(&mut self) {
        self.close_socket();
        if let Some(stdin) = self.stdin.take() {
            stdin.abort();
        }
    }
}

impl Drop for NetworkDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
