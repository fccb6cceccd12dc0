//! WebSocket and HTTP transport for the session.
//!
//! A thin layer: [`connect`] moves STOMP text frames between the chat socket
//! and a pair of channels, and [`ApiClient`] performs the REST calls the
//! session asks for. Protocol logic remains in the Sans-IO
//! [`ChatSession`](crate::ChatSession).

mod api;

use std::time::Duration;

pub use api::ApiClient;
use clubchat_proto::{Frame, Inbound, destination::CHAT_ENDPOINT};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
pub use url::Url;

/// REST base used when none is configured.
pub const DEFAULT_API_BASE: &str = "http://localhost:8082";

/// WebSocket base used when none is configured.
pub const DEFAULT_WS_BASE: &str = "ws://localhost:8082";

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Endpoint URL could not be used.
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),

    /// WebSocket connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Connection did not open in time.
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP client could not be built.
    #[error("http client error: {0}")]
    Http(String),
}

/// Base URLs of the chat backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    api_base: Url,
    ws_base: Url,
}

impl Endpoints {
    /// Parse both base URLs.
    pub fn new(api_base: &str, ws_base: &str) -> Result<Self, TransportError> {
        Ok(Self { api_base: parse_base(api_base)?, ws_base: parse_base(ws_base)? })
    }

    /// REST base.
    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// Chat socket URL with the access token as a query parameter.
    pub fn chat_url(&self, token: &str) -> Url {
        let mut url = self.ws_base.clone();
        let path = format!("{}{CHAT_ENDPOINT}", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.query_pairs_mut().append_pair("token", bare_token(token));
        url
    }

    /// REST URL for `segments` below the API base. Segments are
    /// percent-encoded.
    pub fn api_url(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::InvalidUrl(self.api_base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn parse_base(raw: &str) -> Result<Url, TransportError> {
    let url = Url::parse(raw).map_err(|e| TransportError::InvalidUrl(format!("{raw}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(TransportError::InvalidUrl(raw.to_string()));
    }
    Ok(url)
}

/// Token without a `Bearer ` prefix.
pub(crate) fn bare_token(token: &str) -> &str {
    let token = token.trim();
    token.strip_prefix("Bearer ").unwrap_or(token)
}

/// Something to write on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Encoded STOMP frame.
    Frame(Frame),
    /// Heart-beat EOL.
    HeartBeat,
}

/// Something that happened on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Decoded frame or heart-beat.
    Inbound(Inbound),
    /// Socket closed; no further events follow.
    Closed(String),
}

/// Handle to an open chat socket.
///
/// Dropping the handle closes the socket after the frames already queued on
/// `to_server` are written.
pub struct ChatSocket {
    /// Frames to write.
    pub to_server: mpsc::Sender<Outbound>,
    /// Frames read and the final close.
    pub from_server: mpsc::Receiver<SocketEvent>,
    abort_handle: tokio::task::AbortHandle,
}

impl ChatSocket {
    /// Write the queued frames, send a close, and wait for the socket task.
    ///
    /// The task is aborted if it has not finished within `grace`. Returns the
    /// close reason, or `None` after an abort.
    pub async fn close(self, grace: Duration) -> Option<String> {
        let Self { to_server, mut from_server, abort_handle } = self;
        drop(to_server);

        let finished = tokio::time::timeout(grace, async {
            while let Some(event) = from_server.recv().await {
                if let SocketEvent::Closed(reason) = event {
                    return Some(reason);
                }
            }
            None
        })
        .await;

        match finished {
            Ok(reason) => reason,
            Err(_) => {
                tracing::debug!(?grace, "chat socket did not close in time, aborting");
                abort_handle.abort();
                None
            },
        }
    }
}

/// Open the chat socket at `url`.
///
/// Fails with [`TransportError::Timeout`] when the upgrade does not finish
/// within `timeout`.
pub async fn connect(url: &Url, timeout: Duration) -> Result<ChatSocket, TransportError> {
    let (stream, _response) = tokio::time::timeout(timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| TransportError::Timeout(timeout))?
        .map_err(|e| TransportError::Connection(e.to_string()))?;

    let (to_server_tx, to_server_rx) = mpsc::channel::<Outbound>(32);
    let (from_server_tx, from_server_rx) = mpsc::channel::<SocketEvent>(64);

    let handle = tokio::spawn(run_socket(stream, to_server_rx, from_server_tx));

    Ok(ChatSocket {
        to_server: to_server_tx,
        from_server: from_server_rx,
        abort_handle: handle.abort_handle(),
    })
}

/// Bridge between the socket and the channels until either side goes away.
async fn run_socket(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut to_server: mpsc::Receiver<Outbound>,
    from_server: mpsc::Sender<SocketEvent>,
) {
    let (mut sink, mut source) = stream.split();

    let reason = loop {
        tokio::select! {
            outbound = to_server.recv() => {
                let Some(outbound) = outbound else {
                    if let Err(error) = sink.close().await {
                        tracing::debug!(%error, "close handshake failed");
                    }
                    break "closed locally".to_string();
                };
                let text = match outbound {
                    Outbound::Frame(frame) => frame.encode(),
                    Outbound::HeartBeat => "\n".to_string(),
                };
                if let Err(error) = sink.send(Message::Text(text)).await {
                    break format!("write failed: {error}");
                }
            },
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => match Frame::decode(&text) {
                    Ok(inbound) => {
                        if from_server.send(SocketEvent::Inbound(inbound)).await.is_err() {
                            return;
                        }
                    },
                    Err(error) => tracing::warn!(%error, "dropping undecodable frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or_else(
                        || "closed by server".to_string(),
                        |frame| format!("closed by server: {} {}", frame.code, frame.reason),
                    );
                },
                Some(Ok(_)) => {},
                Some(Err(error)) => break format!("read failed: {error}"),
                None => break "stream ended".to_string(),
            },
        }
    };

    tracing::debug!(%reason, "chat socket closed");
    // Receiver may already be gone after a local close.
    let _ = from_server.send(SocketEvent::Closed(reason)).await;
}
