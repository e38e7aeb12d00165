//! Websocket transport: one multiplexed channel with reconnect-with-backoff.
//!
//! `spawn_transport` starts a background task that owns the socket. Callers
//! talk to it through a [`TransportHandle`] (outbound frames, close, status)
//! and receive inbound frames, in arrival order, on an mpsc channel.
//!
//! LIFECYCLE
//! =========
//! Each attempt resolves a credential, opens `/api/ws`, and waits for the
//! server's `session:connected` frame before flushing outbound frames. When
//! the channel drops, a local `session:disconnected` frame is delivered,
//! unsent frames are discarded, and the [`ConnectionMachine`] decides how long
//! to back off before the next attempt.

#[cfg(test)]
#[path = "transport_test.rs"]
mod transport_test;

use futures_util::{SinkExt, StreamExt};
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::connection::{BackoffPolicy, ConnectionMachine, ConnectionStatus, TransitionAction};
use super::syscall::Syscall;
use super::types::{Frame, FrameStatus};

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The base URL could not be converted to a websocket URL.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    /// An HTTP request to the server failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// An HTTP header value could not be constructed.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    /// The websocket connection or handshake failed.
    #[error("websocket connect failed: {0}")]
    WsConnect(Box<tokio_tungstenite::tungstenite::Error>),
    /// A frame could not be encoded or decoded.
    #[error("frame codec failed: {0}")]
    Codec(#[from] frames::CodecError),
    /// A required field was absent from the server response payload.
    #[error("missing expected field `{0}`")]
    MissingField(&'static str),
    /// The transport task has shut down.
    #[error("transport closed")]
    Closed,
}

/// How the client authenticates each connection attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credential {
    /// Pre-obtained one-time websocket ticket.
    Ticket(String),
    /// Session cookie exchanged for a fresh ticket on every attempt.
    SessionToken(String),
    /// Connect without a ticket (local servers and tests).
    None,
}

/// Encoding used for outbound frames. Inbound frames are accepted in both.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WireFormat {
    /// Protobuf in binary websocket messages.
    #[default]
    Binary,
    /// JSON in text websocket messages.
    Json,
}

impl std::str::FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" | "protobuf" | "proto" => Ok(Self::Binary),
            "json" | "text" => Ok(Self::Json),
            other => Err(format!("unknown wire format `{other}`")),
        }
    }
}

/// Everything the transport task needs to (re)connect.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// HTTP(S) or WS(S) base URL of the server, e.g. `"http://127.0.0.1:3000"`.
    pub base_url: String,
    pub credential: Credential,
    pub backoff: BackoffPolicy,
    pub wire_format: WireFormat,
}

/// Outbound side of a session: somewhere to hand frames for delivery.
pub trait FrameSink {
    /// Queue `frame` for delivery. Never retried on failure.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the transport is gone.
    fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError>;
}

enum Command {
    Send(Frame),
    Close,
}

/// Caller-side handle to a running transport task.
#[derive(Clone, Debug)]
pub struct TransportHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send(frame) => write!(f, "Send({})", frame.syscall),
            Self::Close => f.write_str("Close"),
        }
    }
}

impl TransportHandle {
    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// A receiver that observes every status change.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Stop reconnecting and close the socket.
    pub fn close(&self) {
        if self.commands.send(Command::Close).is_err() {
            debug!("transport: close requested after shutdown");
        }
    }
}

impl FrameSink for TransportHandle {
    fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.commands.send(Command::Send(frame)).map_err(|_| TransportError::Closed)
    }
}

/// Start the transport task.
///
/// Returns the handle plus the receiver of inbound frames. The task ends when
/// [`TransportHandle::close`] is called, every handle is dropped, or the
/// inbound receiver is dropped.
#[must_use]
pub fn spawn_transport(config: TransportConfig) -> (TransportHandle, mpsc::UnboundedReceiver<Frame>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);

    tokio::spawn(run_transport(config, command_rx, inbound_tx, status_tx));

    (TransportHandle { commands: command_tx, status: status_rx }, inbound_rx)
}

/// Why one connection attempt ended.
enum SessionEnd {
    /// The channel failed; `handshake` tells whether the session had started.
    Lost { handshake: bool },
    /// Shutdown requested (or nobody is listening any more).
    Shutdown,
}

async fn run_transport(
    config: TransportConfig,
    mut commands: mpsc::UnboundedReceiver<Command>,
    inbound: mpsc::UnboundedSender<Frame>,
    status: watch::Sender<ConnectionStatus>,
) {
    let mut machine = ConnectionMachine::new(config.backoff);
    let mut queued: Vec<Frame> = Vec::new();

    loop {
        machine.start();
        status.send_replace(machine.state().status());

        let opened = tokio::select! {
            opened = open_socket(&config) => opened,
            () = hold_until_close(&mut commands, &mut queued) => break,
        };
        let end = match opened {
            Ok(stream) => run_session(stream, &config, &mut machine, &mut commands, &inbound, &status, &mut queued).await,
            Err(e) => {
                warn!(error = %e, "transport: connect failed");
                SessionEnd::Lost { handshake: false }
            }
        };

        let handshake = match end {
            SessionEnd::Shutdown => break,
            SessionEnd::Lost { handshake } => handshake,
        };

        if !queued.is_empty() {
            warn!(count = queued.len(), "transport: dropping frames unsent at disconnect");
            queued.clear();
        }

        let action = machine.on_lost();
        status.send_replace(machine.state().status());
        if handshake {
            info!("transport: connection lost");
            let frame = Frame::local(Syscall::SessionDisconnected.as_str(), FrameStatus::Done, json!({}));
            if inbound.send(frame).is_err() {
                break;
            }
        }

        if let TransitionAction::Sleep(delay) = action {
            debug!(delay_ms = delay.as_millis(), attempt = machine.attempt(), "transport: backing off");
            if !backoff(delay, &mut commands, &mut queued).await {
                break;
            }
        }
    }

    machine.close();
    status.send_replace(machine.state().status());
    info!("transport: closed");
}

/// Sleep out a backoff interval while still accepting commands.
///
/// Frames sent meanwhile are held for the next session. Returns `false` on shutdown.
async fn backoff(
    delay: std::time::Duration,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    queued: &mut Vec<Frame>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => return true,
            cmd = commands.recv() => match cmd {
                Some(Command::Send(frame)) => queued.push(frame),
                Some(Command::Close) | None => return false,
            },
        }
    }
}

/// Queue frames until a close is requested.
async fn hold_until_close(commands: &mut mpsc::UnboundedReceiver<Command>, queued: &mut Vec<Frame>) {
    while let Some(Command::Send(frame)) = commands.recv().await {
        queued.push(frame);
    }
}

async fn open_socket(config: &TransportConfig) -> Result<WsStream, TransportError> {
    let ticket = match &config.credential {
        Credential::Ticket(ticket) => Some(ticket.clone()),
        Credential::SessionToken(token) => Some(fetch_ws_ticket(&config.base_url, token).await?),
        Credential::None => None,
    };
    let url = ws_url(&config.base_url, ticket.as_deref())?;
    let (stream, _) = connect_async(url)
        .await
        .map_err(|e| TransportError::WsConnect(Box::new(e)))?;
    Ok(stream)
}

async fn run_session(
    mut stream: WsStream,
    config: &TransportConfig,
    machine: &mut ConnectionMachine,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    inbound: &mpsc::UnboundedSender<Frame>,
    status: &watch::Sender<ConnectionStatus>,
    queued: &mut Vec<Frame>,
) -> SessionEnd {
    let mut handshake = false;

    loop {
        tokio::select! {
            msg = stream.next() => {
                let Some(msg) = msg else {
                    return SessionEnd::Lost { handshake };
                };
                let msg = match msg {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(error = %e, "transport: read failed");
                        return SessionEnd::Lost { handshake };
                    }
                };
                let frame = match msg {
                    Message::Binary(bytes) => frames::decode_frame(&bytes),
                    Message::Text(text) => frames::decode_json(text.as_str()),
                    Message::Close(_) => return SessionEnd::Lost { handshake },
                    _ => continue,
                };
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "transport: dropping malformed frame");
                        continue;
                    }
                };

                if !handshake && frame.syscall == Syscall::SessionConnected.as_str() {
                    handshake = true;
                    machine.on_handshake();
                    status.send_replace(machine.state().status());
                    info!("transport: session connected");
                    for pending in std::mem::take(queued) {
                        if let Err(e) = write_frame(&mut stream, config.wire_format, &pending).await {
                            warn!(error = %e, "transport: write failed");
                            return SessionEnd::Lost { handshake };
                        }
                    }
                }

                if inbound.send(frame).is_err() {
                    close_socket(&mut stream).await;
                    return SessionEnd::Shutdown;
                }
            }
            cmd = commands.recv() => match cmd {
                Some(Command::Send(frame)) if handshake => {
                    if let Err(e) = write_frame(&mut stream, config.wire_format, &frame).await {
                        warn!(error = %e, id = %frame.id, syscall = %frame.syscall, "transport: write failed");
                        return SessionEnd::Lost { handshake };
                    }
                }
                Some(Command::Send(frame)) => queued.push(frame),
                Some(Command::Close) | None => {
                    close_socket(&mut stream).await;
                    return SessionEnd::Shutdown;
                }
            },
        }
    }
}

async fn write_frame(stream: &mut WsStream, format: WireFormat, frame: &Frame) -> Result<(), TransportError> {
    let msg = match format {
        WireFormat::Binary => Message::Binary(frames::encode_frame(frame).into()),
        WireFormat::Json => Message::Text(frames::encode_json(frame)?.into()),
    };
    stream
        .send(msg)
        .await
        .map_err(|e| TransportError::WsConnect(Box::new(e)))
}

async fn close_socket(stream: &mut WsStream) {
    if let Err(e) = stream.close(None).await {
        debug!(error = %e, "transport: close handshake failed");
    }
}

/// Exchange a session cookie for a one-time websocket ticket.
///
/// # Errors
///
/// Returns an HTTP error, or [`TransportError::MissingField`] if the
/// response carries no ticket.
pub async fn fetch_ws_ticket(base_url: &str, session_token: &str) -> Result<String, TransportError> {
    let client = reqwest::Client::new();
    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, HeaderValue::from_str(&format!("session_token={session_token}"))?);

    let url = format!("{}/api/auth/ws-ticket", base_url.trim_end_matches('/'));
    let body = client
        .post(url)
        .headers(headers)
        .json(&json!({}))
        .send()
        .await?
        .error_for_status()?
        .json::<Value>()
        .await?;

    body.get("ticket")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or(TransportError::MissingField("ticket"))
}

/// Build the websocket endpoint URL for `base_url`.
///
/// # Errors
///
/// Returns [`TransportError::InvalidBaseUrl`] for schemes other than
/// `http`, `https`, `ws` and `wss`.
pub fn ws_url(base_url: &str, ticket: Option<&str>) -> Result<String, TransportError> {
    let trimmed = base_url.trim_end_matches('/');
    let endpoint = if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}/api/ws")
    } else if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}/api/ws")
    } else if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        format!("{trimmed}/api/ws")
    } else {
        return Err(TransportError::InvalidBaseUrl(base_url.to_owned()));
    };
    Ok(match ticket {
        Some(ticket) => format!("{endpoint}?ticket={ticket}"),
        None => endpoint,
    })
}
