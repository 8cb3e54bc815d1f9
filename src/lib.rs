//! Room-scoped WebSocket client sessions: chat and live code sync.
//!
//! ## Design
//! - One `RoomSession` type, parameterized by `Channel`, replaces the pair
//!   of near-duplicate page classes the behavior comes from. `Channel::Chat`
//!   speaks untagged `{message, username}` frames on `/ws/room/{id}/`;
//!   `Channel::CodeSync` speaks `type`-tagged frames on `/ws/room-code/{id}/`
//!   and mirrors an editor widget both ways.
//! - All socket I/O runs in one spawned task that multiplexes outbound
//!   frames, editor change events, and inbound frames with `tokio::select!`.
//! - Code sync is full-snapshot, last-write-wins: every editor change sends
//!   the entire current content, and an inbound change overwrites the local
//!   widget. There is no diffing and no merge. Echoes of our own changes are
//!   recognized by an `origin` tag on the frame, with content equality as
//!   the fallback guard.
//! - A dropped connection triggers bounded exponential backoff; exhaustion
//!   parks the session in a terminal `Disconnected` status.

pub mod cli;
pub mod config;
pub mod editor;
pub mod envelope;
pub mod error;
pub mod reconnect;
pub mod transcript;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{error, info, warn};

pub use config::{Channel, SessionConfig};
pub use editor::{update_code_editor, EditorBuffer, SharedEditor};
pub use envelope::{Dialect, Envelope, Inbound, PlainChat};
pub use error::{Error, Result};
pub use reconnect::{Backoff, ReconnectPolicy, SessionStatus};
pub use transcript::{MessageInput, RenderedMessage, Transcript};

/// Shared transcript handle: the session's I/O task appends to it, the
/// caller reads it.
pub type SharedTranscript = Arc<Mutex<Transcript>>;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Inbound frame application (pure layer)
// ---------------------------------------------------------------------------

/// What applying one inbound frame did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Rendered into the transcript.
    Chat,
    /// Code change applied to (or skipped by the equality guard of) the
    /// editor; `updated` says which.
    Code { updated: bool },
    /// A code change carrying our own origin tag; never re-applied.
    OwnEcho,
    /// A code change on a session with no editor attached.
    NoEditor,
}

/// Parse and apply one inbound text frame.
///
/// A parse failure returns the error without touching transcript or editor;
/// the caller logs it and drops the frame, and the connection stays usable.
pub fn apply_inbound(
    dialect: Dialect,
    text: &str,
    transcript: &SharedTranscript,
    editor: Option<&SharedEditor>,
    own_origin: &str,
) -> Result<Applied> {
    match dialect.decode(text)? {
        Inbound::Chat { username, message } => {
            if let Ok(mut guard) = transcript.lock() {
                guard.append(&username, &message);
            }
            Ok(Applied::Chat)
        }
        Inbound::CodeChange { code, origin, .. } => {
            if origin.as_deref() == Some(own_origin) {
                return Ok(Applied::OwnEcho);
            }
            match editor {
                Some(editor) => Ok(Applied::Code {
                    updated: update_code_editor(editor, &code),
                }),
                None => Ok(Applied::NoEditor),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RoomSession
// ---------------------------------------------------------------------------

/// One room-scoped client session: a single WebSocket connection plus its
/// send/receive behavior.
pub struct RoomSession {
    config: SessionConfig,
    dialect: Dialect,
    /// Random id stamped on outbound `code_change` frames so our own echo
    /// is recognizable regardless of content.
    origin: String,
    revision: Arc<AtomicU64>,
    input: MessageInput,
    transcript: SharedTranscript,
    editor: Option<SharedEditor>,
    policy: ReconnectPolicy,
    outbound_tx: Option<mpsc::UnboundedSender<String>>,
    status_tx: watch::Sender<SessionStatus>,
    status_rx: watch::Receiver<SessionStatus>,
}

impl RoomSession {
    /// Build a session from validated configuration. `CodeSync` sessions get
    /// an empty editor buffer; use [`RoomSession::editor`] to reach it.
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let dialect = Dialect::from(config.channel);
        let editor = match config.channel {
            Channel::Chat => None,
            Channel::CodeSync => Some(EditorBuffer::shared()),
        };
        let (status_tx, status_rx) = watch::channel(SessionStatus::Connecting);
        Ok(RoomSession {
            config,
            dialect,
            origin: uuid::Uuid::new_v4().to_string(),
            revision: Arc::new(AtomicU64::new(0)),
            input: MessageInput::new(),
            transcript: Arc::new(Mutex::new(Transcript::new())),
            editor,
            policy: ReconnectPolicy::default(),
            outbound_tx: None,
            status_tx,
            status_rx,
        })
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The origin id stamped on this session's `code_change` frames.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn transcript(&self) -> SharedTranscript {
        Arc::clone(&self.transcript)
    }

    /// The attached editor buffer, present on `CodeSync` sessions only.
    pub fn editor(&self) -> Option<SharedEditor> {
        self.editor.as_ref().map(Arc::clone)
    }

    /// The message form's input field.
    pub fn input_mut(&mut self) -> &mut MessageInput {
        &mut self.input
    }

    pub fn status(&self) -> SessionStatus {
        *self.status_rx.borrow()
    }

    /// Watch status transitions (`Connecting` → `Open` → `Reconnecting` →
    /// `Disconnected`).
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    // -----------------------------------------------------------------------
    // Connection
    // -----------------------------------------------------------------------

    /// Dial the room endpoint and spawn the I/O task.
    ///
    /// The initial dial runs under the same bounded backoff as later
    /// reconnects, so a refused connection surfaces as `RetriesExhausted`
    /// rather than hanging or silently giving up.
    pub async fn connect(&mut self) -> Result<()> {
        let mut backoff = Backoff::new(self.policy.clone());
        let ws = dial_with_backoff(&self.config, &mut backoff, &self.status_tx).await?;
        let _ = self.status_tx.send(SessionStatus::Open);
        info!(url = %self.config.socket_url(), "websocket connection established");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.outbound_tx = Some(outbound_tx);

        let io = IoTask {
            config: self.config.clone(),
            dialect: self.dialect,
            origin: self.origin.clone(),
            revision: Arc::clone(&self.revision),
            transcript: Arc::clone(&self.transcript),
            editor: self.editor.as_ref().map(Arc::clone),
            policy: self.policy.clone(),
            status_tx: self.status_tx.clone(),
        };
        tokio::spawn(io.run(ws, outbound_rx));
        Ok(())
    }

    /// Drop the outbound side, letting the I/O task close the socket.
    pub fn disconnect(&mut self) {
        self.outbound_tx = None;
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Submit the input field: trim, and if anything remains, send exactly
    /// one chat frame and clear the field. Whitespace-only input is a no-op
    /// that leaves the field untouched.
    pub fn send_message(&mut self) -> Result<()> {
        let Some(message) = self.input.take_trimmed() else {
            return Ok(());
        };
        let text = self.dialect.encode_chat(&message, &self.config.username)?;
        if let Err(err) = self.send_raw(text) {
            // Keep the typed text around instead of dropping it on a dead
            // connection.
            self.input.set(&message);
            return Err(err);
        }
        Ok(())
    }

    /// Send the full editor snapshot as a tagged `code_change`. Empty
    /// content is a no-op. Only valid on the `CodeSync` channel.
    pub fn send_code_change(&self, content: &str) -> Result<()> {
        if self.config.channel != Channel::CodeSync {
            return Err(Error::UnsupportedOnChannel(self.config.channel.name()));
        }
        if content.is_empty() {
            return Ok(());
        }
        let revision = self.revision.fetch_add(1, Ordering::Relaxed) + 1;
        let text = self.dialect.encode_code_change(
            content,
            &self.config.username,
            &self.origin,
            revision,
        )?;
        self.send_raw(text)
    }

    fn send_raw(&self, text: String) -> Result<()> {
        match &self.outbound_tx {
            Some(tx) => tx.send(text).map_err(|_| Error::NotConnected),
            None => Err(Error::NotConnected),
        }
    }
}

// ---------------------------------------------------------------------------
// I/O task
// ---------------------------------------------------------------------------

/// Everything the spawned I/O task needs, cloned out of the session.
struct IoTask {
    config: SessionConfig,
    dialect: Dialect,
    origin: String,
    revision: Arc<AtomicU64>,
    transcript: SharedTranscript,
    editor: Option<SharedEditor>,
    policy: ReconnectPolicy,
    status_tx: watch::Sender<SessionStatus>,
}

/// Why the inner frame loop stopped.
enum LoopExit {
    /// The session handle dropped its sender; close and stop.
    HandleGone,
    /// The connection dropped; try to reconnect.
    ConnectionLost,
}

impl IoTask {
    async fn run(self, mut ws: WsStream, mut outbound_rx: mpsc::UnboundedReceiver<String>) {
        let mut editor_rx = self
            .editor
            .as_ref()
            .and_then(|editor| editor.lock().ok().map(|guard| guard.subscribe()));
        let mut backoff = Backoff::new(self.policy.clone());

        loop {
            let (mut sink, mut stream) = ws.split();
            let exit = self
                .frame_loop(&mut sink, &mut stream, &mut outbound_rx, &mut editor_rx)
                .await;
            match exit {
                LoopExit::HandleGone => {
                    let _ = sink.close().await;
                    let _ = self.status_tx.send(SessionStatus::Disconnected);
                    info!("websocket connection closed");
                    return;
                }
                LoopExit::ConnectionLost => {
                    info!("websocket connection closed");
                    match dial_with_backoff(&self.config, &mut backoff, &self.status_tx).await {
                        Ok(new_ws) => {
                            ws = new_ws;
                            backoff.reset();
                            let _ = self.status_tx.send(SessionStatus::Open);
                            info!("websocket connection re-established");
                        }
                        Err(err) => {
                            error!(error = %err, "reconnect attempts exhausted");
                            let _ = self.status_tx.send(SessionStatus::Disconnected);
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Multiplex one connection until it drops or the handle goes away.
    async fn frame_loop(
        &self,
        sink: &mut SplitSink<WsStream, WsMessage>,
        stream: &mut SplitStream<WsStream>,
        outbound_rx: &mut mpsc::UnboundedReceiver<String>,
        editor_rx: &mut Option<broadcast::Receiver<String>>,
    ) -> LoopExit {
        loop {
            tokio::select! {
                // Frame queued by the session handle.
                frame = outbound_rx.recv() => {
                    match frame {
                        Some(text) => {
                            if let Err(err) = sink.send(WsMessage::Text(text)).await {
                                warn!(error = %err, "send failed");
                                return LoopExit::ConnectionLost;
                            }
                        }
                        None => return LoopExit::HandleGone,
                    }
                }

                // The editor widget reported a change: read the full current
                // content back and mirror it. The event's own payload (the
                // snapshot at change time) is discarded.
                event = recv_change(editor_rx) => {
                    match event {
                        Ok(_) => {
                            let content = self
                                .editor
                                .as_ref()
                                .and_then(|e| e.lock().ok().map(|g| g.get_value()))
                                .unwrap_or_default();
                            if content.is_empty() {
                                continue;
                            }
                            let revision = self.revision.fetch_add(1, Ordering::Relaxed) + 1;
                            match self.dialect.encode_code_change(
                                &content,
                                &self.config.username,
                                &self.origin,
                                revision,
                            ) {
                                Ok(text) => {
                                    if let Err(err) = sink.send(WsMessage::Text(text)).await {
                                        warn!(error = %err, "code change send failed");
                                        return LoopExit::ConnectionLost;
                                    }
                                }
                                Err(err) => warn!(error = %err, "code change encode failed"),
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // Full-snapshot sync makes skipped events harmless:
                            // the next change re-sends everything.
                            warn!(skipped, "editor change events lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            *editor_rx = None;
                        }
                    }
                }

                // Inbound frame from the server.
                msg = stream.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            match apply_inbound(
                                self.dialect,
                                &text,
                                &self.transcript,
                                self.editor.as_ref(),
                                &self.origin,
                            ) {
                                Ok(_) => {}
                                Err(err) => warn!(error = %err, "dropping frame"),
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            return LoopExit::ConnectionLost;
                        }
                        Some(Ok(_)) => {} // ping/pong/binary: ignored
                        Some(Err(err)) => {
                            warn!(error = %err, "receive failed");
                            return LoopExit::ConnectionLost;
                        }
                    }
                }
            }
        }
    }
}

/// Await the next editor change event, or never when no editor is attached.
async fn recv_change(
    editor_rx: &mut Option<broadcast::Receiver<String>>,
) -> std::result::Result<String, broadcast::error::RecvError> {
    match editor_rx.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Dialing
// ---------------------------------------------------------------------------

/// Build the handshake request, carrying the CSRF token as a header.
fn client_request(
    config: &SessionConfig,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
    let mut request = config.socket_url().into_client_request()?;
    let token = HeaderValue::from_str(&config.csrf_token)
        .map_err(|_| Error::InvalidField("csrf_token"))?;
    request.headers_mut().insert("X-CSRFToken", token);
    Ok(request)
}

/// Dial the endpoint under a bounded backoff episode. `RetriesExhausted`
/// means the caller should park the session as `Disconnected`.
async fn dial_with_backoff(
    config: &SessionConfig,
    backoff: &mut Backoff,
    status_tx: &watch::Sender<SessionStatus>,
) -> Result<WsStream> {
    loop {
        match connect_async(client_request(config)?).await {
            Ok((ws, _response)) => return Ok(ws),
            Err(err) => {
                let attempt = backoff.attempt() + 1;
                match backoff.next_delay() {
                    Some(delay) => {
                        warn!(attempt, error = %err, "connect attempt failed");
                        let _ = status_tx.send(SessionStatus::Reconnecting { attempt });
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(Error::RetriesExhausted {
                            attempts: backoff.max_attempts(),
                        });
                    }
                }
            }
        }
    }
}
