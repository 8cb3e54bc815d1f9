use thiserror::Error;

/// Crate-level error type.
///
/// Two of these existed in the browser original only as console logs
/// (`MissingField`, `MalformedFrame`); the rest name failure modes the
/// original left silent — send on a closed socket, connect refusal, and
/// reconnect exhaustion — which callers here get to observe explicitly.
#[derive(Debug, Error)]
pub enum Error {
    /// A required configuration field was absent or empty at startup.
    /// The session is never started.
    #[error("missing required session field: {0}")]
    MissingField(&'static str),

    /// A configuration field is present but unusable (e.g. a CSRF token
    /// that cannot be carried in a handshake header).
    #[error("invalid session field: {0}")]
    InvalidField(&'static str),

    /// The channel does not support the attempted operation
    /// (e.g. `send_code_change` on a plain chat channel).
    #[error("operation not supported on the {0} channel")]
    UnsupportedOnChannel(&'static str),

    /// The WebSocket handshake or an in-flight frame failed at the
    /// transport level.
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// A send was attempted while no connection is open.
    #[error("not connected")]
    NotConnected,

    /// An inbound frame was not valid JSON for the session's dialect.
    /// The frame is dropped; the connection stays usable.
    #[error("malformed inbound frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    /// The reconnect policy ran out of attempts. Terminal.
    #[error("disconnected after {attempts} reconnect attempts")]
    RetriesExhausted { attempts: u32 },

    /// A TOML session config file could not be read or parsed.
    #[error("config file error: {0}")]
    ConfigFile(String),
}

pub type Result<T> = std::result::Result<T, Error>;
