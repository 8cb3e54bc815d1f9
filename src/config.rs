//! Session configuration: the page-scoped globals of the browser original
//! (`ROOM_ID`, `USERNAME`, `CSRF_TOKEN`) turned into an explicit config
//! object that is validated once, up front.
//!
//! ## Design
//! - `SessionConfig` carries everything a session needs to dial and identify
//!   itself; construction is plain, `validate()` is the page-load guard.
//! - Validation fails with `Error::MissingField` naming the first absent
//!   field, instead of the original's silent logged abort.
//! - `Channel` selects the endpoint path and the wire dialect; one session
//!   type parameterized by channel replaces the two near-duplicate classes.
//! - Configs can also be loaded from a TOML file for the terminal client.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which room endpoint a session speaks to, and in which dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Plain chat: `/ws/room/{id}/`, untagged `{message, username}` frames.
    Chat,
    /// Chat plus editor sync: `/ws/room-code/{id}/`, `type`-tagged frames.
    CodeSync,
}

impl Channel {
    /// The URL path segment that distinguishes the two endpoints.
    pub fn path(&self, room_id: &str) -> String {
        match self {
            Channel::Chat => format!("/ws/room/{}/", room_id),
            Channel::CodeSync => format!("/ws/room-code/{}/", room_id),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Channel::Chat => "chat",
            Channel::CodeSync => "code-sync",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a session needs to connect and identify itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Opaque room identifier, placed in the URL path.
    pub room_id: String,
    /// Local username stamped on every outbound envelope.
    pub username: String,
    /// CSRF token attached to the handshake request as `X-CSRFToken`.
    pub csrf_token: String,
    /// Host (and optional port) of the room server, e.g. `localhost:8000`.
    pub host: String,
    /// Use `wss` when true, mirroring the hosting page's scheme.
    #[serde(default)]
    pub secure: bool,
    /// Endpoint and dialect selection.
    pub channel: Channel,
}

impl SessionConfig {
    /// The page-load guard: every required field present or no session.
    pub fn validate(&self) -> Result<()> {
        if self.room_id.trim().is_empty() {
            return Err(Error::MissingField("room_id"));
        }
        if self.username.trim().is_empty() {
            return Err(Error::MissingField("username"));
        }
        if self.csrf_token.trim().is_empty() {
            return Err(Error::MissingField("csrf_token"));
        }
        if self.host.trim().is_empty() {
            return Err(Error::MissingField("host"));
        }
        Ok(())
    }

    /// Derive the socket URL: `{ws|wss}://{host}{channel path}`.
    pub fn socket_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}{}", scheme, self.host, self.channel.path(&self.room_id))
    }

    /// Load a config from a TOML file.
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigFile(format!("{}: {}", path.display(), e)))?;
        let config: SessionConfig =
            toml::from_str(&text).map_err(|e| Error::ConfigFile(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SessionConfig {
        SessionConfig {
            room_id: "42".to_string(),
            username: "alice".to_string(),
            csrf_token: "tok".to_string(),
            host: "localhost:8000".to_string(),
            secure: false,
            channel: Channel::Chat,
        }
    }

    #[test]
    fn test_socket_url_chat_plain_scheme() {
        assert_eq!(config().socket_url(), "ws://localhost:8000/ws/room/42/");
    }

    #[test]
    fn test_socket_url_code_sync_secure_scheme() {
        let mut c = config();
        c.secure = true;
        c.channel = Channel::CodeSync;
        assert_eq!(c.socket_url(), "wss://localhost:8000/ws/room-code/42/");
    }

    #[test]
    fn test_validate_ok() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_username() {
        let mut c = config();
        c.username = "   ".to_string();
        match c.validate() {
            Err(crate::error::Error::MissingField(field)) => assert_eq!(field, "username"),
            other => panic!("expected MissingField(username), got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_empty_room() {
        let mut c = config();
        c.room_id = String::new();
        assert!(matches!(
            c.validate(),
            Err(crate::error::Error::MissingField("room_id"))
        ));
    }
}
