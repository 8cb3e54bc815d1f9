use std::path::PathBuf;

use clap::Parser;

use crate::config::{Channel, SessionConfig};
use crate::error::Result;

#[derive(Parser)]
#[command(name = "room-sync")]
#[command(version = "0.1.0")]
#[command(about = "Terminal client for room-scoped chat and live code sync")]
pub struct Args {
    /// Room identifier, placed in the endpoint path
    pub room: String,

    /// Username stamped on every outbound message
    pub username: String,

    /// Room server host (and optional port)
    #[arg(long, default_value = "localhost:8000")]
    pub host: String,

    /// CSRF token carried on the handshake request
    #[arg(long, default_value = "dev-token")]
    pub csrf_token: String,

    /// Use wss instead of ws
    #[arg(long)]
    pub secure: bool,

    /// Join the room-code endpoint and mirror a local file into the room
    #[arg(long)]
    pub code: bool,

    /// Watch this file as the local editor content (implies --code)
    #[arg(long)]
    pub watch: Option<PathBuf>,

    /// Load the session config from a TOML file instead of flags
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Maximum reconnect attempts before giving up
    #[arg(long, default_value = "5")]
    pub max_retries: u32,
}

impl Args {
    /// Resolve the effective session config: the TOML file wins when given,
    /// otherwise the flags are assembled and validated.
    pub fn session_config(&self) -> Result<SessionConfig> {
        if let Some(path) = &self.config {
            return SessionConfig::from_toml_file(path);
        }
        let channel = if self.code || self.watch.is_some() {
            Channel::CodeSync
        } else {
            Channel::Chat
        };
        let config = SessionConfig {
            room_id: self.room.clone(),
            username: self.username.clone(),
            csrf_token: self.csrf_token.clone(),
            host: self.host.clone(),
            secure: self.secure,
            channel,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["room-sync", "42", "alice"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_default_channel_is_chat() {
        let config = args(&[]).session_config().unwrap();
        assert_eq!(config.channel, Channel::Chat);
        assert_eq!(config.room_id, "42");
        assert_eq!(config.username, "alice");
    }

    #[test]
    fn test_code_flag_selects_code_sync() {
        let config = args(&["--code"]).session_config().unwrap();
        assert_eq!(config.channel, Channel::CodeSync);
    }

    #[test]
    fn test_watch_implies_code_sync() {
        let config = args(&["--watch", "main.py"]).session_config().unwrap();
        assert_eq!(config.channel, Channel::CodeSync);
    }

    #[test]
    fn test_flags_flow_into_config() {
        let config = args(&["--host", "rooms.example.org", "--secure"])
            .session_config()
            .unwrap();
        assert_eq!(config.socket_url(), "wss://rooms.example.org/ws/room/42/");
    }
}
