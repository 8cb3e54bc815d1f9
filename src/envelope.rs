//! Wire envelopes for the two room dialects.
//!
//! ## Design
//! - The plain chat endpoint exchanges untagged `{"message","username"}`
//!   objects; the code endpoint exchanges the same shape plus a `type`
//!   discriminator and a `code_change` variant.
//! - `code_change` frames additionally carry an `origin` session id and a
//!   monotonic `revision` so a client can recognize its own echoed change
//!   without comparing content. Both fields are optional on the wire, so
//!   frames from clients that never send them still parse, and the relay
//!   server needs no change to pass them through.
//! - Encoding/decoding goes through `Dialect`, which owns the "which frames
//!   does this endpoint understand" decision.

use serde::{Deserialize, Serialize};

use crate::config::Channel;
use crate::error::{Error, Result};

/// An untagged chat frame, as exchanged on the plain room endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlainChat {
    pub message: String,
    pub username: String,
}

/// A `type`-tagged frame, as exchanged on the room-code endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    ChatMessage {
        message: String,
        username: String,
    },
    CodeChange {
        code: String,
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revision: Option<u64>,
    },
}

/// A decoded inbound frame, normalized across both dialects.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Chat {
        username: String,
        message: String,
    },
    CodeChange {
        username: String,
        code: String,
        origin: Option<String>,
        revision: Option<u64>,
    },
}

/// Encoder/decoder for one endpoint's dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Plain,
    Tagged,
}

impl From<Channel> for Dialect {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::Chat => Dialect::Plain,
            Channel::CodeSync => Dialect::Tagged,
        }
    }
}

impl Dialect {
    /// Serialize a chat message in this dialect.
    pub fn encode_chat(&self, message: &str, username: &str) -> Result<String> {
        let text = match self {
            Dialect::Plain => serde_json::to_string(&PlainChat {
                message: message.to_string(),
                username: username.to_string(),
            })?,
            Dialect::Tagged => serde_json::to_string(&Envelope::ChatMessage {
                message: message.to_string(),
                username: username.to_string(),
            })?,
        };
        Ok(text)
    }

    /// Serialize a full-snapshot code change. Only the tagged dialect has
    /// this variant; the plain endpoint does not speak it.
    pub fn encode_code_change(
        &self,
        code: &str,
        username: &str,
        origin: &str,
        revision: u64,
    ) -> Result<String> {
        if *self == Dialect::Plain {
            return Err(Error::UnsupportedOnChannel(Channel::Chat.name()));
        }
        let text = serde_json::to_string(&Envelope::CodeChange {
            code: code.to_string(),
            username: username.to_string(),
            origin: Some(origin.to_string()),
            revision: Some(revision),
        })?;
        Ok(text)
    }

    /// Parse one inbound text frame. A parse failure means the frame is
    /// dropped by the caller; it never tears down the connection.
    pub fn decode(&self, text: &str) -> Result<Inbound> {
        match self {
            Dialect::Plain => {
                let frame: PlainChat = serde_json::from_str(text)?;
                Ok(Inbound::Chat {
                    username: frame.username,
                    message: frame.message,
                })
            }
            Dialect::Tagged => match serde_json::from_str::<Envelope>(text)? {
                Envelope::ChatMessage { message, username } => Ok(Inbound::Chat {
                    username,
                    message,
                }),
                Envelope::CodeChange {
                    code,
                    username,
                    origin,
                    revision,
                } => Ok(Inbound::CodeChange {
                    username,
                    code,
                    origin,
                    revision,
                }),
            },
        }
    }
}
