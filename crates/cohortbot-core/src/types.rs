//! Wire types shared across crates.

use serde::{Deserialize, Serialize};

/// Conversation role, Gemini wire naming: the assistant speaks as "model".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One turn of a per-user conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
        }
    }
}

/// An inbound chat message, normalized from the platform event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Channel the message arrived in (DM channel id for direct messages).
    pub channel_id: String,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    /// True when the message arrived outside any guild.
    pub is_direct: bool,
    /// True when the bot user appears in the message's mention list.
    pub mentions_me: bool,
    /// True when the bot itself authored the message.
    pub is_self: bool,
}

/// An outbound text message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub channel_id: String,
    pub content: String,
}

impl OutgoingMessage {
    pub fn new(channel_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            content: content.into(),
        }
    }
}
