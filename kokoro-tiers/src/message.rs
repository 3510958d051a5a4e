//! Chat messages as stored by the tiers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kokoro_core::{MessageId, SessionId, UserId};

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// The human user.
    User,
    /// The companion.
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        })
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// What a caller hands to `save_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Caller-chosen id. Resending a payload with the same id is a no-op in
    /// every tier; a fresh id is generated when `None`.
    #[serde(default)]
    pub id: Option<MessageId>,
    /// Author.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// Send time; defaults to now.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl MessagePayload {
    /// A user message sent now.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: None,
            role: MessageRole::User,
            content: content.into(),
            timestamp: None,
        }
    }

    /// A companion message sent now.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: None,
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: None,
        }
    }

    /// The same payload under a fixed id, for retry-safe saves.
    #[must_use]
    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }
}

/// A stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique identifier.
    pub id: MessageId,
    /// Owner.
    pub user_id: UserId,
    /// Conversation session.
    pub session_id: SessionId,
    /// Author.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// Send time.
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Stamp a payload with its own id, or a fresh one.
    #[must_use]
    pub fn from_payload(user_id: UserId, session_id: SessionId, payload: MessagePayload) -> Self {
        Self {
            id: payload.id.unwrap_or_default(),
            user_id,
            session_id,
            role: payload.role,
            content: payload.content,
            timestamp: payload.timestamp.unwrap_or_else(Utc::now),
        }
    }
}
