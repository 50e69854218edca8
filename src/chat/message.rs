//! Chat message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// A message under assembly or on display.
///
/// `content` and `thinking` grow by stream deltas; `references` is
/// replaced wholesale when a references frame arrives.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    /// Client-side identity, assigned at creation.
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    /// Model reasoning text, shown collapsed in the UI.
    pub thinking: Option<String>,
    /// Retrieval references attached to this message.
    pub references: Vec<serde_json::Value>,
    /// Still receiving stream frames.
    pub streaming: bool,
    /// Displayed content was replaced by an error marker.
    pub errored: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// A finished user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content: content.into(),
            thinking: None,
            references: Vec::new(),
            streaming: false,
            errored: false,
            created_at: Utc::now(),
        }
    }

    /// An empty assistant message about to be streamed into.
    pub fn streaming_assistant() -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content: String::new(),
            thinking: None,
            references: Vec::new(),
            streaming: true,
            errored: false,
            created_at: Utc::now(),
        }
    }
}

/// A persisted message row as returned by the backend history API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub chat_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: String,
}
