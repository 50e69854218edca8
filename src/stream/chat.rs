//! Chat stream consumer: applies NDJSON frames to a message under
//! assembly.

use serde::Deserialize;

use crate::chat::message::Message;
use crate::stream::FrameSink;

/// One line of the chat NDJSON stream. Every field is optional; a
/// frame carries whichever subset the backend chose to emit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatFrame {
    /// Sets the active conversation id (sent first on a new chat).
    pub chat_id: Option<String>,
    /// Content delta, appended to the accumulating message.
    pub content: Option<String>,
    /// Thinking delta, appended to the accumulating reasoning text.
    pub thinking: Option<String>,
    /// Retrieval references; replaces any prior set wholesale.
    pub references: Option<Vec<serde_json::Value>>,
    /// Backend-reported error, displayed in place of the content.
    pub error: Option<String>,
    /// Generation finished.
    pub done: Option<bool>,
}

/// Mutable state a chat stream assembles into.
#[derive(Debug)]
pub struct ChatAssembly {
    /// Active conversation id, set by the first frame of a new chat.
    pub chat_id: Option<String>,
    pub message: Message,
    pub done: bool,
}

impl ChatAssembly {
    pub fn new() -> Self {
        Self {
            chat_id: None,
            message: Message::streaming_assistant(),
            done: false,
        }
    }

    /// Apply one frame.
    ///
    /// `content` and `thinking` are deltas — appended, never assigned.
    /// `references` replaces wholesale. An `error` field replaces the
    /// displayed content with an error marker; it does not fail the
    /// stream.
    pub fn apply(&mut self, frame: ChatFrame) {
        if let Some(chat_id) = frame.chat_id {
            self.chat_id = Some(chat_id);
        }
        if let Some(delta) = frame.content {
            self.message.content.push_str(&delta);
        }
        if let Some(delta) = frame.thinking {
            self.message
                .thinking
                .get_or_insert_with(String::new)
                .push_str(&delta);
        }
        if let Some(references) = frame.references {
            self.message.references = references;
        }
        if let Some(error) = frame.error {
            tracing::warn!(error, "backend reported stream error");
            self.message.content = format!("Error: {error}");
            self.message.errored = true;
        }
        if frame.done.unwrap_or(false) {
            self.done = true;
        }
    }

    /// Mark assembly finished (stream ended or was cancelled). The
    /// accumulated message is kept as final, whatever state it is in.
    pub fn finalize(&mut self) {
        self.message.streaming = false;
    }
}

impl Default for ChatAssembly {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink for ChatAssembly {
    fn apply_frame(&mut self, frame: serde_json::Value) {
        match serde_json::from_value::<ChatFrame>(frame) {
            Ok(parsed) => self.apply(parsed),
            Err(e) => {
                tracing::warn!(error = %e, "dropping chat frame with unexpected shape");
            }
        }
    }
}
