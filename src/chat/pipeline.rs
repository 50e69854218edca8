//! The send pipeline: hooks, network, stream assembly.
//!
//! Sending a message runs `transform_input` → `before_send` →
//! streaming request → `after_receive`, with the stream assembler
//! consuming the response body in between. Sends are serialized: a
//! new send is rejected while one is in flight, so two chat streams
//! never interleave.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::api::{BackendApi, NdjsonByteStream};
use crate::chat::message::Message;
use crate::error::{ApiError, Error, Result};
use crate::hooks::{HookName, HookRegistry};
use crate::stream::{ChatAssembly, StreamEnd, run_ndjson};

/// Outgoing chat request body.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    pub message: String,
    pub use_rag: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// How a send ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendCompletion {
    /// The stream ran to completion.
    Completed,
    /// The user cancelled mid-generation. Expected action — not
    /// surfaced as an error.
    Cancelled,
    /// The network failed mid-generation. Surfaced to the user, with
    /// the partial message retained.
    Failed(String),
}

/// Result of one send: the assembled message plus how it ended.
#[derive(Debug)]
pub struct SendOutput {
    /// Conversation id the backend attributed the exchange to.
    pub chat_id: Option<String>,
    pub message: Message,
    pub completion: SendCompletion,
}

/// Provides the streaming chat transport. `BackendApi` is the real
/// implementation; tests substitute canned streams.
#[async_trait::async_trait]
pub trait StreamTransport: Send + Sync {
    async fn chat_stream(
        &self,
        body: &serde_json::Value,
    ) -> std::result::Result<NdjsonByteStream, ApiError>;
}

#[async_trait::async_trait]
impl StreamTransport for BackendApi {
    async fn chat_stream(
        &self,
        body: &serde_json::Value,
    ) -> std::result::Result<NdjsonByteStream, ApiError> {
        BackendApi::chat_stream(self, body).await
    }
}

/// Drives message sends through the hook pipeline and the stream
/// assembler.
pub struct ChatClient {
    transport: Arc<dyn StreamTransport>,
    registry: Arc<HookRegistry>,
    /// The active generation's cancellation token; `Some` while a
    /// send is in flight.
    in_flight: Mutex<Option<CancellationToken>>,
}

impl ChatClient {
    pub fn new(transport: Arc<dyn StreamTransport>, registry: Arc<HookRegistry>) -> Self {
        Self {
            transport,
            registry,
            in_flight: Mutex::new(None),
        }
    }

    /// Whether a generation is currently in flight.
    pub async fn is_generating(&self) -> bool {
        self.in_flight.lock().await.is_some()
    }

    /// Cancel the in-flight generation, if any. The token is
    /// single-use: the streaming read stops, the partial message is
    /// kept as final, and the next send gets a fresh token.
    pub async fn cancel(&self) {
        if let Some(token) = self.in_flight.lock().await.as_ref() {
            token.cancel();
        }
    }

    /// Send a message and assemble the streamed response.
    ///
    /// Rejects with [`Error::SendInFlight`] while another send is
    /// running. Hook handlers that fail are skipped; only the primary
    /// request path surfaces errors.
    pub async fn send(&self, request: ChatRequest) -> Result<SendOutput> {
        let token = {
            let mut slot = self.in_flight.lock().await;
            if slot.is_some() {
                return Err(Error::SendInFlight);
            }
            let token = CancellationToken::new();
            *slot = Some(token.clone());
            token
        };

        let result = self.send_inner(request, &token).await;
        *self.in_flight.lock().await = None;
        result
    }

    async fn send_inner(
        &self,
        mut request: ChatRequest,
        token: &CancellationToken,
    ) -> Result<SendOutput> {
        // transform_input: a plugin may rewrite the user's message.
        if let Some(payload) = self
            .registry
            .dispatch(HookName::TransformInput, &json!({"message": request.message}))
            .await
        {
            if let Some(content) = payload.get("content").and_then(|v| v.as_str()) {
                request.message = content.to_string();
            }
        }

        // before_send: the winning payload's `body` fields are merged
        // into the outgoing request.
        let mut body = serde_json::to_value(&request)
            .map_err(|e| Error::Api(ApiError::InvalidResponse(e.to_string())))?;
        if let Some(payload) = self
            .registry
            .dispatch(HookName::BeforeSend, &json!({"body": body.clone()}))
            .await
        {
            if let (Some(extra), Some(target)) = (
                payload.get("body").and_then(|v| v.as_object()),
                body.as_object_mut(),
            ) {
                for (key, value) in extra {
                    target.insert(key.clone(), value.clone());
                }
            }
        }

        let stream = self.transport.chat_stream(&body).await?;

        let mut assembly = ChatAssembly::new();
        let completion = match run_ndjson(stream, &mut assembly, token).await {
            Ok(StreamEnd::Completed) => SendCompletion::Completed,
            Ok(StreamEnd::Cancelled) => SendCompletion::Cancelled,
            Err(e) => SendCompletion::Failed(e.to_string()),
        };
        assembly.finalize();

        let ChatAssembly {
            chat_id,
            mut message,
            ..
        } = assembly;

        // after_receive: runs only on a normally completed,
        // non-errored message; a `content` payload replaces the
        // displayed content.
        if completion == SendCompletion::Completed && !message.errored {
            if let Some(payload) = self
                .registry
                .dispatch(
                    HookName::AfterReceive,
                    &json!({"message": {"role": "assistant", "content": message.content}}),
                )
                .await
            {
                if let Some(content) = payload.get("content").and_then(|v| v.as_str()) {
                    message.content = content.to_string();
                }
            }
        }

        Ok(SendOutput {
            chat_id,
            message,
            completion,
        })
    }
}
