//! Backend REST client.
//!
//! Thin wrapper over the chat backend's HTTP surface: settings,
//! chats, message history, documents, URL parsing, and the two
//! NDJSON byte streams (chat and upload progress) the stream
//! assembler consumes.

use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::chat::message::StoredMessage;
use crate::config::ClientConfig;
use crate::error::{ApiError, StreamError};

/// Byte stream of an NDJSON response body.
pub type NdjsonByteStream = BoxStream<'static, Result<Bytes, StreamError>>;

/// Sampling settings for chat generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub stream: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            stream: true,
        }
    }
}

/// Retrieval settings for document grounding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSettings {
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    pub top_k: u32,
    pub score_threshold: f32,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 3,
            score_threshold: 0.5,
        }
    }
}

/// Appearance settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiSettings {
    #[serde(default)]
    pub logo_text: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub theme_mode: String,
}

/// Global settings blob persisted by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub chat_settings: ChatSettings,
    #[serde(default)]
    pub rag_settings: RagSettings,
    #[serde(default)]
    pub ui_settings: UiSettings,
}

/// A conversation row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A document listing row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: String,
    pub filename: String,
    pub created_at: String,
}

/// Result of server-side web page extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedPage {
    pub success: bool,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub length: usize,
}

/// REST client for the chat backend.
pub struct BackendApi {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl BackendApi {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    // -- Settings --

    pub async fn get_settings(&self) -> Result<Settings, ApiError> {
        let response = self
            .client
            .get(self.url("/api/settings"))
            .timeout(self.request_timeout)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn save_settings(&self, settings: &Settings) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url("/api/settings"))
            .timeout(self.request_timeout)
            .json(settings)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    // -- Chats --

    pub async fn list_chats(&self) -> Result<Vec<Chat>, ApiError> {
        let response = self
            .client
            .get(self.url("/api/chats"))
            .timeout(self.request_timeout)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn create_chat(&self) -> Result<Chat, ApiError> {
        let response = self
            .client
            .post(self.url("/api/chats"))
            .timeout(self.request_timeout)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn delete_chat(&self, chat_id: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.url(&format!("/api/chats/{chat_id}")))
            .timeout(self.request_timeout)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn list_messages(&self, chat_id: &str) -> Result<Vec<StoredMessage>, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/api/chats/{chat_id}/messages")))
            .timeout(self.request_timeout)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    // -- Chat streaming --

    /// Issue the streaming chat request; returns the NDJSON byte
    /// stream for the assembler. No overall timeout is applied — a
    /// generation may legitimately run for minutes, and cancellation
    /// is the caller's lever.
    pub async fn chat_stream(
        &self,
        body: &serde_json::Value,
    ) -> Result<NdjsonByteStream, ApiError> {
        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(body)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.bytes_stream().map_err(StreamError::from).boxed())
    }

    // -- Documents --

    pub async fn list_documents(&self) -> Result<Vec<DocumentInfo>, ApiError> {
        let response = self
            .client
            .get(self.url("/api/documents"))
            .timeout(self.request_timeout)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn delete_document(&self, doc_id: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.url(&format!("/api/documents/{doc_id}")))
            .timeout(self.request_timeout)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Upload a document; returns the NDJSON progress byte stream.
    pub async fn upload_document(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<NdjsonByteStream, ApiError> {
        let mime = mime_guess::from_path(filename)
            .first_or_octet_stream()
            .to_string();
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(&mime)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.url("/api/documents"))
            .multipart(form)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.bytes_stream().map_err(StreamError::from).boxed())
    }

    // -- Web content --

    pub async fn parse_url(&self, target: &str) -> Result<ParsedPage, ApiError> {
        let response = self
            .client
            .post(self.url("/api/parse-url"))
            .timeout(self.request_timeout)
            .json(&serde_json::json!({"url": target}))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults_match_backend() {
        let settings = Settings::default();
        assert!((settings.chat_settings.temperature - 0.7).abs() < f32::EPSILON);
        assert!((settings.chat_settings.top_p - 0.9).abs() < f32::EPSILON);
        assert!(settings.chat_settings.stream);
        assert_eq!(settings.rag_settings.chunk_size, 500);
        assert_eq!(settings.rag_settings.top_k, 3);
    }

    #[test]
    fn test_settings_deserialize_with_missing_sections() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert!(settings.chat_settings.stream);
        assert_eq!(settings.rag_settings.chunk_overlap, 50);
    }

    #[test]
    fn test_parsed_page_tolerates_minimal_body() {
        let page: ParsedPage = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(page.success);
        assert!(page.content.is_empty());
    }

    #[test]
    fn test_chat_row_roundtrip() {
        let chat = Chat {
            id: "c-1".to_string(),
            title: "New Chat".to_string(),
            created_at: "2025-01-01T00:00:00".to_string(),
            updated_at: "2025-01-01T00:00:00".to_string(),
        };
        let json = serde_json::to_string(&chat).unwrap();
        let back: Chat = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "c-1");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_http_error() {
        let config = ClientConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..ClientConfig::default()
        };
        let api = BackendApi::new(&config);
        let err = api.list_chats().await.unwrap_err();
        assert!(matches!(err, ApiError::Http(_)));
    }
}
