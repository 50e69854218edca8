//! Error types for clawchat.

use std::time::Duration;

/// Top-level error type for the client runtime.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("A message is already being generated")]
    SendInFlight,
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Hook registration and dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Hook handler {plugin_id}/{hook} failed: {reason}")]
    HandlerFailed {
        plugin_id: String,
        hook: String,
        reason: String,
    },

    #[error("Hook handler {plugin_id}/{hook} timed out after {timeout:?}")]
    Timeout {
        plugin_id: String,
        hook: String,
        timeout: Duration,
    },

    #[error("Unknown hook name: {0}")]
    UnknownHook(String),
}

/// Plugin lifecycle and loading errors.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Plugin already installed: {0}")]
    AlreadyInstalled(String),

    #[error("Invalid plugin manifest: {reason}")]
    InvalidManifest { reason: String },

    #[error("Dependency {name} fetch failed for plugin {plugin_id}: {reason}")]
    DependencyFetch {
        plugin_id: String,
        name: String,
        reason: String,
    },

    #[error("Module fetch failed for plugin {plugin_id}: {reason}")]
    ModuleFetch { plugin_id: String, reason: String },

    #[error("Plugin {plugin_id} init failed: {reason}")]
    Init { plugin_id: String, reason: String },

    #[error("Descriptor store error: {0}")]
    Store(String),
}

/// Proxy gateway errors. These never cross the plugin boundary as
/// `Err` — the gateway client folds them into a failed response.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Proxy endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Streaming read errors.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Network failure mid-stream: {0}")]
    Network(String),

    #[error("Stream cancelled")]
    Cancelled,
}

impl StreamError {
    /// Whether this error is a user-triggered cancellation, which is
    /// an expected action and suppressed from error notifications.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// Backend API errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response from backend: {0}")]
    InvalidResponse(String),
}

/// Result type alias for the client runtime.
pub type Result<T> = std::result::Result<T, Error>;
