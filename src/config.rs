//! Client configuration.
//!
//! Defaults live under `~/.clawchat`; environment variables
//! (`CLAWCHAT_BASE_URL`, `CLAWCHAT_DATA_DIR`) override the file, and
//! a `.env` file is honored via dotenvy.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Runtime configuration for the chat client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend base URL.
    pub base_url: String,
    /// Directory for plugin descriptors and plugin storage.
    pub data_dir: PathBuf,
    /// Timeout for plain REST calls, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:51111".to_string(),
            data_dir: default_data_dir(),
            request_timeout_secs: 30,
        }
    }
}

/// `~/.clawchat`, falling back to a relative directory when the home
/// directory cannot be determined.
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".clawchat"))
        .unwrap_or_else(|| PathBuf::from(".clawchat"))
}

impl ClientConfig {
    /// Default config path: `{data_dir}/config.json`.
    pub fn default_path() -> PathBuf {
        default_data_dir().join("config.json")
    }

    /// Load from a JSON file, then apply environment overrides. A
    /// missing or corrupt file falls back to defaults.
    pub fn load_from(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "corrupt config, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };
        config.apply_env();
        config
    }

    /// Load defaults plus environment overrides (no config file).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(base_url) = std::env::var("CLAWCHAT_BASE_URL") {
            if !base_url.is_empty() {
                self.base_url = base_url;
            }
        }
        if let Ok(data_dir) = std::env::var("CLAWCHAT_DATA_DIR") {
            if !data_dir.is_empty() {
                self.data_dir = PathBuf::from(data_dir);
            }
        }
    }

    /// Persist to a JSON file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Directory holding installed plugin descriptors.
    pub fn plugins_dir(&self) -> PathBuf {
        self.data_dir.join("plugins")
    }

    /// Directory holding plugin-scoped storage namespaces.
    pub fn plugin_data_dir(&self) -> PathBuf {
        self.data_dir.join("plugin_data")
    }

    /// URL prefix the backend serves plugin files from.
    pub fn plugin_base_url(&self) -> String {
        format!("{}/plugins", self.base_url.trim_end_matches('/'))
    }
}
