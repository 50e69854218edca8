//! Upload-progress stream consumer.
//!
//! Document uploads stream NDJSON progress lines while the backend
//! chunks and embeds the file.

use serde::{Deserialize, Serialize};

use crate::stream::FrameSink;

/// Processing phase reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Chunking,
    Embedding,
    Done,
}

/// One line of the upload NDJSON stream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadFrame {
    pub status: Option<UploadStatus>,
    /// Percentage 0–100.
    pub progress: Option<u8>,
    pub current: Option<u64>,
    pub total: Option<u64>,
    /// Sent with the final frame.
    pub filename: Option<String>,
}

/// Mutable progress state an upload stream assembles into.
#[derive(Debug, Default)]
pub struct UploadProgress {
    pub phase: Option<UploadStatus>,
    pub progress: u8,
    pub current: u64,
    pub total: u64,
    pub filename: Option<String>,
    pub finished: bool,
    /// Set when `done` arrives: the caller should refresh its
    /// document listing.
    pub needs_refresh: bool,
}

impl UploadProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one progress frame.
    pub fn apply(&mut self, frame: UploadFrame) {
        if let Some(status) = frame.status {
            self.phase = Some(status);
            if status == UploadStatus::Done {
                self.finished = true;
                self.needs_refresh = true;
                self.progress = 100;
            }
        }
        if let Some(progress) = frame.progress {
            self.progress = progress.min(100);
        }
        if let Some(current) = frame.current {
            self.current = current;
        }
        if let Some(total) = frame.total {
            self.total = total;
        }
        if let Some(filename) = frame.filename {
            self.filename = Some(filename);
        }
    }
}

impl FrameSink for UploadProgress {
    fn apply_frame(&mut self, frame: serde_json::Value) {
        match serde_json::from_value::<UploadFrame>(frame) {
            Ok(parsed) => self.apply(parsed),
            Err(e) => {
                tracing::warn!(error = %e, "dropping upload frame with unexpected shape");
            }
        }
    }
}
