//! Error types for media tool adapters.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors raised by the external tool adapters.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    #[error("{tool} failed: {message}")]
    ToolFailed {
        tool: String,
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Download failed: {message}")]
    DownloadFailed { message: String },

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Face detection failed: {0}")]
    DetectionFailed(String),

    #[error("Malformed {tool} output: {message}")]
    MalformedOutput { tool: String, message: String },

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{tool} timed out after {secs} seconds")]
    Timeout { tool: String, secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a tool failure error.
    pub fn tool_failed(
        tool: impl Into<String>,
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a download failure error.
    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    pub fn malformed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedOutput {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Captured stderr of a failed tool, for logs only.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::ToolFailed { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }
}
