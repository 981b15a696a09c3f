//! Worker error types.

use hookclip_models::{JobId, Stage, ValidationError};
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Rejected before enqueue; never retried
    #[error("{0}")]
    Input(#[from] ValidationError),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job is {stage}: {message}")]
    InvalidState { stage: Stage, message: String },

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] hookclip_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] hookclip_queue::QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] hookclip_storage::StorageError),

    #[error("Publish error: {0}")]
    Publish(#[from] hookclip_publish::PublishError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn invalid_state(stage: Stage, message: impl Into<String>) -> Self {
        Self::InvalidState {
            stage,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            WorkerError::Cancelled => true,
            WorkerError::Media(e) => e.is_cancelled(),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, WorkerError::Media(e) if e.is_timeout())
    }

    /// Whether a failed attempt should be redelivered as a new attempt.
    pub fn is_retryable(&self) -> bool {
        if self.is_cancelled() {
            return false;
        }
        !matches!(
            self,
            WorkerError::Input(_)
                | WorkerError::NotFound(_)
                | WorkerError::InvalidState { .. }
                | WorkerError::NotConfigured(_)
                | WorkerError::ConfigError(_)
        )
    }

    /// Short cause shown to callers. Tool stderr stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            e if e.is_cancelled() => "Cancelled by user".to_string(),
            e => e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookclip_media::MediaError;

    #[test]
    fn test_retry_classification() {
        assert!(WorkerError::Media(MediaError::tool_failed("ffmpeg", "exit 1", None, Some(1))).is_retryable());
        assert!(WorkerError::Media(MediaError::Timeout { tool: "yt-dlp".into(), secs: 600 }).is_retryable());
        assert!(!WorkerError::Media(MediaError::Cancelled).is_retryable());
        assert!(!WorkerError::Cancelled.is_retryable());
        assert!(!WorkerError::Input(ValidationError::MissingSource).is_retryable());
    }

    #[test]
    fn test_timeout_detected() {
        let err = WorkerError::Media(MediaError::Timeout { tool: "ffmpeg".into(), secs: 600 });
        assert!(err.is_timeout());
        assert!(!WorkerError::Cancelled.is_timeout());
    }

    #[test]
    fn test_user_message_hides_stderr() {
        let err = WorkerError::Media(MediaError::tool_failed(
            "ffmpeg",
            "exited with code 1",
            Some("long stderr dump".into()),
            Some(1),
        ));
        assert!(!err.user_message().contains("stderr dump"));
        assert_eq!(WorkerError::Cancelled.user_message(), "Cancelled by user");
    }
}
