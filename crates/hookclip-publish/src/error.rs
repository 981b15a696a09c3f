//! Publishing errors.

use thiserror::Error;

pub type PublishResult<T> = Result<T, PublishError>;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("YouTube upload not configured. Set YOUTUBE_REFRESH_TOKENS")]
    NotConfigured,

    #[error("Authorization failed: {0}")]
    Auth(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("All {attempts} accounts failed or exceeded quota: {last_error}")]
    Exhausted { attempts: usize, last_error: String },

    #[error("HTTP error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PublishError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }
}
