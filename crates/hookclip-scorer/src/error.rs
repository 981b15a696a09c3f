//! Error types for the scoring client.

use thiserror::Error;

/// Result type for scoring operations.
pub type ScorerResult<T> = Result<T, ScorerError>;

/// Errors from the LLM scoring client.
#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{provider} API returned {status}: {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Unexpected response shape: {0}")]
    Response(String),

    #[error("Could not parse scores: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScorerError {
    pub fn response(msg: impl Into<String>) -> Self {
        Self::Response(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
