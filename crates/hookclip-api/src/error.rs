//! API error types.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hookclip_storage::{StorageError, TokenError};
use hookclip_worker::WorkerError;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Gone: {0}")]
    Gone(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// `total` is the file size reported in `Content-Range: bytes */total`
    #[error("Range not satisfiable")]
    RangeNotSatisfiable { total: Option<u64> },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Gone(_) => StatusCode::GONE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<WorkerError> for ApiError {
    fn from(e: WorkerError) -> Self {
        match e {
            WorkerError::Input(e) => ApiError::BadRequest(e.to_string()),
            WorkerError::NotFound(id) => ApiError::NotFound(format!("Job {} not found", id)),
            e @ WorkerError::InvalidState { .. } => ApiError::Conflict(e.to_string()),
            WorkerError::NotConfigured(msg) => ApiError::BadRequest(format!("Uploader not configured: {}", msg)),
            WorkerError::Storage(e) => e.into(),
            // Subprocess stderr stays in the logs
            e => ApiError::Internal(e.user_message()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Token(TokenError::Expired) => ApiError::Gone("Link expired".to_string()),
            StorageError::Token(TokenError::Forbidden) => {
                ApiError::Forbidden("Token does not grant access to this clip".to_string())
            }
            StorageError::Token(e) => ApiError::Unauthorized(format!("Invalid token: {}", e)),
            StorageError::NotFound(_) => ApiError::NotFound("Clip not found".to_string()),
            StorageError::InvalidKey(key) => ApiError::BadRequest(format!("Invalid file name: {}", key)),
            StorageError::InvalidRange(_) => ApiError::RangeNotSatisfiable { total: None },
            e => ApiError::Internal(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = match &self {
            ApiError::Internal(_) if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" => {
                "An internal error occurred".to_string()
            }
            ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Gone(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::Internal(msg) => msg.clone(),
            ApiError::RangeNotSatisfiable { .. } => self.to_string(),
        };

        let mut response = (status, Json(ErrorResponse { detail })).into_response();
        if let ApiError::RangeNotSatisfiable { total: Some(total) } = self {
            if let Ok(value) = format!("bytes */{}", total).parse() {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookclip_models::{JobId, Stage, ValidationError};

    fn status(e: impl Into<ApiError>) -> StatusCode {
        e.into().into_response().status()
    }

    #[test]
    fn test_worker_errors_map_to_status() {
        assert_eq!(status(WorkerError::Input(ValidationError::MissingSource)), StatusCode::BAD_REQUEST);
        assert_eq!(status(WorkerError::NotFound(JobId::from_string("x"))), StatusCode::NOT_FOUND);
        assert_eq!(
            status(WorkerError::invalid_state(Stage::Queued, "only failed jobs can be retried")),
            StatusCode::CONFLICT
        );
        assert_eq!(status(WorkerError::NotConfigured("none".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(WorkerError::config_error("boom")), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_token_errors_map_to_status() {
        assert_eq!(status(StorageError::Token(TokenError::Malformed)), StatusCode::UNAUTHORIZED);
        assert_eq!(status(StorageError::Token(TokenError::BadSignature)), StatusCode::UNAUTHORIZED);
        assert_eq!(status(StorageError::Token(TokenError::Forbidden)), StatusCode::FORBIDDEN);
        assert_eq!(status(StorageError::Token(TokenError::Expired)), StatusCode::GONE);
    }

    #[test]
    fn test_range_error_reports_size() {
        let response = ApiError::RangeNotSatisfiable { total: Some(10) }.into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */10");
    }
}
