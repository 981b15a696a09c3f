//! Clip delivery.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use hookclip_models::JobId;
use hookclip_storage::{open_file, StorageError};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ClipQuery {
    pub token: Option<String>,
}

fn content_type(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    if lower.ends_with(".mp4") {
        "video/mp4"
    } else if lower.ends_with(".ass") {
        "text/x-ssa"
    } else {
        "application/octet-stream"
    }
}

/// Serve a rendered clip, honoring `Range`.
pub async fn download_clip(
    State(state): State<AppState>,
    Path((job_id, filename)): Path<(String, String)>,
    Query(query): Query<ClipQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Missing delivery token"))?;
    let job_id = JobId::from_string(job_id);
    let path = state.layout().resolve_output_file(&job_id, &filename)?;

    let job = state.orchestrator.get_status(&job_id).await?;
    state
        .signer
        .check(&token, &job_id, &filename, job.spec.owner.as_deref())?;

    let clip = job
        .clips
        .iter()
        .find(|c| c.filename == filename)
        .ok_or_else(|| ApiError::not_found("Clip not found"))?;
    if clip.expired {
        return Err(ApiError::Gone("Clip has expired".to_string()));
    }

    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let file = match open_file(&path, range_header).await {
        Ok(file) => file,
        Err(StorageError::InvalidRange(_)) => {
            let total = tokio::fs::metadata(&path).await.ok().map(|m| m.len());
            return Err(ApiError::RangeNotSatisfiable { total });
        }
        Err(e) => return Err(e.into()),
    };

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, content_type(&filename))
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .header(header::CONTENT_LENGTH, file.len);

    builder = match file.range {
        Some(range) => builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_RANGE, range.content_range(file.total)),
        None => builder.status(StatusCode::OK),
    };

    metrics::record_clip_download(file.range.is_some(), file.len);

    // Streamed in chunks; the clip is never held in memory whole
    builder
        .body(Body::from_stream(ReaderStream::new(file.reader)))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}
