//! Admin handlers.

use axum::extract::{Query, State};
use axum::Json;
use hookclip_models::{JobId, Stage};
use hookclip_worker::{JobPage, JobStats};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub jobs: JobStats,
    pub queue_length: u64,
}

pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let jobs = state.orchestrator.stats().await?;
    let queue_length = state
        .orchestrator
        .context()
        .queue
        .len()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    metrics::set_queue_length(queue_length);

    Ok(Json(StatsResponse { jobs, queue_length }))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub stage: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<JobPage>> {
    let stage = match query.stage.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<Stage>().map_err(ApiError::bad_request)?),
        None => None,
    };
    let page = state
        .orchestrator
        .list_jobs(stage, query.page.unwrap_or(1), query.limit.unwrap_or(20))
        .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct RetryStuckQuery {
    pub timeout_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RetryStuckResponse {
    pub retried: Vec<JobId>,
    pub count: usize,
}

pub async fn retry_stuck(
    State(state): State<AppState>,
    Query(query): Query<RetryStuckQuery>,
) -> ApiResult<Json<RetryStuckResponse>> {
    let timeout = query
        .timeout_minutes
        .unwrap_or(state.config.stuck_timeout_minutes);
    if timeout < 1 {
        return Err(ApiError::bad_request("timeout_minutes must be at least 1"));
    }

    let retried = state.orchestrator.retry_stuck_jobs(timeout).await?;
    if !retried.is_empty() {
        info!("Re-queued {} stuck job(s)", retried.len());
    }
    Ok(Json(RetryStuckResponse {
        count: retried.len(),
        retried,
    }))
}
