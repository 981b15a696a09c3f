//! Publishing and upload account linking.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use hookclip_models::{ClipStatus, JobId};
use hookclip_publish::AccountStats;
use hookclip_worker::UploadResult;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub job_id: JobId,
    pub uploaded: usize,
    pub failed: usize,
    pub results: Vec<UploadResult>,
}

/// Upload a finished job's clips.
pub async fn publish_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<PublishResponse>> {
    let job_id = JobId::from_string(job_id);
    let results = state.orchestrator.publish(&job_id).await?;

    let uploaded = results
        .iter()
        .filter(|r| !r.skipped && r.status == ClipStatus::Uploaded)
        .count();
    let failed = results.iter().filter(|r| r.status == ClipStatus::Failed).count();
    Ok(Json(PublishResponse {
        job_id,
        uploaded,
        failed,
        results,
    }))
}

#[derive(Debug, Serialize)]
pub struct AccountsResponse {
    pub configured: bool,
    pub accounts: Vec<AccountStats>,
}

pub async fn list_accounts(State(state): State<AppState>) -> Json<AccountsResponse> {
    Json(AccountsResponse {
        configured: state.orchestrator.upload_configured(),
        accounts: state.orchestrator.upload_stats(),
    })
}

#[derive(Debug, Serialize)]
pub struct AuthUrlResponse {
    pub url: String,
}

/// Consent URL for linking another account.
pub async fn oauth_url(State(state): State<AppState>) -> Json<AuthUrlResponse> {
    Json(AuthUrlResponse {
        url: state.orchestrator.auth_url(),
    })
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OAuthCallbackResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub message: String,
}

/// Exchange the consent code. The refresh token goes into `YOUTUBE_REFRESH_TOKENS`.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> ApiResult<Json<OAuthCallbackResponse>> {
    if let Some(error) = query.error {
        return Err(ApiError::bad_request(format!("Authorization denied: {}", error)));
    }
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing authorization code"))?;

    let tokens = state.orchestrator.exchange_code(&code).await?;
    let message = if tokens.refresh_token.is_some() {
        info!("Linked a new upload account");
        "Add the refresh token to YOUTUBE_REFRESH_TOKENS and restart".to_string()
    } else {
        "No refresh token returned; revoke access and link the account again".to_string()
    };

    Ok(Json(OAuthCallbackResponse {
        refresh_token: tokens.refresh_token,
        scope: tokens.scope,
        expires_at: tokens.expires_at,
        message,
    }))
}
