//! Health check handlers.

use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use hookclip_media::tool_version;
use serde::Serialize;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct ToolsResponse {
    pub status: String,
    pub ffmpeg: ToolStatus,
    pub yt_dlp: ToolStatus,
}

#[derive(Serialize)]
pub struct ToolStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolStatus {
    async fn probe(program: &str, version_flag: &str) -> Self {
        match tool_version(program, version_flag).await {
            Ok(version) => Self {
                status: "ok".to_string(),
                version: Some(version),
                error: None,
            },
            Err(e) => Self {
                status: "error".to_string(),
                version: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Versions of the external tools the pipeline shells out to.
pub async fn tools() -> (StatusCode, Json<ToolsResponse>) {
    let (ffmpeg, yt_dlp) = tokio::join!(
        ToolStatus::probe("ffmpeg", "-version"),
        ToolStatus::probe("yt-dlp", "--version")
    );

    let healthy = ffmpeg.is_ok() && yt_dlp.is_ok();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ToolsResponse {
            status: if healthy { "healthy" } else { "degraded" }.to_string(),
            ffmpeg,
            yt_dlp,
        }),
    )
}
