//! Job submission, status, control and live progress.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use hookclip_models::{BatchRequest, ClipStatus, Job, JobId, JobRequest, ProgressEvent, Stage};
use hookclip_storage::DeliverySigner;
use hookclip_worker::BatchItemError;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::error::ApiResult;
use crate::metrics;
use crate::state::AppState;

/// One clip as seen by callers.
#[derive(Debug, Serialize)]
pub struct ClipView {
    pub index: u32,
    pub filename: String,
    pub start: f64,
    pub duration: f64,
    pub score: f64,
    pub has_captions: bool,
    pub cropped: bool,
    pub upload_status: ClipStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Signed link; absent once the clip has expired
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    pub expired: bool,
}

/// Job status response.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub stage: Stage,
    pub last_stage: Stage,
    pub progress: u8,
    pub attempt: u32,
    pub title: String,
    pub source_duration: f64,
    pub clip_count: u32,
    pub clips: Vec<ClipView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobStatusResponse {
    pub fn from_job(job: &Job, signer: &DeliverySigner) -> ApiResult<Self> {
        let owner = job.spec.owner.as_deref();
        let clips = job
            .clips
            .iter()
            .map(|clip| {
                let download_url = if clip.expired {
                    None
                } else {
                    Some(signer.clip_url(&job.id, &clip.filename, owner)?)
                };
                Ok(ClipView {
                    index: clip.index,
                    filename: clip.filename.clone(),
                    start: clip.start,
                    duration: clip.duration,
                    score: clip.score,
                    has_captions: clip.has_captions,
                    cropped: clip.cropped,
                    upload_status: clip.upload_status,
                    url: clip.url.clone(),
                    download_url,
                    expired: clip.expired,
                })
            })
            .collect::<ApiResult<Vec<_>>>()?;

        Ok(Self {
            job_id: job.id.clone(),
            stage: job.stage,
            last_stage: job.last_stage,
            progress: job.progress,
            attempt: job.attempt,
            title: job.source.title.clone(),
            source_duration: job.source.duration,
            clip_count: job.spec.clip_count,
            clips,
            error: job.error.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            finished_at: job.finished_at,
        })
    }
}

/// Submit a job.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<JobRequest>,
) -> ApiResult<(StatusCode, Json<JobStatusResponse>)> {
    let job = state.orchestrator.submit(request).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(JobStatusResponse::from_job(&job, &state.signer)?),
    ))
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub queued: Vec<JobId>,
    pub errors: Vec<BatchItemError>,
}

/// Submit up to `MAX_BATCH_SIZE` URLs sharing one option set.
pub async fn submit_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> ApiResult<(StatusCode, Json<BatchResponse>)> {
    let outcome = state.orchestrator.submit_batch(request).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(BatchResponse {
            queued: outcome.queued.into_iter().map(|j| j.id).collect(),
            errors: outcome.errors,
        }),
    ))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = state.orchestrator.get_status(&JobId::from_string(job_id)).await?;
    Ok(Json(JobStatusResponse::from_job(&job, &state.signer)?))
}

pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = state.orchestrator.retry(&JobId::from_string(job_id)).await?;
    Ok(Json(JobStatusResponse::from_job(&job, &state.signer)?))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = state.orchestrator.cancel(&JobId::from_string(job_id)).await?;
    Ok(Json(JobStatusResponse::from_job(&job, &state.signer)?))
}

type EventStream = BoxStream<'static, Result<Event, axum::Error>>;

/// Server-sent progress events.
///
/// The first event is a `status` snapshot. Live events follow until the job
/// reaches a terminal state or its channel is purged.
pub async fn job_events(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Sse<EventStream>> {
    let job_id = JobId::from_string(job_id);
    // Subscribe before the snapshot so no event falls in between
    let receiver = state.orchestrator.subscribe(&job_id).await?;
    let job = state.orchestrator.get_status(&job_id).await?;

    let snapshot = Event::default()
        .event("status")
        .json_data(JobStatusResponse::from_job(&job, &state.signer)?);
    let head = stream::once(async move { snapshot });

    let stream: EventStream = match receiver {
        Some(rx) if !job.is_terminal() => head.chain(live_events(rx)).boxed(),
        _ => head.boxed(),
    };
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// SSE event name of a progress event.
pub fn event_name(event: &ProgressEvent) -> &'static str {
    match event {
        ProgressEvent::Stage { .. } => "stage",
        ProgressEvent::Log { .. } => "log",
        ProgressEvent::ClipReady { .. } => "clip_ready",
        ProgressEvent::ClipUploaded { .. } => "clip_uploaded",
        ProgressEvent::Done { .. } => "done",
        ProgressEvent::Error { .. } => "error",
    }
}

struct StreamGauge;

impl StreamGauge {
    fn open() -> Self {
        metrics::sse_stream_opened();
        Self
    }
}

impl Drop for StreamGauge {
    fn drop(&mut self) {
        metrics::sse_stream_closed();
    }
}

fn live_events(
    rx: broadcast::Receiver<ProgressEvent>,
) -> impl Stream<Item = Result<Event, axum::Error>> + Send + 'static {
    stream::unfold(Some((rx, StreamGauge::open())), |state| async move {
        let (mut rx, gauge) = state?;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let terminal = matches!(event, ProgressEvent::Done { .. } | ProgressEvent::Error { .. });
                    let item = Event::default().event(event_name(&event)).json_data(&event);
                    let next = if terminal { None } else { Some((rx, gauge)) };
                    return Some((item, next));
                }
                // Slow reader: skip what was dropped
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Progress stream lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}
