//! Job orchestration: submission, status, cancellation, retry and admin queries.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use hookclip_media::{probe_video, MediaError};
use hookclip_models::{
    BatchRequest, Job, JobId, JobRequest, ProgressEvent, SourceMeta, SourceRef, Stage,
    ValidationError,
};
use hookclip_publish::{AccountStats, OAuthTokens};
use hookclip_queue::JobMessage;
use hookclip_storage::dir_size;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::{publish_clips, UploadResult};

/// Largest page `list_jobs` returns.
pub const MAX_PAGE_SIZE: usize = 100;

const CANCELLED_MESSAGE: &str = "Cancelled by user";

/// Outcome of a batch submission.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub queued: Vec<Job>,
    pub errors: Vec<BatchItemError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItemError {
    pub url: String,
    pub error: String,
}

/// One page of jobs, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

/// Aggregate job and disk statistics.
#[derive(Debug, Clone, Serialize)]
pub struct JobStats {
    pub by_stage: BTreeMap<String, usize>,
    pub total: usize,
    pub created_today: usize,
    /// Mean wall-clock time of completed jobs
    pub avg_processing_secs: Option<f64>,
    pub download_bytes: u64,
    pub output_bytes: u64,
}

/// Front door of the pipeline. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    ctx: Arc<WorkerContext>,
}

impl Orchestrator {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<WorkerContext> {
        &self.ctx
    }

    /// Validate, resolve source metadata and queue a job.
    pub async fn submit(&self, request: JobRequest) -> WorkerResult<Job> {
        let mut spec = self.ctx.config.limits.resolve(&request)?;
        let meta = self.resolve_source(&spec.source).await?;
        spec.fit_to_duration(meta.duration)?;

        let job = Job::new(spec, meta);
        self.ctx.store.put(&job).await?;
        self.ctx.progress.open(&job.id);
        self.ctx
            .queue
            .enqueue(&JobMessage::new(job.id.clone(), job.attempt))
            .await?;

        info!(
            "Queued job {} for '{}' ({} clip(s) of {}s, {} detection)",
            job.id,
            job.source.title,
            job.spec.clip_count,
            job.spec.clip_duration,
            job.spec.detection_mode.as_str()
        );
        Ok(job)
    }

    /// Submit several sources sharing one option set. Per-item failures are reported.
    pub async fn submit_batch(&self, batch: BatchRequest) -> WorkerResult<BatchOutcome> {
        batch.validate()?;

        let mut outcome = BatchOutcome {
            queued: Vec::new(),
            errors: Vec::new(),
        };
        for request in batch.into_requests() {
            let url = request.url.clone().unwrap_or_default();
            match self.submit(request).await {
                Ok(job) => outcome.queued.push(job),
                Err(e) => {
                    warn!("Batch item {} rejected: {}", url, e);
                    outcome.errors.push(BatchItemError {
                        url,
                        error: e.user_message(),
                    });
                }
            }
        }
        Ok(outcome)
    }

    async fn resolve_source(&self, source: &SourceRef) -> WorkerResult<SourceMeta> {
        match source {
            SourceRef::Url { url } => {
                let timeout = self.ctx.config.info_timeout;
                let info = match tokio::time::timeout(timeout, self.ctx.downloader.info(url)).await {
                    Ok(Ok(info)) => info,
                    Ok(Err(e)) => {
                        return Err(ValidationError::InvalidUrl(format!(
                            "could not read video metadata: {}",
                            e
                        ))
                        .into())
                    }
                    Err(_) => {
                        return Err(MediaError::Timeout {
                            tool: "yt-dlp".to_string(),
                            secs: timeout.as_secs(),
                        }
                        .into())
                    }
                };
                Ok(SourceMeta {
                    video_id: Some(info.id),
                    title: info.title,
                    duration: info.duration,
                    thumbnail: info.thumbnail,
                })
            }
            SourceRef::File { path } => {
                let info = probe_video(path).await?;
                let title = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "Uploaded video".to_string());
                Ok(SourceMeta {
                    video_id: None,
                    title,
                    duration: info.duration,
                    thumbnail: None,
                })
            }
        }
    }

    async fn load(&self, job_id: &JobId) -> WorkerResult<Job> {
        self.ctx
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| WorkerError::NotFound(job_id.clone()))
    }

    pub async fn get_status(&self, job_id: &JobId) -> WorkerResult<Job> {
        self.load(job_id).await
    }

    /// Queue a failed job again as a new attempt.
    pub async fn retry(&self, job_id: &JobId) -> WorkerResult<Job> {
        let mut job = self.load(job_id).await?;
        if job.stage != Stage::Failed {
            return Err(WorkerError::invalid_state(
                job.stage,
                "only failed jobs can be retried",
            ));
        }

        job.begin_attempt(job.attempt + 1);
        self.requeue(&job).await?;
        info!("Retrying job {} as attempt {}", job.id, job.attempt);
        Ok(job)
    }

    async fn requeue(&self, job: &Job) -> WorkerResult<()> {
        self.ctx.store.put(job).await?;
        self.ctx.progress.open(&job.id);
        self.ctx
            .queue
            .enqueue(&JobMessage::new(job.id.clone(), job.attempt))
            .await?;
        Ok(())
    }

    /// Cancel a queued or running job.
    pub async fn cancel(&self, job_id: &JobId) -> WorkerResult<Job> {
        let mut job = self.load(job_id).await?;
        if job.is_terminal() {
            return Err(WorkerError::invalid_state(job.stage, "job already finished"));
        }

        // Recorded beside the job so no worker write can clear it
        self.ctx.store.request_cancel(job_id, job.attempt).await?;
        job.cancel_requested = true;

        let signalled = self.ctx.cancels.cancel(job_id);
        if signalled || job.stage != Stage::Queued {
            // The worker running it fails the job at its next checkpoint
            info!("Cancellation requested for running job {}", job_id);
            return Ok(job);
        }

        // A worker may have picked the job up since it was loaded
        let attempt = job.attempt;
        job = self.load(job_id).await?;
        if job.stage != Stage::Queued || job.attempt != attempt {
            info!("Cancellation requested for job {} picked up meanwhile", job_id);
            return Ok(job);
        }

        job.fail(CANCELLED_MESSAGE);
        self.ctx.store.put(&job).await?;
        self.ctx.progress.publish(ProgressEvent::error(
            &job.id,
            job.last_stage,
            CANCELLED_MESSAGE,
        ));
        self.ctx.progress.close_after_grace(&job.id);
        info!("Cancelled queued job {}", job_id);
        Ok(job)
    }

    /// Upload the clips of a finished job.
    pub async fn publish(&self, job_id: &JobId) -> WorkerResult<Vec<UploadResult>> {
        let mut job = self.load(job_id).await?;
        if !matches!(job.stage, Stage::Ready | Stage::Completed) {
            return Err(WorkerError::invalid_state(
                job.stage,
                "only ready or completed jobs can be published",
            ));
        }
        if !self.ctx.uploader.is_configured() {
            return Err(WorkerError::NotConfigured(
                "no YouTube accounts are linked".to_string(),
            ));
        }
        if job.clips.iter().any(|c| c.expired) {
            return Err(WorkerError::invalid_state(job.stage, "clips have expired"));
        }

        let previous = job.stage;
        let finished_at = job.finished_at;
        job.advance(Stage::Uploading, job.progress);
        self.ctx.store.put(&job).await?;
        self.ctx
            .progress
            .publish(ProgressEvent::stage(&job.id, job.stage, job.progress));

        match publish_clips(&self.ctx, &mut job).await {
            Ok(results) => {
                job.complete();
                if previous == Stage::Completed {
                    job.finished_at = finished_at;
                }
                self.ctx.store.put(&job).await?;
                let uploaded = results.iter().filter(|r| !r.skipped && r.url.is_some()).count();
                info!("Published {} clip(s) of job {}", uploaded, job.id);
                Ok(results)
            }
            Err(e) => {
                job.stage = previous;
                job.finished_at = finished_at;
                self.ctx.store.put(&job).await?;
                Err(e)
            }
        }
    }

    /// Live progress of a job; `None` once its channel has been purged.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> WorkerResult<Option<broadcast::Receiver<ProgressEvent>>> {
        self.load(job_id).await?;
        Ok(self.ctx.progress.subscribe(job_id))
    }

    /// Fail and re-queue jobs that made no progress for `timeout_minutes`.
    ///
    /// Jobs running in this process are left alone; their subprocess timeouts
    /// bound how long they can stall.
    pub async fn retry_stuck_jobs(&self, timeout_minutes: i64) -> WorkerResult<Vec<JobId>> {
        let cutoff = Utc::now() - chrono::Duration::minutes(timeout_minutes.max(1));
        let mut retried = Vec::new();

        for mut job in self.ctx.store.list().await? {
            if job.is_terminal() || job.stage == Stage::Queued || job.updated_at >= cutoff {
                continue;
            }
            if self.ctx.cancels.is_running(&job.id) {
                continue;
            }

            warn!(
                "Job {} stuck in {} since {}, retrying",
                job.id, job.stage, job.updated_at
            );
            job.fail(format!("No progress for {} minutes", timeout_minutes));
            job.begin_attempt(job.attempt + 1);
            self.requeue(&job).await?;
            retried.push(job.id);
        }
        Ok(retried)
    }

    /// Jobs newest first, optionally filtered by stage. Pages are 1-based.
    pub async fn list_jobs(&self, stage: Option<Stage>, page: usize, limit: usize) -> WorkerResult<JobPage> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let jobs = match stage {
            Some(stage) => self.ctx.store.list_by_stage(stage).await?,
            None => self.ctx.store.list().await?,
        };
        let total = jobs.len();
        let jobs = jobs.into_iter().skip((page - 1) * limit).take(limit).collect();
        Ok(JobPage {
            jobs,
            total,
            page,
            limit,
        })
    }

    pub async fn stats(&self) -> WorkerResult<JobStats> {
        let jobs = self.ctx.store.list().await?;
        let today = Utc::now().date_naive();

        let mut by_stage: BTreeMap<String, usize> = Stage::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        for job in &jobs {
            *by_stage.entry(job.stage.as_str().to_string()).or_default() += 1;
        }

        let durations: Vec<f64> = jobs
            .iter()
            .filter(|j| j.stage == Stage::Completed)
            .filter_map(|j| j.processing_secs())
            .collect();
        let avg_processing_secs = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<f64>() / durations.len() as f64)
        };

        Ok(JobStats {
            by_stage,
            total: jobs.len(),
            created_today: jobs
                .iter()
                .filter(|j| j.created_at.date_naive() == today)
                .count(),
            avg_processing_secs,
            download_bytes: dir_size(&self.ctx.layout.download_dir).await?,
            output_bytes: dir_size(&self.ctx.layout.output_dir).await?,
        })
    }

    pub fn upload_configured(&self) -> bool {
        self.ctx.uploader.is_configured()
    }

    /// Consent URL for linking another upload account.
    pub fn auth_url(&self) -> String {
        self.ctx.uploader.auth_url()
    }

    pub async fn exchange_code(&self, code: &str) -> WorkerResult<OAuthTokens> {
        Ok(self.ctx.uploader.exchange_code(code).await?)
    }

    pub fn upload_stats(&self) -> Vec<AccountStats> {
        self.ctx.uploader.stats()
    }
}
