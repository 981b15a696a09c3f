//! The per-job stage machine.
//!
//! A delivered job runs linearly through
//! `downloading → transcribing? → analyzing → face_tracking? → subtitling? →
//! clipping → ready → uploading? → completed`. Each stage is persisted before
//! its work starts so status queries see it immediately. Any error fails the
//! attempt; redelivery is the executor's business.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use hookclip_media::{
    compute_crop, generate_ass, write_track, AssStyle, CropRect, MediaError, TranscribeOptions,
};
use hookclip_models::{
    Clip, ClipStatus, HookWindow, Job, JobId, PlatformSettings, ProgressEvent, SourceRef, Stage,
    Transcript,
};
use hookclip_publish::{ClipMetadata, PublishError};
use hookclip_queue::JobMessage;
use hookclip_storage::{delete_file, schedule_delete};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn, Instrument};

use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::hooks::DetectRequest;
use crate::logging::JobLogger;
use crate::metrics;
use crate::render::RenderRequest;

/// Progress when clipping starts, and the share spread over the clips.
const CLIPPING_BASE: u8 = 50;
const CLIPPING_SHARE: u8 = 30;
/// Progress range covered by uploads.
const UPLOAD_BASE: u8 = 80;
const UPLOAD_SHARE: u8 = 15;

/// What happened to a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { clip_count: usize },
    /// The delivery did not match the job's current attempt
    Skipped { reason: String },
}

/// Result of publishing one clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    pub index: u32,
    pub status: ClipStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Already uploaded before this run
    #[serde(default)]
    pub skipped: bool,
}

enum Admission {
    Run,
    NewAttempt,
    Skip(String),
}

/// Decide whether a delivery runs against the stored job.
///
/// A delivery runs its own attempt while the job is queued, or a redelivered
/// attempt left mid-flight by a dead worker. A delivery for the next attempt
/// of a failed job starts that attempt. Anything else is stale.
fn admit(job: &Job, message: &JobMessage, reclaimed: bool) -> Admission {
    if message.attempt == job.attempt {
        if job.stage == Stage::Queued || (reclaimed && !job.is_terminal()) {
            return Admission::Run;
        }
        return Admission::Skip(format!("attempt {} is already {}", job.attempt, job.stage));
    }
    if message.attempt == job.attempt + 1 && job.stage == Stage::Failed {
        return Admission::NewAttempt;
    }
    Admission::Skip(format!(
        "delivery is for attempt {}, job is on attempt {}",
        message.attempt, job.attempt
    ))
}

/// Run one delivery of a job.
///
/// On failure the job is persisted as `failed` before the error is returned.
pub async fn run_job(
    ctx: &WorkerContext,
    message: &JobMessage,
    reclaimed: bool,
    cancel: watch::Receiver<bool>,
) -> WorkerResult<RunOutcome> {
    let Some(mut job) = ctx.store.get(&message.job_id).await? else {
        return Ok(RunOutcome::Skipped {
            reason: format!("job {} no longer exists", message.job_id),
        });
    };

    match admit(&job, message, reclaimed) {
        Admission::Run => {}
        Admission::NewAttempt => job.begin_attempt(message.attempt),
        Admission::Skip(reason) => {
            info!("Skipping delivery of job {}: {}", job.id, reason);
            return Ok(RunOutcome::Skipped { reason });
        }
    }

    let logger = JobLogger::new(&job.id, job.attempt);
    let span = logger.create_span();
    JobRun::new(ctx, job, logger, cancel)
        .run()
        .instrument(span)
        .await
}

struct JobRun<'a> {
    ctx: &'a WorkerContext,
    job: Job,
    logger: JobLogger,
    cancel: watch::Receiver<bool>,
    /// Remote source written by this attempt, removed when the attempt ends
    downloaded: Option<PathBuf>,
    stage_started: Instant,
}

impl<'a> JobRun<'a> {
    fn new(ctx: &'a WorkerContext, job: Job, logger: JobLogger, cancel: watch::Receiver<bool>) -> Self {
        Self {
            ctx,
            job,
            logger,
            cancel,
            downloaded: None,
            stage_started: Instant::now(),
        }
    }

    async fn run(mut self) -> WorkerResult<RunOutcome> {
        self.job.mark_started();
        self.job.clips.clear();
        self.persist().await?;
        self.logger.log_start(&self.job.source.title);
        metrics::record_job_started();

        match self.execute().await {
            Ok(()) => self.finish().await,
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn execute(&mut self) -> WorkerResult<()> {
        let spec = self.job.spec.clone();
        let target = spec.clip_duration as f64;
        let total = self.job.source.duration;
        let settings = PlatformSettings::for_platform(spec.platform);

        // Download
        self.enter(Stage::Downloading, 5).await?;
        let source = match &spec.source {
            SourceRef::Url { url } => {
                let dest = self.ctx.layout.source_path(&self.job.id);
                self.downloaded = Some(dest.clone());
                self.ctx
                    .downloader
                    .download(url, &dest, Some(self.cancel.clone()))
                    .await?
            }
            SourceRef::File { path } => {
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    return Err(MediaError::FileNotFound(path.clone()).into());
                }
                path.clone()
            }
        };
        self.set_progress(20).await?;

        // Transcribe once for detection and captions
        let mut transcript: Option<Transcript> = None;
        if spec.needs_transcript() {
            self.enter(Stage::Transcribing, 20).await?;
            match self.transcribe(&source).await {
                Ok(t) => {
                    self.logger.log_progress(&format!(
                        "Transcribed {} segment(s)",
                        t.segments.len()
                    ));
                    transcript = Some(t);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => self.warn(&format!("Transcription failed: {}", e.user_message())),
            }
            self.set_progress(30).await?;
        }

        // Detect hooks
        self.enter(Stage::Analyzing, 30).await?;
        let detection = self
            .ctx
            .detector
            .find(DetectRequest {
                source: &source,
                target_duration: target,
                count: spec.clip_count as usize,
                total_duration: total,
                mode: spec.detection_mode,
                transcript: transcript.as_ref(),
                title: &self.job.source.title,
                cancel: Some(self.cancel.clone()),
            })
            .await?;
        if let crate::hooks::Detection::Fallback { reason, .. } = &detection {
            self.warn(&format!("Hook detection fell back: {}", reason));
        }
        let windows: Vec<HookWindow> = detection
            .into_windows()
            .into_iter()
            .filter(|w| w.start >= 0.0 && w.end <= total)
            .take(spec.clip_count as usize)
            .collect();
        if windows.is_empty() {
            return Err(MediaError::detection_failed("no hook window fits inside the source").into());
        }
        self.logger
            .log_progress(&format!("Selected {} hook window(s)", windows.len()));
        self.set_progress(40).await?;

        // Face tracking
        let mut crop: Option<CropRect> = None;
        if spec.face_tracking {
            self.enter(Stage::FaceTracking, 40).await?;
            match self.ctx.faces.detect(&source, Some(self.cancel.clone())).await {
                Ok(detections) => {
                    crop = compute_crop(&detections, settings.aspect());
                    match crop {
                        Some(c) => self.logger.log_progress(&format!("Face crop {}", c.filter())),
                        None => self.warn("No faces detected, rendering without a crop"),
                    }
                }
                Err(e) if e.is_cancelled() => return Err(e.into()),
                Err(e) => self.warn(&format!("Face detection failed: {}", e)),
            }
            self.set_progress(45).await?;
        }

        // Captions
        let mut tracks: Vec<Option<PathBuf>> = vec![None; windows.len()];
        if spec.subtitles {
            self.enter(Stage::Subtitling, 45).await?;
            let transcript = match transcript.take() {
                Some(t) => t,
                None => self.transcribe(&source).await?,
            };
            tokio::fs::create_dir_all(self.ctx.layout.job_dir(&self.job.id)).await?;
            for (i, window) in windows.iter().enumerate() {
                let words = transcript.words_in_window(window.start, window.end);
                if words.is_empty() {
                    continue;
                }
                let track = generate_ass(&words, spec.subtitle_style, &AssStyle::default());
                let path = self.ctx.layout.subtitle_path(&self.job.id, i as u32 + 1);
                write_track(&path, &track).await?;
                tracks[i] = Some(path);
            }
            self.set_progress(50).await?;
        }

        // Render
        self.enter(Stage::Clipping, CLIPPING_BASE).await?;
        let count = windows.len();
        for (i, window) in windows.iter().enumerate() {
            self.check_cancelled().await?;
            let index = i as u32 + 1;
            let output = self.ctx.layout.clip_path(&self.job.id, index);
            let request = RenderRequest {
                source: &source,
                output: &output,
                window: *window,
                settings: settings.clone(),
                crop,
                subtitles: tracks[i].as_deref(),
            };

            let before = clipping_progress(i, count);
            let after = clipping_progress(i + 1, count);
            let hub = self.ctx.progress.clone();
            let job_id = self.job.id.clone();
            let on_progress = Box::new(move |fraction: f64| {
                let p = before as f64 + (after - before) as f64 * fraction.clamp(0.0, 1.0);
                hub.publish(ProgressEvent::stage(&job_id, Stage::Clipping, p.floor() as u8));
            });

            self.ctx
                .renderer
                .render(&request, Some(self.cancel.clone()), on_progress)
                .await?;

            let mut clip = Clip::new(&self.job.id, index, window);
            clip.has_captions = tracks[i].is_some();
            clip.cropped = crop.is_some();
            self.job.clips.push(clip.clone());
            self.set_progress(after).await?;
            self.ctx.progress.publish(ProgressEvent::ClipReady {
                job_id: self.job.id.clone(),
                clip,
            });
        }

        self.enter(Stage::Ready, UPLOAD_BASE).await?;
        if let Some(path) = self.downloaded.take() {
            delete_file(&path).await;
        }

        // Optional publishing
        if spec.auto_publish {
            if self.ctx.uploader.is_configured() {
                self.enter(Stage::Uploading, UPLOAD_BASE).await?;
                publish_clips(self.ctx, &mut self.job).await?;
            } else {
                self.warn("Auto-publish requested but no upload account is configured");
            }
        }
        Ok(())
    }

    async fn transcribe(&self, source: &std::path::Path) -> WorkerResult<Transcript> {
        let options = TranscribeOptions {
            language: None,
            word_timestamps: true,
        };
        Ok(self
            .ctx
            .transcriber
            .transcribe(source, &options, Some(self.cancel.clone()))
            .await?)
    }

    /// Persist and announce a new stage.
    async fn enter(&mut self, stage: Stage, progress: u8) -> WorkerResult<()> {
        self.check_cancelled().await?;
        self.close_stage();
        self.job.advance(stage, progress);
        self.logger.set_stage(stage);
        self.persist().await?;
        self.ctx
            .progress
            .publish(ProgressEvent::stage(&self.job.id, stage, self.job.progress));
        Ok(())
    }

    async fn set_progress(&mut self, progress: u8) -> WorkerResult<()> {
        self.job.set_progress(progress);
        self.persist().await?;
        self.ctx.progress.publish(ProgressEvent::stage(
            &self.job.id,
            self.job.stage,
            self.job.progress,
        ));
        Ok(())
    }

    /// Record how long the stage being left took.
    fn close_stage(&mut self) {
        let stage = self.job.stage;
        if stage.is_active() {
            metrics::record_stage_duration(stage.as_str(), self.stage_started.elapsed().as_secs_f64());
        }
        self.stage_started = Instant::now();
    }

    async fn check_cancelled(&self) -> WorkerResult<()> {
        if *self.cancel.borrow() {
            return Err(WorkerError::Cancelled);
        }
        // Cancellation requested from another process
        if self
            .ctx
            .store
            .cancel_requested(&self.job.id, self.job.attempt)
            .await?
        {
            return Err(WorkerError::Cancelled);
        }
        Ok(())
    }

    async fn persist(&self) -> WorkerResult<()> {
        self.ctx.store.put(&self.job).await?;
        Ok(())
    }

    fn warn(&self, message: &str) {
        self.logger.log_warning(message);
        self.ctx
            .progress
            .publish(ProgressEvent::log(&self.job.id, message));
    }

    async fn finish(mut self) -> WorkerResult<RunOutcome> {
        self.close_stage();
        let clip_count = self.job.clips.len();
        self.job.complete();
        self.persist().await?;
        self.ctx
            .progress
            .publish(ProgressEvent::done(&self.job.id, clip_count as u32));

        let secs = self.job.processing_secs().unwrap_or_default();
        self.logger
            .log_completion(&format!("{} clip(s) in {:.1}s", clip_count, secs));
        metrics::record_job_completed(clip_count);

        expire_after_retention(self.ctx, &self.job.id);
        Ok(RunOutcome::Completed { clip_count })
    }

    /// Persist the failure and hand the error back.
    async fn fail(mut self, error: WorkerError) -> WorkerError {
        let message = error.user_message();
        self.logger.log_error(&error.to_string());
        if let WorkerError::Media(media) = &error {
            if let Some(stderr) = media.stderr() {
                warn!(job_id = %self.job.id, "Tool stderr: {}", stderr);
            }
        }

        if !self.job.is_terminal() {
            self.job.fail(message.clone());
        }
        if let Err(e) = self.persist().await {
            warn!("Failed to persist failure of job {}: {}", self.job.id, e);
        }
        self.ctx.progress.publish(ProgressEvent::error(
            &self.job.id,
            self.job.last_stage,
            message,
        ));

        if let Some(path) = self.downloaded.take() {
            delete_file(&path).await;
        }

        let reason = if error.is_cancelled() {
            "cancelled"
        } else if error.is_timeout() {
            "timeout"
        } else {
            "error"
        };
        metrics::record_job_failed(reason);
        error
    }
}

fn clipping_progress(done: usize, count: usize) -> u8 {
    if count == 0 {
        return CLIPPING_BASE + CLIPPING_SHARE;
    }
    CLIPPING_BASE + (done * CLIPPING_SHARE as usize / count) as u8
}

/// Remove the job's outputs after the retention delay and flag its clips expired.
fn expire_after_retention(ctx: &WorkerContext, job_id: &JobId) {
    let dir = ctx.layout.job_dir(job_id);
    let handle = schedule_delete(dir, ctx.retention.output_retention);
    let store = ctx.store.clone();
    let job_id = job_id.clone();
    tokio::spawn(async move {
        if handle.await.is_err() {
            return;
        }
        match store.get(&job_id).await {
            Ok(Some(mut job)) => {
                for clip in &mut job.clips {
                    clip.expired = true;
                }
                if let Err(e) = store.put(&job).await {
                    warn!("Failed to mark clips of job {} expired: {}", job_id, e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to load job {} for expiry: {}", job_id, e),
        }
    });
}

/// Upload every clip of `job` that is not uploaded yet.
///
/// Successive uploads are separated by the uploader's delay. A clip whose
/// upload exhausts the account pool is marked failed and the rest continue.
pub(crate) async fn publish_clips(ctx: &WorkerContext, job: &mut Job) -> WorkerResult<Vec<UploadResult>> {
    let total = job.clips.len();
    let title = job.source.title.clone();
    let delay: Duration = ctx.uploader.upload_delay();
    let mut results = Vec::with_capacity(total);
    let mut attempted = false;

    for i in 0..total {
        let index = job.clips[i].index;
        if job.clips[i].is_uploaded() {
            results.push(UploadResult {
                index,
                status: ClipStatus::Uploaded,
                url: job.clips[i].url.clone(),
                error: None,
                skipped: true,
            });
            continue;
        }
        if attempted && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        attempted = true;

        let path = ctx.layout.clip_path(&job.id, index);
        let metadata = ClipMetadata::for_clip(&title, index as usize, total);
        let result = match ctx.uploader.publish(&path, &metadata).await {
            Ok(video) => {
                let clip = &mut job.clips[i];
                clip.upload_status = ClipStatus::Uploaded;
                clip.url = Some(video.url.clone());
                ctx.progress.publish(ProgressEvent::ClipUploaded {
                    job_id: job.id.clone(),
                    index,
                    url: video.url.clone(),
                });
                UploadResult {
                    index,
                    status: ClipStatus::Uploaded,
                    url: Some(video.url),
                    error: None,
                    skipped: false,
                }
            }
            Err(PublishError::NotConfigured) => {
                return Err(WorkerError::NotConfigured("no upload accounts".to_string()))
            }
            Err(e) => {
                warn!("Upload of clip {} of job {} failed: {}", index, job.id, e);
                job.clips[i].upload_status = ClipStatus::Failed;
                ctx.progress
                    .publish(ProgressEvent::log(&job.id, format!("Upload of clip {} failed", index)));
                UploadResult {
                    index,
                    status: ClipStatus::Failed,
                    url: None,
                    error: Some(e.to_string()),
                    skipped: false,
                }
            }
        };
        results.push(result);

        job.set_progress(UPLOAD_BASE + ((i + 1) * UPLOAD_SHARE as usize / total) as u8);
        ctx.store.put(job).await?;
        ctx.progress
            .publish(ProgressEvent::stage(&job.id, job.stage, job.progress));
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{harness, url_job, Harness};


    async fn run(h: &Harness, job: &Job) -> WorkerResult<RunOutcome> {
        let cancel = h.ctx.cancels.register(&job.id);
        let result = run_job(&h.ctx, &JobMessage::new(job.id.clone(), job.attempt), false, cancel).await;
        h.ctx.cancels.unregister(&job.id);
        result
    }

    #[tokio::test]
    async fn test_happy_path_renders_clips() {
        let h = harness().await;
        let mut job = url_job(120.0);
        job.spec.clip_count = 2;
        job.spec.clip_duration = 30;
        h.ctx.store.put(&job).await.unwrap();
        h.ctx.progress.open(&job.id);
        let mut events = h.ctx.progress.subscribe(&job.id).unwrap();

        let outcome = run(&h, &job).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed { clip_count: 2 });

        let stored = h.ctx.store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.stage, Stage::Completed);
        assert_eq!(stored.progress, 100);
        assert_eq!(stored.clips.len(), 2);
        for pair in stored.clips.windows(2) {
            assert!((pair[0].start - pair[1].start).abs() >= 30.0);
        }
        for clip in &stored.clips {
            assert!(clip.start >= 0.0 && clip.end() <= 120.0);
            assert!(h.ctx.layout.clip_path(&job.id, clip.index).exists());
        }
        // Source removed once clips are ready
        assert!(!h.ctx.layout.source_path(&job.id).exists());

        // Progress never goes backwards
        let mut last = 0;
        let mut saw_done = false;
        while let Ok(event) = events.try_recv() {
            match event {
                ProgressEvent::Stage { progress, .. } => {
                    assert!(progress >= last, "{} after {}", progress, last);
                    last = progress;
                }
                ProgressEvent::Done { clip_count, .. } => {
                    assert_eq!(clip_count, 2);
                    saw_done = true;
                }
                _ => {}
            }
        }
        assert!(saw_done);
    }

    #[tokio::test]
    async fn test_failure_at_clipping_removes_source() {
        let h = harness().await;
        h.renderer.fail_renders();
        let job = url_job(120.0);
        h.ctx.store.put(&job).await.unwrap();

        let err = run(&h, &job).await.unwrap_err();
        assert!(err.is_retryable());

        let stored = h.ctx.store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.stage, Stage::Failed);
        assert_eq!(stored.last_stage, Stage::Clipping);
        assert!(stored.error.is_some());
        assert!(!h.ctx.layout.source_path(&job.id).exists());
    }

    #[tokio::test]
    async fn test_cancel_signal_fails_job() {
        let h = harness().await;
        let job = url_job(120.0);
        h.ctx.store.put(&job).await.unwrap();

        let cancel = h.ctx.cancels.register(&job.id);
        h.ctx.cancels.cancel(&job.id);
        let err = run_job(&h.ctx, &JobMessage::new(job.id.clone(), 1), false, cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!err.is_retryable());

        let stored = h.ctx.store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.stage, Stage::Failed);
        assert_eq!(stored.error.as_deref(), Some("Cancelled by user"));
    }

    #[tokio::test]
    async fn test_cancel_recorded_elsewhere_stops_between_clips() {
        let h = harness().await;
        let mut job = url_job(120.0);
        job.spec.clip_count = 3;
        job.spec.clip_duration = 30;
        h.ctx.store.put(&job).await.unwrap();
        h.renderer
            .cancel_during_render(h.ctx.store.clone(), &job.id, job.attempt);

        let err = run(&h, &job).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(h.renderer.render_count(), 1);

        let stored = h.ctx.store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.stage, Stage::Failed);
        assert_eq!(stored.last_stage, Stage::Clipping);
        assert_eq!(stored.error.as_deref(), Some("Cancelled by user"));
        assert!(stored.cancel_requested);
    }

    #[tokio::test]
    async fn test_stale_delivery_is_skipped() {
        let h = harness().await;
        let mut job = url_job(120.0);
        job.fail("Cancelled by user");
        h.ctx.store.put(&job).await.unwrap();

        let outcome = run(&h, &job).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Skipped { .. }));
        assert_eq!(h.renderer.render_count(), 0);
    }

    #[tokio::test]
    async fn test_next_attempt_delivery_starts_new_attempt() {
        let h = harness().await;
        let mut job = url_job(120.0);
        job.fail("ffmpeg exited with code 1");
        h.ctx.store.put(&job).await.unwrap();

        let cancel = h.ctx.cancels.register(&job.id);
        let outcome = run_job(&h.ctx, &JobMessage::new(job.id.clone(), 2), false, cancel)
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));

        let stored = h.ctx.store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.attempt, 2);
        assert_eq!(stored.history.len(), 1);
        assert_eq!(stored.history[0].outcome, Stage::Failed);
    }

    #[tokio::test]
    async fn test_subtitles_and_face_crop() {
        let h = harness().await;
        let mut job = url_job(120.0);
        job.spec.clip_count = 1;
        job.spec.subtitles = true;
        job.spec.face_tracking = true;
        h.ctx.store.put(&job).await.unwrap();

        run(&h, &job).await.unwrap();

        let stored = h.ctx.store.get(&job.id).await.unwrap().unwrap();
        let clip = &stored.clips[0];
        assert!(clip.has_captions);
        assert!(!clip.cropped, "no faces in the fake detector");
        assert!(h.ctx.layout.subtitle_path(&job.id, 1).exists());
        assert_eq!(h.renderer.last_crop(), None);
    }

    #[tokio::test]
    async fn test_auto_publish_marks_clips() {
        let h = harness().await;
        let mut job = url_job(120.0);
        job.spec.clip_count = 2;
        job.spec.auto_publish = true;
        job.spec.clip_duration = 30;
        h.ctx.store.put(&job).await.unwrap();

        run(&h, &job).await.unwrap();

        let stored = h.ctx.store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.stage, Stage::Completed);
        assert!(stored.clips.iter().all(|c| c.is_uploaded()));
        assert!(stored.clips[0].url.as_deref().unwrap().starts_with("https://youtube.com/shorts/"));
    }

    #[test]
    fn test_clipping_progress() {
        assert_eq!(clipping_progress(0, 3), 50);
        assert_eq!(clipping_progress(1, 3), 60);
        assert_eq!(clipping_progress(3, 3), 80);
    }
}
