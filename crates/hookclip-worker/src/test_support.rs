//! Fake adapters and an in-memory harness for pipeline tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hookclip_media::{
    CropRect, Downloader, FaceDetections, FaceDetector, LoudnessAnalyzer, LoudnessProfile,
    MediaError, MediaResult, RemoteVideoInfo, TranscribeOptions, Transcriber,
};
use hookclip_models::{
    Chunk, Job, JobId, JobSpec, SourceMeta, SourceRef, Transcript, TranscriptSegment, TranscriptWord,
};
use hookclip_publish::{
    AccountPool, ClipMetadata, OAuthTokens, PublishError, PublishResult, Uploader, VideoPlatform,
};
use hookclip_queue::{JobStore, MemoryJobQueue, MemoryJobStore, ProgressHub};
use hookclip_scorer::ChunkScorer;
use hookclip_storage::{RetentionConfig, StorageLayout};
use tempfile::TempDir;
use tokio::sync::watch;

use crate::config::WorkerConfig;
use crate::context::{Adapters, WorkerContext};
use crate::render::{ClipRenderer, RenderRequest};

pub const TEST_URL: &str = "https://example.com/talk.mp4";

pub struct FakeDownloader {
    pub duration: Mutex<f64>,
    pub fail_info: AtomicBool,
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(
        &self,
        _url: &str,
        dest: &Path,
        _cancel: Option<watch::Receiver<bool>>,
    ) -> MediaResult<PathBuf> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, b"source").await?;
        Ok(dest.to_path_buf())
    }

    async fn info(&self, url: &str) -> MediaResult<RemoteVideoInfo> {
        if self.fail_info.load(Ordering::SeqCst) {
            return Err(MediaError::download_failed(format!("unavailable: {}", url)));
        }
        Ok(RemoteVideoInfo {
            id: "talk".to_string(),
            title: "Test talk".to_string(),
            duration: *self.duration.lock().unwrap(),
            uploader: None,
            thumbnail: None,
        })
    }
}

/// Ten-second segments of two words each, covering two minutes.
pub struct FakeTranscriber;

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(
        &self,
        _source: &Path,
        _options: &TranscribeOptions,
        _cancel: Option<watch::Receiver<bool>>,
    ) -> MediaResult<Transcript> {
        let segments = (0..12u32)
            .map(|i| {
                let start = i as f64 * 10.0;
                TranscriptSegment {
                    id: i,
                    start,
                    end: start + 10.0,
                    text: format!("point number {}", i),
                    avg_logprob: -0.2,
                    no_speech_prob: 0.01,
                    words: vec![
                        TranscriptWord {
                            word: "point".to_string(),
                            start: start + 1.0,
                            end: start + 1.5,
                            probability: 0.9,
                        },
                        TranscriptWord {
                            word: format!("{}", i),
                            start: start + 2.0,
                            end: start + 2.4,
                            probability: 0.9,
                        },
                    ],
                }
            })
            .collect();
        Ok(Transcript {
            language: "en".to_string(),
            language_probability: 0.99,
            duration: 120.0,
            segments,
        })
    }
}

pub struct NoFaces;

#[async_trait]
impl FaceDetector for NoFaces {
    async fn detect(
        &self,
        _source: &Path,
        _cancel: Option<watch::Receiver<bool>>,
    ) -> MediaResult<FaceDetections> {
        Ok(FaceDetections::default())
    }
}

/// Two minutes of audio with a loud burst every 30 seconds.
pub struct PulseLoudness;

#[async_trait]
impl LoudnessAnalyzer for PulseLoudness {
    async fn analyze(
        &self,
        _source: &Path,
        _cancel: Option<watch::Receiver<bool>>,
    ) -> MediaResult<LoudnessProfile> {
        let values: Vec<f64> = (0..120)
            .map(|t| if t % 30 < 5 { 0.9 } else { 0.3 })
            .collect();
        Ok(LoudnessProfile::from_per_second(&values))
    }
}

pub struct NeutralScorer;

#[async_trait]
impl ChunkScorer for NeutralScorer {
    async fn score_chunks(&self, chunks: &[Chunk], _title: &str) -> Vec<f64> {
        vec![0.5; chunks.len()]
    }
}

#[derive(Default)]
pub struct FakeRenderer {
    fail: AtomicBool,
    renders: AtomicUsize,
    last_crop: Mutex<Option<CropRect>>,
    /// Cancellation recorded in the store during the next render
    cancel_during_render: Mutex<Option<(Arc<dyn JobStore>, JobId, u32)>>,
}

impl FakeRenderer {
    /// Record a cancellation of `attempt` directly in `store` while the next
    /// clip renders, as a process that does not run the job would.
    pub fn cancel_during_render(&self, store: Arc<dyn JobStore>, job_id: &JobId, attempt: u32) {
        *self.cancel_during_render.lock().unwrap() = Some((store, job_id.clone(), attempt));
    }

    pub fn fail_renders(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn last_crop(&self) -> Option<CropRect> {
        *self.last_crop.lock().unwrap()
    }
}

#[async_trait]
impl ClipRenderer for FakeRenderer {
    async fn render(
        &self,
        request: &RenderRequest<'_>,
        _cancel: Option<watch::Receiver<bool>>,
        on_progress: Box<dyn Fn(f64) + Send>,
    ) -> MediaResult<()> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        *self.last_crop.lock().unwrap() = request.crop;
        let pending = self.cancel_during_render.lock().unwrap().take();
        if let Some((store, job_id, attempt)) = pending {
            store.request_cancel(&job_id, attempt).await.unwrap();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(MediaError::tool_failed(
                "ffmpeg",
                "exited with code 1",
                Some("Conversion failed!".to_string()),
                Some(1),
            ));
        }
        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        on_progress(0.0);
        on_progress(0.5);
        tokio::fs::write(request.output, b"clip").await?;
        on_progress(1.0);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePlatform {
    uploads: AtomicUsize,
}

#[async_trait]
impl VideoPlatform for FakePlatform {
    async fn upload(&self, _refresh_token: &str, file: &Path, _metadata: &ClipMetadata) -> PublishResult<String> {
        if !file.exists() {
            return Err(PublishError::upload(format!("missing {}", file.display())));
        }
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(format!("vid{}", n))
    }

    fn auth_url(&self) -> String {
        "https://accounts.example.com/auth".to_string()
    }

    async fn exchange_code(&self, code: &str) -> PublishResult<OAuthTokens> {
        Ok(OAuthTokens {
            access_token: format!("access-{}", code),
            refresh_token: Some(format!("refresh-{}", code)),
            expires_at: None,
            scope: None,
        })
    }

    fn video_url(&self, video_id: &str) -> String {
        format!("https://youtube.com/shorts/{}", video_id)
    }
}

pub struct Harness {
    pub ctx: Arc<WorkerContext>,
    pub queue: MemoryJobQueue,
    pub renderer: Arc<FakeRenderer>,
    pub downloader: Arc<FakeDownloader>,
    _dir: TempDir,
}

pub async fn harness() -> Harness {
    harness_with(vec!["refresh-1".to_string()]).await
}

/// Harness whose uploader holds one account per token.
pub async fn harness_with(refresh_tokens: Vec<String>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(dir.path().join("downloads"), dir.path().join("output"));
    layout.ensure_dirs().await.unwrap();

    let queue = MemoryJobQueue::new();
    let renderer = Arc::new(FakeRenderer::default());
    let downloader = Arc::new(FakeDownloader {
        duration: Mutex::new(120.0),
        fail_info: AtomicBool::new(false),
    });
    let uploader = Uploader::new(
        AccountPool::new(refresh_tokens),
        Arc::new(FakePlatform::default()),
        Duration::ZERO,
    );
    let adapters = Adapters {
        downloader: downloader.clone(),
        transcriber: Arc::new(FakeTranscriber),
        faces: Arc::new(NoFaces),
        loudness: Arc::new(PulseLoudness),
        scorer: Arc::new(NeutralScorer),
        renderer: renderer.clone(),
        uploader: Arc::new(uploader),
    };
    let config = WorkerConfig {
        backoff_base: Duration::from_millis(20),
        shutdown_timeout: Duration::from_secs(5),
        ..WorkerConfig::default()
    };

    let ctx = WorkerContext::new(
        config,
        Arc::new(queue.clone()),
        Arc::new(MemoryJobStore::new()),
        layout,
        RetentionConfig::default(),
        adapters,
    )
    .with_progress(ProgressHub::with_grace(Duration::from_millis(50)));

    Harness {
        ctx: Arc::new(ctx),
        queue,
        renderer,
        downloader,
        _dir: dir,
    }
}

/// A queued job for a remote source of `duration` seconds.
pub fn url_job(duration: f64) -> Job {
    let spec = JobSpec::new(SourceRef::Url {
        url: TEST_URL.to_string(),
    });
    Job::new(
        spec,
        SourceMeta {
            video_id: Some("talk".to_string()),
            title: "Test talk".to_string(),
            duration,
            thumbnail: None,
        },
    )
}
