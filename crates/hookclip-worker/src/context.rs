//! Shared state of the orchestrator and its workers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use hookclip_media::{
    Downloader, FaceDetectConfig, FaceDetector, FfmpegLoudness, LoudnessAnalyzer,
    ScriptFaceDetector, Transcriber, WhisperConfig, WhisperTranscriber, YtDlpConfig,
    YtDlpDownloader,
};
use hookclip_models::JobId;
use hookclip_publish::{PublishConfig, Uploader};
use hookclip_queue::{JobQueue, JobStore, ProgressHub, QueueConfig};
use hookclip_scorer::{ChunkScorer, LlmScorer};
use hookclip_storage::{RetentionConfig, StorageLayout};
use tokio::sync::watch;
use tracing::debug;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::hooks::HookDetector;
use crate::render::{ClipRenderer, FfmpegRenderer};

/// Cancel handles of the jobs running in this process.
#[derive(Clone, Default)]
pub struct CancelRegistry {
    running: Arc<Mutex<HashMap<JobId, watch::Sender<bool>>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, watch::Sender<bool>>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a running job and return the receiver its subprocesses watch.
    pub fn register(&self, job_id: &JobId) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        self.lock().insert(job_id.clone(), tx);
        rx
    }

    pub fn unregister(&self, job_id: &JobId) {
        self.lock().remove(job_id);
    }

    pub fn is_running(&self, job_id: &JobId) -> bool {
        self.lock().contains_key(job_id)
    }

    /// Signal a running job. Returns false if it is not running here.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        match self.lock().get(job_id) {
            Some(tx) => {
                debug!("Signalling cancellation of job {}", job_id);
                tx.send(true).is_ok()
            }
            None => false,
        }
    }
}

/// External tools and services the pipeline drives.
#[derive(Clone)]
pub struct Adapters {
    pub downloader: Arc<dyn Downloader>,
    pub transcriber: Arc<dyn Transcriber>,
    pub faces: Arc<dyn FaceDetector>,
    pub loudness: Arc<dyn LoudnessAnalyzer>,
    pub scorer: Arc<dyn ChunkScorer>,
    pub renderer: Arc<dyn ClipRenderer>,
    pub uploader: Arc<Uploader>,
}

impl Adapters {
    /// Production adapters configured from the environment.
    pub fn from_env() -> WorkerResult<Self> {
        let scorer = LlmScorer::from_env()
            .map_err(|e| WorkerError::config_error(format!("LLM scorer: {}", e)))?;
        let uploader = Uploader::from_config(PublishConfig::from_env())?;

        Ok(Self {
            downloader: Arc::new(YtDlpDownloader::new(YtDlpConfig::from_env())),
            transcriber: Arc::new(WhisperTranscriber::new(WhisperConfig::from_env())),
            faces: Arc::new(ScriptFaceDetector::new(FaceDetectConfig::from_env())),
            loudness: Arc::new(FfmpegLoudness::default()),
            scorer: Arc::new(scorer),
            renderer: Arc::new(FfmpegRenderer),
            uploader: Arc::new(uploader),
        })
    }
}

/// Everything a job needs while it runs.
pub struct WorkerContext {
    pub config: WorkerConfig,
    pub queue: Arc<dyn JobQueue>,
    pub store: Arc<dyn JobStore>,
    pub progress: ProgressHub,
    pub cancels: CancelRegistry,
    pub layout: StorageLayout,
    pub retention: RetentionConfig,
    pub downloader: Arc<dyn Downloader>,
    pub transcriber: Arc<dyn Transcriber>,
    pub faces: Arc<dyn FaceDetector>,
    pub detector: HookDetector,
    pub renderer: Arc<dyn ClipRenderer>,
    pub uploader: Arc<Uploader>,
}

impl WorkerContext {
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn JobStore>,
        layout: StorageLayout,
        retention: RetentionConfig,
        adapters: Adapters,
    ) -> Self {
        Self {
            config,
            queue,
            store,
            progress: ProgressHub::new(),
            cancels: CancelRegistry::new(),
            layout,
            retention,
            downloader: adapters.downloader,
            transcriber: adapters.transcriber,
            faces: adapters.faces,
            detector: HookDetector::new(adapters.loudness, adapters.scorer),
            renderer: adapters.renderer,
            uploader: adapters.uploader,
        }
    }

    /// Connect the queue and job store, prepare storage and build production adapters.
    pub async fn from_env() -> WorkerResult<Self> {
        let queue_config = QueueConfig::from_env();
        let config = WorkerConfig::from_env(&queue_config);
        let (queue, store) = hookclip_queue::connect(&queue_config)?;

        let layout = StorageLayout::from_env();
        layout.ensure_dirs().await?;

        Ok(Self::new(
            config,
            queue,
            store,
            layout,
            RetentionConfig::from_env(),
            Adapters::from_env()?,
        ))
    }

    /// Replace the progress hub, e.g. with a shorter close grace.
    pub fn with_progress(mut self, progress: ProgressHub) -> Self {
        self.progress = progress;
        self
    }
}
