//! Job definitions and lifecycle.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::clip::Clip;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline stage of a job.
///
/// Stages are visited in declaration order; the optional ones are skipped
/// when the job does not request the matching feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Queued,
    Downloading,
    Transcribing,
    Analyzing,
    FaceTracking,
    Subtitling,
    Clipping,
    Ready,
    Uploading,
    Completed,
    Failed,
}

impl Stage {
    /// All stages, in pipeline order.
    pub const ALL: [Stage; 11] = [
        Stage::Queued,
        Stage::Downloading,
        Stage::Transcribing,
        Stage::Analyzing,
        Stage::FaceTracking,
        Stage::Subtitling,
        Stage::Clipping,
        Stage::Ready,
        Stage::Uploading,
        Stage::Completed,
        Stage::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Queued => "queued",
            Stage::Downloading => "downloading",
            Stage::Transcribing => "transcribing",
            Stage::Analyzing => "analyzing",
            Stage::FaceTracking => "face_tracking",
            Stage::Subtitling => "subtitling",
            Stage::Clipping => "clipping",
            Stage::Ready => "ready",
            Stage::Uploading => "uploading",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    /// Whether a worker is actively driving the job through this stage.
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != Stage::Queued && *self != Stage::Ready
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown stage: {}", s))
    }
}

/// How hook windows are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// Transcript chunks scored by an LLM, fused with audio energy.
    #[default]
    Smart,
    /// Audio-energy sliding window.
    Quick,
    /// Evenly spaced windows, no analysis.
    Even,
}

impl DetectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMode::Smart => "smart",
            DetectionMode::Quick => "quick",
            DetectionMode::Even => "even",
        }
    }
}

/// Target publishing platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    #[default]
    Youtube,
    Tiktok,
    Instagram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
        }
    }
}

/// Caption rendering style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubtitleStyle {
    /// Plain lines.
    Standard,
    /// Karaoke lines with per-word fill timing.
    #[default]
    Highlight,
}

/// Where the source video comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceRef {
    /// Remote URL fetched by the downloader.
    Url { url: String },
    /// File already present on local storage.
    File { path: PathBuf },
}

impl SourceRef {
    pub fn is_remote(&self) -> bool {
        matches!(self, SourceRef::Url { .. })
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Url { url } => write!(f, "{}", url),
            SourceRef::File { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Fully resolved job parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobSpec {
    pub source: SourceRef,
    pub clip_count: u32,
    /// Target clip duration in seconds
    pub clip_duration: u32,
    pub platform: Platform,
    pub detection_mode: DetectionMode,
    #[serde(default)]
    pub subtitles: bool,
    #[serde(default)]
    pub subtitle_style: SubtitleStyle,
    #[serde(default)]
    pub face_tracking: bool,
    /// Publish clips as soon as they are rendered
    #[serde(default)]
    pub auto_publish: bool,
    /// Caller that owns the job and its clips
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl JobSpec {
    /// Spec for `source` with default options: 3 clips of 40s, smart detection.
    pub fn new(source: SourceRef) -> Self {
        Self {
            source,
            clip_count: 3,
            clip_duration: 40,
            platform: Platform::default(),
            detection_mode: DetectionMode::default(),
            subtitles: false,
            subtitle_style: SubtitleStyle::default(),
            face_tracking: false,
            auto_publish: false,
            owner: None,
        }
    }

    /// Whether the pipeline needs a transcript for this job.
    pub fn needs_transcript(&self) -> bool {
        self.detection_mode == DetectionMode::Smart || self.subtitles
    }
}

/// Metadata resolved for the source before the job is queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct SourceMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    pub title: String,
    /// Duration in seconds
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Summary of a finished attempt, kept when the job is retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub outcome: Stage,
    pub last_stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
}

/// A clip-generation job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,
    pub spec: JobSpec,
    pub source: SourceMeta,
    pub stage: Stage,
    /// Last non-terminal stage the job entered
    pub last_stage: Stage,
    /// Progress percentage (0-100), never decreasing within an attempt
    pub progress: u8,
    #[serde(default)]
    pub clips: Vec<Clip>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Current attempt, starting at 1
    pub attempt: u32,
    #[serde(default)]
    pub history: Vec<AttemptRecord>,
    #[serde(default)]
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a queued job.
    pub fn new(spec: JobSpec, source: SourceMeta) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            spec,
            source,
            stage: Stage::Queued,
            last_stage: Stage::Queued,
            progress: 0,
            clips: Vec::new(),
            error: None,
            attempt: 1,
            history: Vec::new(),
            cancel_requested: false,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Enter a stage, raising progress if `progress` is ahead of the current value.
    pub fn advance(&mut self, stage: Stage, progress: u8) {
        self.stage = stage;
        if !stage.is_terminal() {
            self.last_stage = stage;
        }
        self.set_progress(progress);
    }

    /// Raise progress. Lower values are ignored.
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
        self.updated_at = Utc::now();
    }

    /// Mark the worker as having picked up the current attempt.
    pub fn mark_started(&mut self) {
        let now = Utc::now();
        self.started_at = Some(now);
        self.updated_at = now;
    }

    /// Terminal failure for the current attempt.
    pub fn fail(&mut self, message: impl Into<String>) {
        let now = Utc::now();
        self.stage = Stage::Failed;
        self.error = Some(message.into());
        self.finished_at = Some(now);
        self.updated_at = now;
    }

    /// Terminal success for the current attempt.
    pub fn complete(&mut self) {
        let now = Utc::now();
        self.stage = Stage::Completed;
        self.progress = 100;
        self.error = None;
        self.finished_at = Some(now);
        self.updated_at = now;
    }

    /// Archive the current attempt and reset state for `attempt`.
    ///
    /// The job returns to `queued`; earlier attempts stay in `history`.
    pub fn begin_attempt(&mut self, attempt: u32) {
        let now = Utc::now();
        if self.started_at.is_some() || self.stage.is_terminal() {
            self.history.push(AttemptRecord {
                attempt: self.attempt,
                outcome: self.stage,
                last_stage: self.last_stage,
                error: self.error.clone(),
                started_at: self.started_at,
                finished_at: self.finished_at.unwrap_or(now),
            });
        }
        self.attempt = attempt;
        self.stage = Stage::Queued;
        self.last_stage = Stage::Queued;
        self.progress = 0;
        self.clips.clear();
        self.error = None;
        self.cancel_requested = false;
        self.started_at = None;
        self.finished_at = None;
        self.updated_at = now;
    }

    /// Wall-clock processing time of the current attempt, if finished.
    pub fn processing_secs(&self) -> Option<f64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }

    /// Output directory name for this job.
    pub fn output_dir_name(&self) -> &str {
        self.id.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> JobSpec {
        JobSpec {
            source: SourceRef::Url {
                url: "https://youtu.be/dQw4w9WgXcQ".to_string(),
            },
            clip_count: 3,
            clip_duration: 40,
            platform: Platform::Youtube,
            detection_mode: DetectionMode::Quick,
            subtitles: false,
            subtitle_style: SubtitleStyle::Highlight,
            face_tracking: false,
            auto_publish: false,
            owner: None,
        }
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut job = Job::new(spec(), SourceMeta::default());
        job.advance(Stage::Downloading, 20);
        job.advance(Stage::Analyzing, 10);
        assert_eq!(job.progress, 20);
        assert_eq!(job.stage, Stage::Analyzing);
        job.set_progress(250);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_failure_keeps_last_stage() {
        let mut job = Job::new(spec(), SourceMeta::default());
        job.mark_started();
        job.advance(Stage::Clipping, 55);
        job.fail("encoder crashed");
        assert_eq!(job.stage, Stage::Failed);
        assert_eq!(job.last_stage, Stage::Clipping);
        assert!(job.is_terminal());
    }

    #[test]
    fn test_begin_attempt_archives_history() {
        let mut job = Job::new(spec(), SourceMeta::default());
        job.mark_started();
        job.advance(Stage::Clipping, 60);
        job.fail("boom");

        job.begin_attempt(2);

        assert_eq!(job.stage, Stage::Queued);
        assert_eq!(job.attempt, 2);
        assert_eq!(job.progress, 0);
        assert!(job.error.is_none());
        assert_eq!(job.history.len(), 1);
        assert_eq!(job.history[0].attempt, 1);
        assert_eq!(job.history[0].outcome, Stage::Failed);
        assert_eq!(job.history[0].last_stage, Stage::Clipping);
    }

    #[test]
    fn test_stage_round_trips_through_str() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
        assert!("bogus".parse::<Stage>().is_err());
    }

    #[test]
    fn test_source_ref_serialization() {
        let json = serde_json::to_value(SourceRef::File {
            path: PathBuf::from("/tmp/a.mp4"),
        })
        .unwrap();
        assert_eq!(json["kind"], "file");
        assert_eq!(json["path"], "/tmp/a.mp4");
    }
}
