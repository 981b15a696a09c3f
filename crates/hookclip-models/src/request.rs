//! Submission requests and their validation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

use crate::job::{DetectionMode, JobSpec, Platform, SourceRef, SubtitleStyle};
use crate::utils::{extract_youtube_id, is_youtube_host};

/// Maximum number of sources in one batch submission.
pub const MAX_BATCH_SIZE: usize = 20;

/// Rejections raised before a job is queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("A source URL or file path is required")]
    MissingSource,

    #[error("Provide either a URL or a file path, not both")]
    AmbiguousSource,

    #[error("Invalid source URL: {0}")]
    InvalidUrl(String),

    #[error("clip_count must be between 1 and {max}")]
    ClipCountOutOfRange { max: u32 },

    #[error("clip_duration must be between {min} and {max}")]
    ClipDurationOutOfRange { min: u32, max: u32 },

    #[error("Video is only {duration}s long, shorter than clip duration of {clip_duration}s")]
    SourceTooShort { duration: u64, clip_duration: u32 },

    #[error("Batch must contain between 1 and {max} sources")]
    BatchSize { max: usize },
}

/// Bounds and defaults for clip count and duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipLimits {
    pub default_count: u32,
    pub max_count: u32,
    pub default_duration: u32,
    pub min_duration: u32,
    pub max_duration: u32,
}

impl Default for ClipLimits {
    fn default() -> Self {
        Self {
            default_count: 3,
            max_count: 10,
            default_duration: 40,
            min_duration: 15,
            max_duration: 90,
        }
    }
}

/// Caller-supplied job options. Missing values fall back to [`ClipLimits`] defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct JobOptions {
    #[serde(default)]
    pub clip_count: Option<u32>,
    #[serde(default)]
    pub clip_duration: Option<u32>,
    #[serde(default)]
    pub platform: Option<Platform>,
    #[serde(default)]
    pub detection_mode: Option<DetectionMode>,
    /// Legacy switch: `false` selects quick detection when no mode is given
    #[serde(default)]
    pub use_smart_detection: Option<bool>,
    #[serde(default)]
    pub subtitles: bool,
    #[serde(default)]
    pub subtitle_style: Option<SubtitleStyle>,
    #[serde(default)]
    pub face_tracking: bool,
    #[serde(default)]
    pub auto_publish: bool,
}

/// Single-source submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct JobRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(flatten)]
    pub options: JobOptions,
    #[serde(default)]
    pub owner: Option<String>,
}

/// Multi-source submission sharing one option set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct BatchRequest {
    pub urls: Vec<String>,
    #[serde(flatten)]
    pub options: JobOptions,
    #[serde(default)]
    pub owner: Option<String>,
}

impl BatchRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.urls.is_empty() || self.urls.len() > MAX_BATCH_SIZE {
            return Err(ValidationError::BatchSize { max: MAX_BATCH_SIZE });
        }
        Ok(())
    }

    /// Split into one request per URL.
    pub fn into_requests(self) -> Vec<JobRequest> {
        let options = self.options;
        let owner = self.owner;
        self.urls
            .into_iter()
            .map(|url| JobRequest {
                url: Some(url),
                file: None,
                options: options.clone(),
                owner: owner.clone(),
            })
            .collect()
    }
}

/// Validate a remote source URL. YouTube URLs must carry a well-formed video ID.
///
/// Returns the YouTube video ID when there is one.
pub fn validate_source_url(raw: &str) -> Result<Option<String>, ValidationError> {
    let url = Url::parse(raw.trim()).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ValidationError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| ValidationError::InvalidUrl("missing host".to_string()))?;

    if is_youtube_host(host) {
        extract_youtube_id(raw)
            .map(Some)
            .map_err(|e| ValidationError::InvalidUrl(e.to_string()))
    } else {
        Ok(None)
    }
}

impl ClipLimits {
    /// Validate a request and fill in defaults.
    pub fn resolve(&self, request: &JobRequest) -> Result<JobSpec, ValidationError> {
        let source = match (&request.url, &request.file) {
            (Some(_), Some(_)) => return Err(ValidationError::AmbiguousSource),
            (None, None) => return Err(ValidationError::MissingSource),
            (Some(url), None) => {
                validate_source_url(url)?;
                SourceRef::Url {
                    url: url.trim().to_string(),
                }
            }
            (None, Some(path)) => {
                if path.as_os_str().is_empty() {
                    return Err(ValidationError::MissingSource);
                }
                SourceRef::File { path: path.clone() }
            }
        };

        let options = &request.options;

        let clip_count = options.clip_count.unwrap_or(self.default_count);
        if clip_count < 1 || clip_count > self.max_count {
            return Err(ValidationError::ClipCountOutOfRange {
                max: self.max_count,
            });
        }

        let clip_duration = options.clip_duration.unwrap_or(self.default_duration);
        if clip_duration < self.min_duration || clip_duration > self.max_duration {
            return Err(ValidationError::ClipDurationOutOfRange {
                min: self.min_duration,
                max: self.max_duration,
            });
        }

        let detection_mode = options.detection_mode.unwrap_or(
            if options.use_smart_detection == Some(false) {
                DetectionMode::Quick
            } else {
                DetectionMode::Smart
            },
        );

        Ok(JobSpec {
            source,
            clip_count,
            clip_duration,
            platform: options.platform.unwrap_or_default(),
            detection_mode,
            subtitles: options.subtitles,
            subtitle_style: options.subtitle_style.unwrap_or_default(),
            face_tracking: options.face_tracking,
            auto_publish: options.auto_publish,
            owner: request.owner.clone(),
        })
    }
}

impl JobSpec {
    /// Reject sources shorter than one clip and cap the clip count to what fits.
    pub fn fit_to_duration(&mut self, source_duration: f64) -> Result<(), ValidationError> {
        if source_duration < self.clip_duration as f64 {
            return Err(ValidationError::SourceTooShort {
                duration: source_duration.floor() as u64,
                clip_duration: self.clip_duration,
            });
        }
        let max_possible = (source_duration / self.clip_duration as f64).floor() as u32;
        self.clip_count = self.clip_count.min(max_possible.max(1));
        Ok(())
    }
}
