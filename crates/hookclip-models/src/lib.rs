//! Shared data models for the HookClip pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, stages and attempt history
//! - Clips and hook windows
//! - Transcripts and clip-sized chunks
//! - Live progress events
//! - Submission requests and their validation

pub mod clip;
pub mod encoding;
pub mod job;
pub mod progress;
pub mod request;
pub mod transcript;
pub mod utils;

pub use clip::{clip_filename, download_path, Clip, ClipStatus, HookWindow};
pub use encoding::PlatformSettings;
pub use job::{
    AttemptRecord, DetectionMode, Job, JobId, JobSpec, Platform, SourceMeta, SourceRef, Stage,
    SubtitleStyle,
};
pub use progress::ProgressEvent;
pub use request::{
    validate_source_url, BatchRequest, ClipLimits, JobOptions, JobRequest, ValidationError,
    MAX_BATCH_SIZE,
};
pub use transcript::{chunk_segments, Chunk, Transcript, TranscriptSegment, TranscriptWord};
pub use utils::{extract_youtube_id, YoutubeIdError};
