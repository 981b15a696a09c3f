//! Media processing for HookClip.
//!
//! Typed, cancellable adapters over the external tools the pipeline drives:
//! - yt-dlp source download and metadata
//! - FFprobe inspection and FFmpeg loudness sampling
//! - whisper transcription and face detection scripts
//! - caption track generation
//! - clip rendering

pub mod clip;
pub mod command;
pub mod download;
pub mod error;
pub mod face;
pub mod loudness;
pub mod probe;
pub mod progress;
pub mod subtitles;
pub mod transcribe;

pub use clip::{escape_filter_path, Clipper, ENCODE_TIMEOUT_SECS};
pub use command::{check_tool, tool_version, FfmpegCommand, FfmpegRunner, ToolOutput, ToolRunner};
pub use download::{Downloader, RemoteVideoInfo, YtDlpConfig, YtDlpDownloader};
pub use error::{MediaError, MediaResult};
pub use face::{compute_crop, CropRect, FaceDetectConfig, FaceDetections, FaceDetector, ScriptFaceDetector};
pub use loudness::{FfmpegLoudness, LoudnessAnalyzer, LoudnessProfile};
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;
pub use subtitles::{generate_ass, generate_srt, write_track, AssStyle};
pub use transcribe::{TranscribeOptions, Transcriber, WhisperConfig, WhisperTranscriber};
