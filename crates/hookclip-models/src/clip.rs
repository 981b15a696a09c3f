//! Clip and hook window types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::JobId;

/// Publish status of a rendered clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClipStatus {
    #[default]
    Pending,
    Uploaded,
    Failed,
}

/// A candidate clip window with its desirability score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HookWindow {
    /// Start offset in the source, seconds
    pub start: f64,
    /// End offset in the source, seconds (start + target duration)
    pub end: f64,
    pub score: f64,
}

impl HookWindow {
    pub fn new(start: f64, duration: f64, score: f64) -> Self {
        Self {
            start,
            end: start + duration,
            score,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Two windows overlap when their starts are closer than the target duration.
    pub fn overlaps(&self, other: &HookWindow, target_duration: f64) -> bool {
        (self.start - other.start).abs() < target_duration
    }
}

/// A rendered clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Clip {
    pub job_id: JobId,
    /// 1-based position within the job
    pub index: u32,
    pub filename: String,
    /// Window start in the source, seconds
    pub start: f64,
    /// Clip length, seconds
    pub duration: f64,
    pub score: f64,
    pub has_captions: bool,
    #[serde(default)]
    pub cropped: bool,
    #[serde(default)]
    pub upload_status: ClipStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Relative download reference served by the API
    pub download_path: String,
    #[serde(default)]
    pub expired: bool,
}

impl Clip {
    /// Create a clip record for the rendered window.
    pub fn new(job_id: &JobId, index: u32, window: &HookWindow) -> Self {
        let filename = clip_filename(index);
        Self {
            download_path: download_path(job_id, &filename),
            job_id: job_id.clone(),
            index,
            filename,
            start: window.start,
            duration: window.duration(),
            score: window.score,
            has_captions: false,
            cropped: false,
            upload_status: ClipStatus::Pending,
            url: None,
            expired: false,
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    pub fn is_uploaded(&self) -> bool {
        self.upload_status == ClipStatus::Uploaded
    }
}

/// File name of the clip at a 1-based index.
pub fn clip_filename(index: u32) -> String {
    format!("clip_{}.mp4", index)
}

/// API path a clip is served from.
pub fn download_path(job_id: &JobId, filename: &str) -> String {
    format!("/api/clips/{}/{}", job_id, filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_uses_start_distance() {
        let a = HookWindow::new(10.0, 30.0, 0.5);
        let b = HookWindow::new(39.0, 30.0, 0.5);
        let c = HookWindow::new(40.0, 30.0, 0.5);
        assert!(a.overlaps(&b, 30.0));
        assert!(!a.overlaps(&c, 30.0));
    }

    #[test]
    fn test_clip_from_window() {
        let job_id = JobId::from_string("job-1");
        let clip = Clip::new(&job_id, 2, &HookWindow::new(12.0, 40.0, 0.8));
        assert_eq!(clip.filename, "clip_2.mp4");
        assert_eq!(clip.download_path, "/api/clips/job-1/clip_2.mp4");
        assert_eq!(clip.end(), 52.0);
        assert_eq!(clip.upload_status, ClipStatus::Pending);
    }
}
