//! Live progress events streamed to subscribers.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::clip::Clip;
use crate::job::{JobId, Stage};

/// Progress event for a single job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Job entered a stage or advanced within it
    Stage {
        job_id: JobId,
        stage: Stage,
        progress: u8,
        timestamp: DateTime<Utc>,
    },

    /// Free-form log line
    Log {
        job_id: JobId,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A clip finished rendering
    ClipReady { job_id: JobId, clip: Clip },

    /// A clip was published
    ClipUploaded {
        job_id: JobId,
        index: u32,
        url: String,
    },

    /// Job completed
    Done { job_id: JobId, clip_count: u32 },

    /// Job failed
    Error {
        job_id: JobId,
        stage: Stage,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressEvent {
    pub fn stage(job_id: &JobId, stage: Stage, progress: u8) -> Self {
        Self::Stage {
            job_id: job_id.clone(),
            stage,
            progress,
            timestamp: Utc::now(),
        }
    }

    pub fn log(job_id: &JobId, message: impl Into<String>) -> Self {
        Self::Log {
            job_id: job_id.clone(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn error(job_id: &JobId, stage: Stage, message: impl Into<String>) -> Self {
        Self::Error {
            job_id: job_id.clone(),
            stage,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn done(job_id: &JobId, clip_count: u32) -> Self {
        Self::Done {
            job_id: job_id.clone(),
            clip_count,
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Stage { job_id, .. }
            | Self::Log { job_id, .. }
            | Self::ClipReady { job_id, .. }
            | Self::ClipUploaded { job_id, .. }
            | Self::Done { job_id, .. }
            | Self::Error { job_id, .. } => job_id,
        }
    }

    /// Whether this is the last event a job emits.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Event name used by streaming transports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stage { .. } => "stage",
            Self::Log { .. } => "log",
            Self::ClipReady { .. } => "clip_ready",
            Self::ClipUploaded { .. } => "clip_uploaded",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_tagged() {
        let id = JobId::from_string("j1");
        let json = serde_json::to_value(ProgressEvent::stage(&id, Stage::Clipping, 55)).unwrap();
        assert_eq!(json["type"], "stage");
        assert_eq!(json["stage"], "clipping");
        assert_eq!(json["progress"], 55);
    }

    #[test]
    fn test_terminal_events() {
        let id = JobId::from_string("j1");
        assert!(ProgressEvent::done(&id, 3).is_terminal());
        assert!(ProgressEvent::error(&id, Stage::Downloading, "x").is_terminal());
        assert!(!ProgressEvent::log(&id, "x").is_terminal());
    }
}
