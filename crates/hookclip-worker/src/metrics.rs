//! Pipeline metrics.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "hookclip_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "hookclip_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "hookclip_jobs_failed_total";
    pub const JOBS_RETRIED_TOTAL: &str = "hookclip_jobs_retried_total";
    pub const STAGE_DURATION_SECONDS: &str = "hookclip_stage_duration_seconds";
    pub const CLIPS_RENDERED_TOTAL: &str = "hookclip_clips_rendered_total";
    pub const DETECTION_FALLBACKS_TOTAL: &str = "hookclip_detection_fallbacks_total";
}

pub fn record_job_started() {
    counter!(names::JOBS_STARTED_TOTAL).increment(1);
}

pub fn record_job_completed(clip_count: usize) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    counter!(names::CLIPS_RENDERED_TOTAL).increment(clip_count as u64);
}

/// `reason` is one of `error`, `timeout`, `cancelled`.
pub fn record_job_failed(reason: &'static str) {
    counter!(names::JOBS_FAILED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_job_retried() {
    counter!(names::JOBS_RETRIED_TOTAL).increment(1);
}

pub fn record_stage_duration(stage: &'static str, secs: f64) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage).record(secs);
}

pub fn record_detection_fallback(mode: &'static str) {
    counter!(names::DETECTION_FALLBACKS_TOTAL, "mode" => mode).increment(1);
}
