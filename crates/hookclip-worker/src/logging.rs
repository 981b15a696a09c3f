//! Structured job logging.
//!
//! Every line carries the job id and the pipeline stage so a job can be
//! followed across stages and attempts.

use std::path::Path;
use std::sync::Mutex;

use hookclip_models::{JobId, Stage};
use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber.
///
/// Console output is colored unless `LOG_FORMAT=json`. With a `log_dir`, a
/// plain-text copy goes to `{log_dir}/{service}.log`.
pub fn init_tracing(service: &str, log_dir: Option<&Path>) -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("hookclip=info".parse()?);

    let console = if use_json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer()
            .with_ansi(true)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    let file = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(format!("{}.log", service)))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(env_filter)
        .try_init()?;
    Ok(())
}

/// Job logger with job and stage context.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    attempt: u32,
    stage: Stage,
}

impl JobLogger {
    pub fn new(job_id: &JobId, attempt: u32) -> Self {
        Self {
            job_id: job_id.to_string(),
            attempt,
            stage: Stage::Queued,
        }
    }

    /// Switch the stage reported on subsequent lines.
    pub fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            attempt = self.attempt,
            stage = %self.stage,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            attempt = self.attempt,
            stage = %self.stage,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            attempt = self.attempt,
            stage = %self.stage,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            attempt = self.attempt,
            stage = %self.stage,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            attempt = self.attempt,
            stage = %self.stage,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Span covering the whole attempt.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, attempt = self.attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_tracks_stage() {
        let job_id = JobId::from_string("job-1");
        let mut logger = JobLogger::new(&job_id, 2);
        assert_eq!(logger.job_id(), "job-1");
        assert_eq!(logger.stage(), Stage::Queued);

        logger.set_stage(Stage::Clipping);
        assert_eq!(logger.stage(), Stage::Clipping);
    }
}
