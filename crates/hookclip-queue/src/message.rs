//! Queue payloads.

use hookclip_models::JobId;
use serde::{Deserialize, Serialize};

/// What travels through the queue; the job itself lives in the job store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: JobId,
    /// Attempt this delivery runs, starting at 1
    pub attempt: u32,
}

impl JobMessage {
    pub fn new(job_id: JobId, attempt: u32) -> Self {
        Self { job_id, attempt }
    }

    /// Message for the following attempt of the same job.
    pub fn next_attempt(&self) -> Self {
        Self {
            job_id: self.job_id.clone(),
            attempt: self.attempt + 1,
        }
    }
}

/// A message handed to a consumer, to be acknowledged by `id` once handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: String,
    pub message: JobMessage,
}
