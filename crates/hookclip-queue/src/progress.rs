//! Per-job live progress fan-out.
//!
//! Each job gets a broadcast channel when it is submitted. Publishing never
//! blocks: a subscriber that falls more than the channel capacity behind
//! observes `RecvError::Lagged` and skips ahead. Channels are dropped a grace
//! period after the job reaches a terminal state so late subscribers can
//! still see the final event.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use hookclip_models::{JobId, ProgressEvent};
use tokio::sync::broadcast;
use tracing::debug;

/// Events buffered per job before slow subscribers start lagging.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// How long a finished job's channel stays subscribable.
pub const CLOSE_GRACE: Duration = Duration::from_secs(5 * 60);

struct Channel {
    sender: broadcast::Sender<ProgressEvent>,
    /// Bumped on every (re)open so a stale close timer leaves a reopened channel alone
    generation: u64,
}

/// Registry of per-job progress channels.
#[derive(Clone)]
pub struct ProgressHub {
    channels: Arc<Mutex<HashMap<JobId, Channel>>>,
    grace: Duration,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::with_grace(CLOSE_GRACE)
    }

    pub fn with_grace(grace: Duration) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            grace,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Channel>> {
        // Entries stay consistent even if a holder panicked
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create the job's channel, or reactivate an existing one.
    pub fn open(&self, job_id: &JobId) {
        let mut channels = self.lock();
        match channels.get_mut(job_id) {
            Some(channel) => channel.generation += 1,
            None => {
                let (sender, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
                channels.insert(
                    job_id.clone(),
                    Channel {
                        sender,
                        generation: 0,
                    },
                );
            }
        }
    }

    /// Send an event to the job's subscribers. Returns how many received it.
    pub fn publish(&self, event: ProgressEvent) -> usize {
        let channels = self.lock();
        match channels.get(event.job_id()) {
            // An error only means nobody is listening right now
            Some(channel) => channel.sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Live receiver for the job, or `None` if it has no channel.
    pub fn subscribe(&self, job_id: &JobId) -> Option<broadcast::Receiver<ProgressEvent>> {
        self.lock().get(job_id).map(|c| c.sender.subscribe())
    }

    /// Drop the job's channel after the grace period, unless it is reopened meanwhile.
    pub fn close_after_grace(&self, job_id: &JobId) {
        let Some(generation) = self.lock().get(job_id).map(|c| c.generation) else {
            return;
        };
        let hub = self.clone();
        let job_id = job_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(hub.grace).await;
            let mut channels = hub.lock();
            if channels.get(&job_id).is_some_and(|c| c.generation == generation) {
                channels.remove(&job_id);
                debug!("Closed progress channel for job {}", job_id);
            }
        });
    }

    /// Drop the job's channel now. Open receivers see the stream end.
    pub fn close(&self, job_id: &JobId) {
        self.lock().remove(job_id);
    }

    pub fn is_open(&self, job_id: &JobId) -> bool {
        self.lock().contains_key(job_id)
    }

    /// Number of open channels.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
