//! Job transport and state for HookClip.
//!
//! This crate provides:
//! - At-least-once job delivery over Redis Streams, or in-process
//! - Delayed re-delivery for retry backoff
//! - Job record persistence
//! - Per-job live progress channels

use std::sync::Arc;

pub mod error;
pub mod message;
pub mod progress;
pub mod queue;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use message::{Delivery, JobMessage};
pub use progress::{ProgressHub, CLOSE_GRACE, PROGRESS_CHANNEL_CAPACITY};
pub use queue::{JobQueue, MemoryJobQueue, QueueBackend, QueueConfig, RedisJobQueue};
pub use store::{JobStore, MemoryJobStore, RedisJobStore};

/// Queue and store for the configured backend.
pub fn connect(config: &QueueConfig) -> QueueResult<(Arc<dyn JobQueue>, Arc<dyn JobStore>)> {
    match config.backend {
        QueueBackend::Memory => Ok((
            Arc::new(MemoryJobQueue::new()),
            Arc::new(MemoryJobStore::new()),
        )),
        QueueBackend::Redis => Ok((
            Arc::new(RedisJobQueue::new(config.clone())?),
            Arc::new(RedisJobStore::new(&config.redis_url)?),
        )),
    }
}
