//! Clip pipeline worker.
//!
//! This crate provides:
//! - Job orchestration (submit, cancel, retry, publish, admin queries)
//! - The staged clip pipeline and its hook detection
//! - A queue executor with retries and graceful shutdown
//! - Progress emission

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod render;
pub mod retry;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::WorkerConfig;
pub use context::{Adapters, CancelRegistry, WorkerContext};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use hooks::{Detection, HookDetector};
pub use logging::{init_tracing, JobLogger};
pub use orchestrator::{BatchItemError, BatchOutcome, JobPage, JobStats, Orchestrator};
pub use pipeline::{run_job, RunOutcome, UploadResult};
pub use render::{ClipRenderer, FfmpegRenderer, RenderRequest};
pub use retry::RetryPolicy;
