//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use hookclip_models::ClipLimits;
use hookclip_queue::QueueConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub concurrency: usize,
    /// Attempts per job before it is left failed for a manual retry
    pub max_attempts: u32,
    /// Base delay of the exponential redelivery backoff
    pub backoff_base: Duration,
    /// Ceiling on the redelivery delay
    pub backoff_max: Duration,
    /// Bounds and defaults for clip count and duration
    pub limits: ClipLimits,
    /// Ceiling on remote metadata lookups at submission
    pub info_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often the worker scans for orphaned deliveries
    pub claim_interval: Duration,
    /// Minimum idle time before an unacknowledged delivery is claimed
    pub claim_min_idle: Duration,
    pub log_dir: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let queue = QueueConfig::default();
        Self {
            concurrency: 2,
            max_attempts: queue.max_attempts,
            backoff_base: queue.backoff_base,
            backoff_max: Duration::from_secs(600),
            limits: ClipLimits::default(),
            info_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(60),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: queue.visibility_timeout,
            log_dir: PathBuf::from("./logs"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl WorkerConfig {
    /// Create config from environment variables, taking retry settings from `queue`.
    pub fn from_env(queue: &QueueConfig) -> Self {
        let defaults = Self::default();
        let default_limits = ClipLimits::default();

        let limits = ClipLimits {
            default_count: env_parse::<u32>("DEFAULT_CLIP_COUNT")
                .map(|n| n.clamp(1, default_limits.max_count))
                .unwrap_or(default_limits.default_count),
            default_duration: env_parse::<u32>("DEFAULT_CLIP_DURATION")
                .map(|n| n.clamp(default_limits.min_duration, default_limits.max_duration))
                .unwrap_or(default_limits.default_duration),
            ..default_limits
        };

        Self {
            concurrency: env_parse::<usize>("WORKER_CONCURRENCY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.concurrency),
            max_attempts: queue.max_attempts.max(1),
            backoff_base: queue.backoff_base,
            limits,
            claim_min_idle: queue.visibility_timeout,
            log_dir: std::env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir.clone()),
            ..defaults
        }
    }
}
