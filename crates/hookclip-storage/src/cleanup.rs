//! Retention of downloads and rendered output.
//!
//! Finished job directories are removed a fixed delay after completion, and
//! a periodic sweep removes anything in the download or output directories
//! older than the sweep interval. The sweep also runs once at startup to
//! collect leftovers from a previous process.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::layout::StorageLayout;
use crate::operations::remove_dir;

/// Default delay before a finished job's output is deleted (1 hour).
pub const DEFAULT_OUTPUT_RETENTION_SECS: u64 = 3600;

/// Default sweep interval, also the maximum entry age (14 hours).
pub const DEFAULT_CLEANUP_INTERVAL_HOURS: u64 = 14;

/// Retention configuration.
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Delay before a finished job's output directory is removed
    pub output_retention: Duration,
    /// Time between sweeps
    pub sweep_interval: Duration,
    /// Entries older than this are swept
    pub max_age: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        let interval = Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_HOURS * 3600);
        Self {
            output_retention: Duration::from_secs(DEFAULT_OUTPUT_RETENTION_SECS),
            sweep_interval: interval,
            max_age: interval,
        }
    }
}

impl RetentionConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let hours: u64 = std::env::var("CLEANUP_INTERVAL_HOURS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|h| *h > 0)
            .unwrap_or(DEFAULT_CLEANUP_INTERVAL_HOURS);
        let interval = Duration::from_secs(hours * 3600);

        Self {
            output_retention: Duration::from_secs(
                std::env::var("OUTPUT_RETENTION_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_OUTPUT_RETENTION_SECS),
            ),
            sweep_interval: interval,
            max_age: interval,
        }
    }
}

/// Remove `dir` after `delay`, in the background.
pub fn schedule_delete(dir: PathBuf, delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match remove_dir(&dir).await {
            Ok(()) => info!("Cleaned up output directory: {}", dir.display()),
            Err(e) => warn!("Cleanup failed for {}: {}", dir.display(), e),
        }
    })
}

/// Remove the direct entries of `dir` last modified more than `max_age` ago.
/// Returns how many were removed. A missing directory sweeps nothing.
pub async fn sweep_dir(dir: &Path, max_age: Duration) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            warn!("Sweep: failed to read {}: {}", dir.display(), e);
            return 0;
        }
    };

    let now = SystemTime::now();
    let mut removed = 0;

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Sweep: failed to list {}: {}", dir.display(), e);
                break;
            }
        };
        let path = entry.path();

        let meta = match entry.metadata().await {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Sweep: failed to stat {}: {}", path.display(), e);
                continue;
            }
        };
        let age = meta
            .modified()
            .ok()
            .and_then(|mtime| now.duration_since(mtime).ok())
            .unwrap_or_default();
        if age <= max_age {
            continue;
        }

        let result = if meta.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match result {
            Ok(()) => {
                debug!("Sweep: removed {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("Sweep: failed to remove {}: {}", path.display(), e),
        }
    }

    removed
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub downloads: usize,
    pub outputs: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.downloads + self.outputs
    }
}

/// Periodic sweeper over the download and output directories.
#[derive(Debug, Clone)]
pub struct Sweeper {
    layout: StorageLayout,
    config: RetentionConfig,
}

impl Sweeper {
    pub fn new(layout: StorageLayout, config: RetentionConfig) -> Self {
        Self { layout, config }
    }

    /// Sweep both directories once.
    pub async fn run_once(&self) -> SweepReport {
        let hours = self.config.max_age.as_secs() / 3600;
        info!("Running file sweep (removing files older than {}h)", hours);

        let report = SweepReport {
            downloads: sweep_dir(&self.layout.download_dir, self.config.max_age).await,
            outputs: sweep_dir(&self.layout.output_dir, self.config.max_age).await,
        };

        metrics::counter!("hookclip_sweeper_removed_total", "dir" => "downloads")
            .increment(report.downloads as u64);
        metrics::counter!("hookclip_sweeper_removed_total", "dir" => "output")
            .increment(report.outputs as u64);

        if report.total() > 0 {
            info!(
                downloads = report.downloads,
                outputs = report.outputs,
                "Sweep complete"
            );
        } else {
            info!("Sweep complete: nothing to clean up");
        }
        report
    }

    /// Sweep now and then every interval until `shutdown` flips to true.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "File cleanup scheduled every {} hours",
                self.config.sweep_interval.as_secs() / 3600
            );
            let mut ticker = tokio::time::interval(self.config.sweep_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("Sweeper stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn age(path: &Path, secs: u64) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(secs)).unwrap();
    }

    #[tokio::test]
    async fn test_sweep_dir_removes_old_entries() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.mp4");
        let fresh = dir.path().join("fresh.mp4");
        std::fs::write(&old, b"x").unwrap();
        std::fs::write(&fresh, b"x").unwrap();
        age(&old, 7200);

        let removed = sweep_dir(dir.path(), Duration::from_secs(3600)).await;
        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[tokio::test]
    async fn test_sweep_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(sweep_dir(&dir.path().join("missing"), Duration::ZERO).await, 0);
    }

    #[tokio::test]
    async fn test_sweeper_covers_both_dirs() {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(root.path().join("downloads"), root.path().join("output"));
        layout.ensure_dirs().await.unwrap();

        let source = layout.download_dir.join("a.mp4");
        std::fs::write(&source, b"x").unwrap();
        age(&source, 100);
        let job_dir = layout.output_dir.join("job-1");
        std::fs::create_dir_all(&job_dir).unwrap();
        std::fs::write(job_dir.join("clip_1.mp4"), b"x").unwrap();

        let config = RetentionConfig {
            max_age: Duration::from_secs(10),
            ..RetentionConfig::default()
        };
        let report = Sweeper::new(layout, config).run_once().await;
        assert_eq!(report, SweepReport { downloads: 1, outputs: 0 });
        assert!(job_dir.exists());
    }

    #[tokio::test]
    async fn test_schedule_delete() {
        let root = tempfile::tempdir().unwrap();
        let job_dir = root.path().join("job-1");
        std::fs::create_dir_all(&job_dir).unwrap();
        std::fs::write(job_dir.join("clip_1.mp4"), b"x").unwrap();

        schedule_delete(job_dir.clone(), Duration::from_millis(10)).await.unwrap();
        assert!(!job_dir.exists());
    }

    #[test]
    fn test_default_config() {
        let config = RetentionConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(14 * 3600));
        assert_eq!(config.max_age, config.sweep_interval);
        assert_eq!(config.output_retention, Duration::from_secs(3600));
    }
}
