//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use hookclip_queue::Delivery;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::pipeline::{run_job, RunOutcome};
use crate::retry::{FailureTracker, RetryPolicy};

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    ctx: Arc<WorkerContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
    policy: RetryPolicy,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(ctx.config.concurrency));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());
        let policy = RetryPolicy::new(
            ctx.config.max_attempts,
            ctx.config.backoff_base,
            ctx.config.backoff_max,
        );

        Self {
            ctx,
            job_semaphore,
            shutdown,
            consumer_name,
            policy,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Start the executor.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.ctx.config.concurrency
        );

        self.ctx.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        // Periodically pick up deliveries orphaned by dead workers
        let ctx = Arc::clone(&self.ctx);
        let consumer_name = self.consumer_name.clone();
        let semaphore = Arc::clone(&self.job_semaphore);
        let policy = self.policy.clone();
        let mut shutdown_rx_claim = self.shutdown.subscribe();

        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(ctx.config.claim_interval);
            let min_idle_ms = ctx.config.claim_min_idle.as_millis() as u64;
            let mut failures = FailureTracker::new(3);
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match ctx.queue.claim_pending(&consumer_name, min_idle_ms, 5).await {
                            Ok(deliveries) => {
                                failures.record_success();
                                if !deliveries.is_empty() {
                                    info!("Claimed {} pending jobs", deliveries.len());
                                }
                                for delivery in deliveries {
                                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                        break;
                                    };
                                    let ctx = Arc::clone(&ctx);
                                    let policy = policy.clone();
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_job(ctx, policy, delivery, true).await;
                                    });
                                }
                            }
                            Err(e) => {
                                if failures.record_failure() {
                                    warn!("Failed to claim pending jobs: {}", e);
                                }
                            }
                        }
                    }
                }
            }
        });

        // Main job consumption loop
        let mut failures = FailureTracker::new(3);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    match result {
                        Ok(()) => failures.record_success(),
                        Err(e) => {
                            if failures.record_failure() {
                                error!("Error consuming jobs: {}", e);
                            }
                            // Back off on error
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.ctx.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!("In-flight jobs still running after shutdown timeout");
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Consume and process jobs from the queue.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .ctx
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;

        if deliveries.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", deliveries.len());

        for delivery in deliveries {
            let ctx = Arc::clone(&self.ctx);
            let policy = self.policy.clone();
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::config_error("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, policy, delivery, false).await;
            });
        }

        Ok(())
    }

    /// Run one delivery, acknowledge it and schedule the next attempt if due.
    async fn execute_job(ctx: Arc<WorkerContext>, policy: RetryPolicy, delivery: Delivery, reclaimed: bool) {
        let message = delivery.message;
        let job_id = message.job_id.clone();
        info!("Executing job {} (attempt {})", job_id, message.attempt);

        let cancel = ctx.cancels.register(&job_id);
        let result = run_job(&ctx, &message, reclaimed, cancel).await;
        ctx.cancels.unregister(&job_id);

        // The attempt is over either way; a retry travels as a new message
        if let Err(e) = ctx.queue.ack(&delivery.id).await {
            error!("Failed to ack job {}: {}", job_id, e);
        }

        match result {
            Ok(RunOutcome::Completed { clip_count }) => {
                info!("Job {} completed with {} clip(s)", job_id, clip_count);
                ctx.progress.close_after_grace(&job_id);
            }
            Ok(RunOutcome::Skipped { .. }) => {}
            Err(e) if e.is_retryable() && policy.should_retry(message.attempt) => {
                let delay = policy.delay_after(message.attempt);
                let next = message.next_attempt();
                warn!(
                    "Job {} failed: {}. Attempt {}/{} scheduled in {:?}",
                    job_id, e, next.attempt, policy.max_attempts, delay
                );
                match ctx.queue.enqueue_delayed(&next, delay).await {
                    Ok(()) => metrics::record_job_retried(),
                    Err(qe) => {
                        error!("Failed to schedule retry of job {}: {}", job_id, qe);
                        ctx.progress.close_after_grace(&job_id);
                    }
                }
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!(
                        "Job {} exhausted {} attempts, leaving it failed: {}",
                        job_id, policy.max_attempts, e
                    );
                } else {
                    info!("Job {} failed permanently: {}", job_id, e);
                }
                ctx.progress.close_after_grace(&job_id);
            }
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.ctx.config.concurrency {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{harness, url_job};
    use hookclip_models::Stage;
    use hookclip_queue::JobMessage;

    async fn wait_for_stage(ctx: &WorkerContext, job: &hookclip_models::Job, stage: Stage, attempt: u32) {
        for _ in 0..200 {
            let stored = ctx.store.get(&job.id).await.unwrap().unwrap();
            if stored.stage == stage && stored.attempt == attempt {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job never reached {} on attempt {}", stage, attempt);
    }

    #[tokio::test]
    async fn test_executor_processes_queued_job() {
        let h = harness().await;
        let job = url_job(120.0);
        h.ctx.store.put(&job).await.unwrap();
        h.ctx.queue.enqueue(&JobMessage::new(job.id.clone(), 1)).await.unwrap();

        let executor = Arc::new(JobExecutor::new(Arc::clone(&h.ctx)));
        let runner = tokio::spawn({
            let executor = Arc::clone(&executor);
            async move { executor.run().await }
        });

        wait_for_stage(&h.ctx, &job, Stage::Completed, 1).await;
        assert_eq!(h.queue.pending_len().await, 0);

        executor.shutdown();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failed_attempts_are_redelivered_until_exhausted() {
        let h = harness().await;
        h.renderer.fail_renders();
        let job = url_job(120.0);
        h.ctx.store.put(&job).await.unwrap();
        h.ctx.queue.enqueue(&JobMessage::new(job.id.clone(), 1)).await.unwrap();

        let executor = Arc::new(JobExecutor::new(Arc::clone(&h.ctx)));
        let runner = tokio::spawn({
            let executor = Arc::clone(&executor);
            async move { executor.run().await }
        });

        wait_for_stage(&h.ctx, &job, Stage::Failed, 3).await;
        // No fourth attempt
        tokio::time::sleep(Duration::from_millis(300)).await;
        let stored = h.ctx.store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.attempt, 3);
        assert_eq!(stored.history.len(), 2);
        assert_eq!(h.renderer.render_count(), 3);

        executor.shutdown();
        runner.await.unwrap().unwrap();
    }
}
