//! Job queue: Redis Streams for production, an in-process queue for
//! single-node runs and tests.

use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::message::{Delivery, JobMessage};

/// Which queue implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueBackend {
    #[default]
    Memory,
    Redis,
}

impl FromStr for QueueBackend {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(QueueError::connection_failed(format!(
                "unknown queue backend: {}",
                other
            ))),
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Sorted set holding delayed re-deliveries, scored by due time (ms)
    pub delayed_key: String,
    /// Attempts per job, the first one included
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt
    pub backoff_base: Duration,
    /// Deliveries unacknowledged for this long are claimable by another worker
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "hookclip:jobs".to_string(),
            consumer_group: "hookclip:workers".to_string(),
            delayed_key: "hookclip:delayed".to_string(),
            max_attempts: 3,
            backoff_base: Duration::from_millis(5000),
            visibility_timeout: Duration::from_secs(3600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let redis_url = std::env::var("REDIS_URL").ok();
        // An explicit REDIS_URL implies the Redis backend unless overridden
        let backend = std::env::var("QUEUE_BACKEND")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(if redis_url.is_some() {
                QueueBackend::Redis
            } else {
                QueueBackend::Memory
            });

        Self {
            backend,
            redis_url: redis_url.unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            delayed_key: defaults.delayed_key,
            max_attempts: std::env::var("QUEUE_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_attempts),
            backoff_base: Duration::from_millis(
                std::env::var("QUEUE_BACKOFF_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5000),
            ),
            visibility_timeout: Duration::from_secs(
                std::env::var("QUEUE_VISIBILITY_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
        }
    }
}

/// At-least-once delivery of [`JobMessage`]s to a consumer group.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Prepare backing structures. Idempotent.
    async fn init(&self) -> QueueResult<()>;

    /// Make a message available immediately. Returns the delivery id.
    async fn enqueue(&self, message: &JobMessage) -> QueueResult<String>;

    /// Make a message available after `delay`.
    async fn enqueue_delayed(&self, message: &JobMessage, delay: Duration) -> QueueResult<()>;

    /// Wait up to `block_ms` for new messages.
    async fn consume(&self, consumer: &str, block_ms: u64, count: usize) -> QueueResult<Vec<Delivery>>;

    /// Mark a delivery handled.
    async fn ack(&self, delivery_id: &str) -> QueueResult<()>;

    /// Take over deliveries left unacknowledged for at least `min_idle_ms`.
    async fn claim_pending(
        &self,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    /// Messages waiting to be consumed.
    async fn len(&self) -> QueueResult<u64>;
}

/// Redis Streams queue.
pub struct RedisJobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisJobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn xadd(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        payload: &str,
    ) -> QueueResult<String> {
        let id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(payload)
            .query_async(conn)
            .await?;
        Ok(id)
    }

    /// Move due delayed messages onto the stream.
    pub async fn promote_due(&self) -> QueueResult<usize> {
        let mut conn = self.connection().await?;
        let now = chrono::Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore(&self.config.delayed_key, "-inf", now)
            .await?;

        let mut promoted = 0;
        for payload in due {
            // Only the consumer that removes the member re-publishes it
            let removed: i64 = conn.zrem(&self.config.delayed_key, &payload).await?;
            if removed == 1 {
                self.xadd(&mut conn, &payload).await?;
                promoted += 1;
            }
        }
        if promoted > 0 {
            debug!("Promoted {} delayed job(s)", promoted);
        }
        Ok(promoted)
    }

    fn parse_entries(&self, entries: Vec<redis::streams::StreamId>) -> (Vec<Delivery>, Vec<String>) {
        let mut deliveries = Vec::new();
        let mut malformed = Vec::new();
        for entry in entries {
            let parsed = entry
                .get::<String>("job")
                .and_then(|payload| serde_json::from_str::<JobMessage>(&payload).ok());
            match parsed {
                Some(message) => deliveries.push(Delivery {
                    id: entry.id,
                    message,
                }),
                None => {
                    warn!("Failed to parse job payload of message {}", entry.id);
                    malformed.push(entry.id);
                }
            }
        }
        (deliveries, malformed)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        // Create consumer group (ignore error if already exists)
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }
        Ok(())
    }

    async fn enqueue(&self, message: &JobMessage) -> QueueResult<String> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(message)?;
        let id = self.xadd(&mut conn, &payload).await?;
        info!(
            "Enqueued job {} (attempt {}) with message ID {}",
            message.job_id, message.attempt, id
        );
        Ok(id)
    }

    async fn enqueue_delayed(&self, message: &JobMessage, delay: Duration) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(message)?;
        let due = chrono::Utc::now().timestamp_millis() + delay.as_millis() as i64;
        conn.zadd::<_, _, _, ()>(&self.config.delayed_key, &payload, due)
            .await?;
        info!(
            "Scheduled job {} attempt {} in {}ms",
            message.job_id,
            message.attempt,
            delay.as_millis()
        );
        Ok(())
    }

    async fn consume(&self, consumer: &str, block_ms: u64, count: usize) -> QueueResult<Vec<Delivery>> {
        self.promote_due().await?;

        let mut conn = self.connection().await?;
        let reply: Option<redis::streams::StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let entries = reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default();
        let (deliveries, malformed) = self.parse_entries(entries);

        // Ack malformed messages so they are not redelivered forever
        for id in malformed {
            self.ack(&id).await.ok();
        }
        Ok(deliveries)
    }

    async fn ack(&self, delivery_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(delivery_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(delivery_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged job: {}", delivery_id);
        Ok(())
    }

    async fn claim_pending(
        &self,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.connection().await?;

        let pending: redis::streams::StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut claim = redis::cmd("XCLAIM");
        claim
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg(min_idle_ms);
        for entry in &pending.ids {
            claim.arg(&entry.id);
        }
        let reply: redis::streams::StreamClaimReply = claim.query_async(&mut conn).await?;

        let (deliveries, malformed) = self.parse_entries(reply.ids);
        for id in malformed {
            self.ack(&id).await.ok();
        }
        for delivery in &deliveries {
            info!("Claimed pending job {} from stream", delivery.message.job_id);
        }
        Ok(deliveries)
    }

    async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }
}

#[derive(Default)]
struct MemoryState {
    ready: VecDeque<Delivery>,
    /// Consumed but unacknowledged, with the time of (re)delivery
    pending: HashMap<String, (Delivery, Instant)>,
}

#[derive(Default)]
struct MemoryInner {
    state: Mutex<MemoryState>,
    notify: Notify,
    next_id: AtomicU64,
}

impl MemoryInner {
    async fn push(&self, message: JobMessage) -> String {
        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.state.lock().await.ready.push_back(Delivery {
            id: id.clone(),
            message,
        });
        self.notify.notify_one();
        id
    }
}

/// In-process queue with the same delivery semantics as [`RedisJobQueue`],
/// minus durability across restarts.
#[derive(Clone, Default)]
pub struct MemoryJobQueue {
    inner: Arc<MemoryInner>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries consumed but not yet acknowledged.
    pub async fn pending_len(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn init(&self) -> QueueResult<()> {
        Ok(())
    }

    async fn enqueue(&self, message: &JobMessage) -> QueueResult<String> {
        let id = self.inner.push(message.clone()).await;
        debug!("Enqueued job {} (attempt {}) as {}", message.job_id, message.attempt, id);
        Ok(id)
    }

    async fn enqueue_delayed(&self, message: &JobMessage, delay: Duration) -> QueueResult<()> {
        let inner = Arc::clone(&self.inner);
        let message = message.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.push(message).await;
        });
        Ok(())
    }

    async fn consume(&self, _consumer: &str, block_ms: u64, count: usize) -> QueueResult<Vec<Delivery>> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(block_ms);
        loop {
            let notified = self.inner.notify.notified();
            {
                let mut state = self.inner.state.lock().await;
                let take = count.min(state.ready.len());
                if take > 0 {
                    let batch: Vec<Delivery> = state.ready.drain(..take).collect();
                    let now = Instant::now();
                    for delivery in &batch {
                        state
                            .pending
                            .insert(delivery.id.clone(), (delivery.clone(), now));
                    }
                    return Ok(batch);
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, delivery_id: &str) -> QueueResult<()> {
        self.inner.state.lock().await.pending.remove(delivery_id);
        Ok(())
    }

    async fn claim_pending(
        &self,
        _consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let min_idle = Duration::from_millis(min_idle_ms);
        let now = Instant::now();
        let mut state = self.inner.state.lock().await;
        let mut claimed = Vec::new();
        for (delivery, delivered_at) in state.pending.values_mut() {
            if claimed.len() >= count {
                break;
            }
            if now.duration_since(*delivered_at) >= min_idle {
                *delivered_at = now;
                claimed.push(delivery.clone());
            }
        }
        Ok(claimed)
    }

    async fn len(&self) -> QueueResult<u64> {
        Ok(self.inner.state.lock().await.ready.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookclip_models::JobId;

    fn message(id: &str) -> JobMessage {
        JobMessage::new(JobId::from_string(id), 1)
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("redis".parse::<QueueBackend>().unwrap(), QueueBackend::Redis);
        assert_eq!("Memory".parse::<QueueBackend>().unwrap(), QueueBackend::Memory);
        assert!("kafka".parse::<QueueBackend>().is_err());
    }

    #[tokio::test]
    async fn test_memory_fifo_and_ack() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(&message("a")).await.unwrap();
        queue.enqueue(&message("b")).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 2);

        let batch = queue.consume("w", 10, 1).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].message.job_id.as_str(), "a");
        assert_eq!(queue.pending_len().await, 1);

        queue.ack(&batch[0].id).await.unwrap();
        assert_eq!(queue.pending_len().await, 0);

        let batch = queue.consume("w", 10, 5).await.unwrap();
        assert_eq!(batch[0].message.job_id.as_str(), "b");
    }

    #[tokio::test]
    async fn test_memory_consume_times_out_empty() {
        let queue = MemoryJobQueue::new();
        let batch = queue.consume("w", 20, 1).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_memory_consume_wakes_on_enqueue() {
        let queue = MemoryJobQueue::new();
        let consumer = queue.clone();
        let handle = tokio::spawn(async move { consumer.consume("w", 2000, 1).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(&message("late")).await.unwrap();
        let batch = handle.await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_delayed_delivery() {
        let queue = MemoryJobQueue::new();
        queue
            .enqueue_delayed(&message("later").next_attempt(), Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(queue.len().await.unwrap(), 0);

        let batch = queue.consume("w", 1000, 1).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].message.attempt, 2);
    }

    #[tokio::test]
    async fn test_memory_claim_pending() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(&message("stuck")).await.unwrap();
        let first = queue.consume("crashed", 10, 1).await.unwrap();

        assert!(queue.claim_pending("w", 60_000, 10).await.unwrap().is_empty());
        let claimed = queue.claim_pending("w", 0, 10).await.unwrap();
        assert_eq!(claimed, first);
    }
}
