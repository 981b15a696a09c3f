//! Job record persistence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hookclip_models::{Job, JobId, Stage};
use redis::AsyncCommands;
use tokio::sync::RwLock;

use crate::error::QueueResult;

/// Durable job records, keyed by id.
///
/// Cancellation requests live beside the record, not in it, so a worker
/// writing its own copy of the job never clears a request made elsewhere.
/// `get` reports a request for the job's current attempt in
/// `Job::cancel_requested`.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, id: &JobId) -> QueueResult<Option<Job>>;

    /// Insert or replace. Leaves cancellation requests untouched.
    async fn put(&self, job: &Job) -> QueueResult<()>;

    /// Ask whoever runs `attempt` of the job to stop.
    async fn request_cancel(&self, id: &JobId, attempt: u32) -> QueueResult<()>;

    /// Whether cancellation of `attempt` was requested.
    async fn cancel_requested(&self, id: &JobId, attempt: u32) -> QueueResult<bool>;

    /// All jobs, newest first.
    async fn list(&self) -> QueueResult<Vec<Job>>;

    /// Jobs in `stage`, newest first.
    async fn list_by_stage(&self, stage: Stage) -> QueueResult<Vec<Job>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|j| j.stage == stage)
            .collect())
    }
}

fn newest_first(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
}

/// In-process store.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
    /// Job id to the attempt asked to stop
    cancels: Arc<RwLock<HashMap<JobId, u32>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get(&self, id: &JobId) -> QueueResult<Option<Job>> {
        let Some(mut job) = self.jobs.read().await.get(id).cloned() else {
            return Ok(None);
        };
        job.cancel_requested = self.cancel_requested(id, job.attempt).await?;
        Ok(Some(job))
    }

    async fn put(&self, job: &Job) -> QueueResult<()> {
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn request_cancel(&self, id: &JobId, attempt: u32) -> QueueResult<()> {
        self.cancels.write().await.insert(id.clone(), attempt);
        Ok(())
    }

    async fn cancel_requested(&self, id: &JobId, attempt: u32) -> QueueResult<bool> {
        Ok(self.cancels.read().await.get(id) == Some(&attempt))
    }

    async fn list(&self) -> QueueResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        newest_first(&mut jobs);
        Ok(jobs)
    }
}

/// Redis store: one JSON document per job plus an index set.
pub struct RedisJobStore {
    client: redis::Client,
    prefix: String,
}

impl RedisJobStore {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            prefix: "hookclip".to_string(),
        })
    }

    fn job_key(&self, id: &JobId) -> String {
        format!("{}:job:{}", self.prefix, id)
    }

    fn index_key(&self) -> String {
        format!("{}:jobs", self.prefix)
    }

    fn cancel_key(&self, id: &JobId) -> String {
        format!("{}:cancel:{}", self.prefix, id)
    }
}

/// Cancellation markers outlive any job run.
const CANCEL_MARKER_TTL_SECS: u64 = 7 * 24 * 3600;

#[async_trait]
impl JobStore for RedisJobStore {
    async fn get(&self, id: &JobId) -> QueueResult<Option<Job>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let (payload, marker): (Option<String>, Option<u32>) = redis::pipe()
            .get(self.job_key(id))
            .get(self.cancel_key(id))
            .query_async(&mut conn)
            .await?;
        let Some(json) = payload else {
            return Ok(None);
        };
        let mut job: Job = serde_json::from_str(&json)?;
        job.cancel_requested = marker == Some(job.attempt);
        Ok(Some(job))
    }

    async fn put(&self, job: &Job) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(job)?;
        redis::pipe()
            .atomic()
            .set(self.job_key(&job.id), payload)
            .ignore()
            .sadd(self.index_key(), job.id.as_str())
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn request_cancel(&self, id: &JobId, attempt: u32) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(self.cancel_key(id), attempt, CANCEL_MARKER_TTL_SECS)
            .await?;
        Ok(())
    }

    async fn cancel_requested(&self, id: &JobId, attempt: u32) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let marker: Option<u32> = conn.get(self.cancel_key(id)).await?;
        Ok(marker == Some(attempt))
    }

    async fn list(&self) -> QueueResult<Vec<Job>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let ids: Vec<String> = conn.smembers(self.index_key()).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .iter()
            .map(|id| self.job_key(&JobId::from_string(id.as_str())))
            .collect();
        let payloads: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(&mut conn).await?;

        let mut jobs = Vec::with_capacity(payloads.len());
        for json in payloads.into_iter().flatten() {
            jobs.push(serde_json::from_str::<Job>(&json)?);
        }
        newest_first(&mut jobs);
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookclip_models::{JobSpec, SourceMeta, SourceRef};

    fn job(url: &str) -> Job {
        let spec = JobSpec::new(SourceRef::Url {
            url: url.to_string(),
        });
        Job::new(spec, SourceMeta::default())
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryJobStore::new();
        let mut j = job("https://youtu.be/dQw4w9WgXcQ");
        store.put(&j).await.unwrap();

        j.advance(Stage::Downloading, 5);
        store.put(&j).await.unwrap();

        let loaded = store.get(&j.id).await.unwrap().unwrap();
        assert_eq!(loaded.stage, Stage::Downloading);
        assert!(store.get(&JobId::from_string("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_by_stage() {
        let store = MemoryJobStore::new();
        let a = job("https://a.example/v.mp4");
        let mut b = job("https://b.example/v.mp4");
        b.fail("boom");
        store.put(&a).await.unwrap();
        store.put(&b).await.unwrap();

        assert_eq!(store.list().await.unwrap().len(), 2);
        let failed = store.list_by_stage(Stage::Failed).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, b.id);
    }

    #[tokio::test]
    async fn test_cancel_request_survives_put() {
        let store = MemoryJobStore::new();
        let mut j = job("https://youtu.be/dQw4w9WgXcQ");
        j.advance(Stage::Downloading, 5);
        store.put(&j).await.unwrap();

        store.request_cancel(&j.id, 1).await.unwrap();
        // A worker writes its own copy without the flag
        j.advance(Stage::Analyzing, 30);
        store.put(&j).await.unwrap();

        let loaded = store.get(&j.id).await.unwrap().unwrap();
        assert!(loaded.cancel_requested);
        assert_eq!(loaded.stage, Stage::Analyzing);
        assert!(store.cancel_requested(&j.id, 1).await.unwrap());

        // The next attempt starts clean
        j.fail("Cancelled by user");
        j.begin_attempt(2);
        store.put(&j).await.unwrap();
        assert!(!store.get(&j.id).await.unwrap().unwrap().cancel_requested);
    }
}
