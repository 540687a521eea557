use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    pub fn new<T: Serialize>(name: &str, payload: &T) -> anyhow::Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            payload: serde_json::to_value(payload)?,
            attempts: 0,
            enqueued_at: Utc::now(),
        })
    }
}

/// Persistent at-least-once job queue.
///
/// A job handed out by [`JobQueue::next_job`] stays reserved until it is
/// acked or failed; jobs still reserved when a worker dies are delivered
/// again.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &Job) -> anyhow::Result<()>;
    async fn enqueue_bulk(&self, jobs: &[Job]) -> anyhow::Result<()>;
    /// Waits up to `timeout` for the next job.
    async fn next_job(&self, timeout: Duration) -> anyhow::Result<Option<Job>>;
    async fn ack(&self, job: &Job) -> anyhow::Result<()>;
    /// Requeues the job, or parks it on the failed list once its attempts are
    /// used up or when `retry` is false. Returns `true` when the job was
    /// parked.
    async fn fail(&self, job: &Job, reason: &str, retry: bool) -> anyhow::Result<bool>;
}

/// Fire-and-forget pub/sub publishing.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: String) -> anyhow::Result<()>;
}
