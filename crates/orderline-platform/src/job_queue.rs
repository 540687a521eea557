//! Redis-list job queue.
//!
//! Producers `LPUSH` serialized jobs onto `<queue>:pending`. A worker `BLMOVE`s
//! the oldest job onto its own `<queue>:processing:<worker>` list, so a job is
//! never lost between being taken and being finished. `ack` drops it from the
//! processing list; `fail` puts it back on pending with one more attempt, or
//! onto `<queue>:failed` once attempts run out. Jobs left on a processing list
//! by a crashed worker are returned to pending by [`RedisJobQueue::recover`].

use std::{collections::HashMap, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use orderline_core::{Job, JobQueue};
use redis::{AsyncCommands, Client, Direction};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;

pub struct RedisJobQueue {
    client: Client,
    pending_key: String,
    processing_key: String,
    failed_key: String,
    max_attempts: u32,
    // Raw list entries of reserved jobs, needed verbatim for LREM.
    reserved: Mutex<HashMap<Uuid, String>>,
}

#[derive(Serialize)]
struct FailedJob<'a> {
    job: &'a Job,
    reason: &'a str,
}

impl RedisJobQueue {
    pub fn new(client: Client, config: &QueueConfig) -> Self {
        Self {
            client,
            pending_key: format!("{}:pending", config.name),
            processing_key: format!("{}:processing:{}", config.name, config.worker_id),
            failed_key: format!("{}:failed", config.name),
            max_attempts: config.max_attempts.max(1),
            reserved: Mutex::default(),
        }
    }

    /// Moves every job this worker had reserved back onto pending.
    pub async fn recover(&self) -> Result<usize> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let mut recovered = 0;
        loop {
            let moved: Option<String> = connection
                .lmove(
                    &self.processing_key,
                    &self.pending_key,
                    Direction::Left,
                    Direction::Right,
                )
                .await?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }
        if recovered > 0 {
            info!("requeued {recovered} job(s) left on {}", self.processing_key);
        }
        Ok(recovered)
    }

    async fn release(&self, job: &Job) -> Result<Option<String>> {
        let raw = self.reserved.lock().await.remove(&job.id);
        let Some(raw) = raw else {
            warn!("job {} was not reserved by this worker", job.id);
            return Ok(None);
        };

        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let _: i64 = connection.lrem(&self.processing_key, 1, &raw).await?;
        Ok(Some(raw))
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &Job) -> Result<()> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(job)?;
        let _: i64 = connection.lpush(&self.pending_key, serialized).await?;
        Ok(())
    }

    async fn enqueue_bulk(&self, jobs: &[Job]) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for job in jobs {
            pipe.lpush(&self.pending_key, serde_json::to_string(job)?)
                .ignore();
        }

        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let _: () = pipe.query_async(&mut connection).await?;
        Ok(())
    }

    async fn next_job(&self, timeout: Duration) -> Result<Option<Job>> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = connection
            .blmove(
                &self.pending_key,
                &self.processing_key,
                Direction::Right,
                Direction::Left,
                timeout.as_secs_f64(),
            )
            .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let job: Job = match serde_json::from_str(&raw) {
            Ok(job) => job,
            Err(err) => {
                // Unreadable entries can never succeed; park them as-is.
                warn!("dropping malformed job from {}: {err}", self.pending_key);
                let _: i64 = connection.lrem(&self.processing_key, 1, &raw).await?;
                let _: i64 = connection.lpush(&self.failed_key, &raw).await?;
                return Ok(None);
            }
        };

        self.reserved.lock().await.insert(job.id, raw);
        Ok(Some(job))
    }

    async fn ack(&self, job: &Job) -> Result<()> {
        self.release(job).await?;
        Ok(())
    }

    async fn fail(&self, job: &Job, reason: &str, retry: bool) -> Result<bool> {
        self.release(job).await?;

        let mut next = job.clone();
        next.attempts += 1;

        let mut connection = self.client.get_multiplexed_async_connection().await?;
        if !retry || next.attempts >= self.max_attempts {
            let parked = serde_json::to_string(&FailedJob { job: &next, reason })?;
            let _: i64 = connection
                .lpush(&self.failed_key, parked)
                .await
                .context("failed to park job")?;
            return Ok(true);
        }

        let _: i64 = connection
            .lpush(&self.pending_key, serde_json::to_string(&next)?)
            .await
            .context("failed to requeue job")?;
        Ok(false)
    }
}
