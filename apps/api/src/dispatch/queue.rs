//! Primary dispatch substrate: a Redis list worked by a pool of consumers.
//!
//! Submission is an `LPUSH` of the job id; workers `BRPOP` and invoke the
//! shared execution entry point. Durability and delivery are Redis's
//! concern; duplicate delivery is harmless because the Job Store's CAS
//! transition already fences it.

use std::str::FromStr;

use async_trait::async_trait;
use redis::AsyncCommands;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dispatch::{execute_job, ExecutionContext};

pub const DEFAULT_QUEUE_KEY: &str = "evaluation_queue";
const BRPOP_TIMEOUT_SECS: f64 = 5.0;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Submission side of the primary substrate.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn push(&self, job_id: Uuid) -> Result<(), QueueError>;

    /// Number of jobs waiting in the queue, for the health probe.
    async fn depth(&self) -> Result<usize, QueueError>;
}

pub struct RedisJobQueue {
    client: redis::Client,
    queue_key: String,
}

impl RedisJobQueue {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            queue_key: DEFAULT_QUEUE_KEY.to_string(),
        }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn push(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.lpush::<_, _, ()>(&self.queue_key, job_id.to_string())
            .await?;
        debug!(%job_id, "job pushed to primary queue");
        Ok(())
    }

    async fn depth(&self) -> Result<usize, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let depth: usize = conn.llen(&self.queue_key).await?;
        Ok(depth)
    }
}

/// Starts `count` queue consumers. Each holds its own connection and loops
/// `BRPOP` until process shutdown.
pub fn spawn_workers(count: usize, client: redis::Client, ctx: ExecutionContext) {
    for worker in 0..count {
        let client = client.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            info!("queue worker {worker} started");
            let mut conn = loop {
                match client.get_multiplexed_async_connection().await {
                    Ok(conn) => break conn,
                    Err(e) => {
                        warn!("queue worker {worker}: redis unavailable, retrying: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    }
                }
            };

            loop {
                let popped: Result<Option<(String, String)>, _> =
                    conn.brpop(DEFAULT_QUEUE_KEY, BRPOP_TIMEOUT_SECS).await;
                match popped {
                    Ok(Some((_key, raw))) => match Uuid::from_str(&raw) {
                        Ok(job_id) => execute_job(&ctx, job_id).await,
                        Err(_) => error!("queue worker {worker}: dropping malformed id {raw:?}"),
                    },
                    Ok(None) => {} // timeout, poll again
                    Err(e) => {
                        warn!("queue worker {worker}: pop failed, backing off: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    }
                }
            }
        });
    }
}
