//! Fallback executor: runs jobs as in-process tokio tasks.
//!
//! Used when the primary queue is unreachable at submission time. A
//! semaphore bounds concurrent fallback runs so a Redis outage cannot turn
//! into an unbounded task pile-up.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;
use uuid::Uuid;

use crate::dispatch::{execute_job, ExecutionContext};

#[derive(Clone)]
pub struct LocalExecutor {
    permits: Arc<Semaphore>,
}

impl LocalExecutor {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrency)),
        }
    }

    /// Schedules the job on the local runtime and returns immediately.
    pub fn spawn(&self, ctx: ExecutionContext, job_id: Uuid) {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            // The semaphore is never closed, so acquire only fails at
            // shutdown; dropping the job there is fine.
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            debug!(%job_id, "running job on local fallback executor");
            execute_job(&ctx, job_id).await;
        });
    }
}
