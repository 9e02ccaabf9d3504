//! Task Dispatcher — guaranteed-eventual execution for accepted jobs.
//!
//! `submit` hands the job id to the primary Redis queue; any submission-time
//! error falls back to the in-process executor, so submission never raises
//! past accepting the job. Whichever substrate runs the job enters through
//! `execute_job`, where the Job Store's `Queued → Processing` CAS acts as
//! the de-duplication fence: if both paths somehow fire, the loser gets a
//! `StaleTransition` and backs off silently.

pub mod local;
pub mod queue;

use std::sync::Arc;

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::dispatch::local::LocalExecutor;
use crate::dispatch::queue::JobQueue;
use crate::models::job::JobStatus;
use crate::pipeline::Pipeline;
use crate::store::{DocumentStore, JobStore, TransitionPayload};

/// Everything the execution entry point needs, cloneable across workers.
#[derive(Clone)]
pub struct ExecutionContext {
    pub jobs: Arc<dyn JobStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub pipeline: Arc<Pipeline>,
}

pub struct Dispatcher {
    primary: Arc<dyn JobQueue>,
    fallback: LocalExecutor,
    ctx: ExecutionContext,
}

impl Dispatcher {
    pub fn new(primary: Arc<dyn JobQueue>, fallback: LocalExecutor, ctx: ExecutionContext) -> Self {
        Self {
            primary,
            fallback,
            ctx,
        }
    }

    /// Accepts the job unconditionally: primary queue first, local executor
    /// when the queue is unreachable. Exactly one path will run the job;
    /// even if both fired, the CAS in `execute_job` makes the second a
    /// no-op.
    pub async fn submit(&self, job_id: Uuid) {
        match self.primary.push(job_id).await {
            Ok(()) => debug!(%job_id, "job submitted to primary substrate"),
            Err(e) => {
                warn!(%job_id, "primary substrate unavailable, falling back to local executor: {e}");
                self.fallback.spawn(self.ctx.clone(), job_id);
            }
        }
    }
}

/// Execution entry point, invoked by queue workers and the local executor
/// alike. Claims the job, runs the pipeline, records the terminal state.
/// Nothing propagates out of here; every failure lands in the job record.
pub async fn execute_job(ctx: &ExecutionContext, job_id: Uuid) {
    let job = match ctx
        .jobs
        .transition(
            job_id,
            JobStatus::Queued,
            JobStatus::Processing,
            TransitionPayload::None,
        )
        .await
    {
        Ok(job) => job,
        Err(e) if e.is_stale() => {
            // Duplicate delivery: another executor already claimed the job.
            debug!(%job_id, "skipping duplicate delivery: {e}");
            return;
        }
        Err(e) => {
            error!(%job_id, "could not claim job: {e}");
            return;
        }
    };

    let outcome = ctx.pipeline.run(&job, ctx.documents.as_ref()).await;

    let (to, payload) = match outcome {
        Ok(result) => (JobStatus::Completed, TransitionPayload::Completed(result)),
        Err(e) => {
            warn!(%job_id, "pipeline failed: {e}");
            (JobStatus::Failed, TransitionPayload::Failed(e.to_string()))
        }
    };

    if let Err(e) = ctx
        .jobs
        .transition(job_id, JobStatus::Processing, to, payload)
        .await
    {
        // Only reachable if something else mutated a processing job, which
        // the lease invariant forbids.
        error!(%job_id, "failed to record terminal state: {e}");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::queue::QueueError;
    use super::*;
    use crate::evaluator::EvaluatorError;
    use crate::pipeline::testing::{seed_job, StubEvaluator, StubRetriever};
    use crate::retry::RetryPolicy;
    use crate::store::memory::{MemoryDocumentStore, MemoryJobStore};
    use crate::store::StoreError;

    /// Queue stub that either records pushes or refuses them.
    struct StubQueue {
        down: bool,
        pushed: Mutex<Vec<Uuid>>,
    }

    impl StubQueue {
        fn up() -> Self {
            Self {
                down: false,
                pushed: Mutex::new(vec![]),
            }
        }

        fn down() -> Self {
            Self {
                down: true,
                pushed: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl JobQueue for StubQueue {
        async fn push(&self, job_id: Uuid) -> Result<(), QueueError> {
            if self.down {
                return Err(QueueError::Redis(redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "connection refused",
                ))));
            }
            self.pushed.lock().unwrap().push(job_id);
            Ok(())
        }

        async fn depth(&self) -> Result<usize, QueueError> {
            Ok(self.pushed.lock().unwrap().len())
        }
    }

    fn context(evaluator: Arc<StubEvaluator>) -> (ExecutionContext, Arc<MemoryDocumentStore>) {
        let docs = Arc::new(MemoryDocumentStore::new());
        let jobs: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(StubRetriever { down: false }),
            evaluator,
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                jitter: false,
            },
        ));
        (
            ExecutionContext {
                jobs,
                documents: Arc::clone(&docs) as Arc<dyn DocumentStore>,
                pipeline,
            },
            docs,
        )
    }

    async fn wait_for_terminal(ctx: &ExecutionContext, job_id: Uuid) -> JobStatus {
        for _ in 0..200 {
            let job = ctx.jobs.get(job_id).await.unwrap();
            if job.status.is_terminal() {
                return job.status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never reached a terminal state");
    }

    #[tokio::test]
    async fn test_execute_runs_pipeline_to_completed() {
        let evaluator = Arc::new(StubEvaluator::happy());
        let (ctx, docs) = context(Arc::clone(&evaluator));
        let (job, _, _) = seed_job(&docs, ctx.jobs.as_ref()).await;

        execute_job(&ctx, job.id).await;

        let job = ctx.jobs.get(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempt_count, 1);
        let result = job.result.unwrap();
        assert_eq!(result.cv_match_rate, 0.82);
        assert_eq!(result.project_score, 4.5);
        assert!(job.error_detail.is_none());
    }

    #[tokio::test]
    async fn test_pipeline_failure_becomes_job_failure() {
        let evaluator = Arc::new(StubEvaluator::scripted(99, || EvaluatorError::Auth));
        let (ctx, docs) = context(Arc::clone(&evaluator));
        let (job, _, _) = seed_job(&docs, ctx.jobs.as_ref()).await;

        execute_job(&ctx, job.id).await;

        let job = ctx.jobs.get(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.result.is_none());
        let detail = job.error_detail.unwrap();
        assert!(detail.contains("cv stage failed"), "detail: {detail}");
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_idempotent() {
        let evaluator = Arc::new(StubEvaluator::happy());
        let (ctx, docs) = context(Arc::clone(&evaluator));
        let (job, _, _) = seed_job(&docs, ctx.jobs.as_ref()).await;

        // Primary and fallback racing on the same job id.
        let first = execute_job(&ctx, job.id);
        let second = execute_job(&ctx, job.id);
        tokio::join!(first, second);

        let job = ctx.jobs.get(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        // Exactly one claim won; the pipeline ran exactly once.
        assert_eq!(job.attempt_count, 1);
        assert_eq!(evaluator.cv_calls.load(Ordering::SeqCst), 1);
        assert_eq!(evaluator.synthesis_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_on_unknown_job_is_a_quiet_noop() {
        let evaluator = Arc::new(StubEvaluator::happy());
        let (ctx, _docs) = context(Arc::clone(&evaluator));
        execute_job(&ctx, Uuid::new_v4()).await;
        assert_eq!(evaluator.cv_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_submit_prefers_primary_queue() {
        let evaluator = Arc::new(StubEvaluator::happy());
        let (ctx, docs) = context(evaluator);
        let (job, _, _) = seed_job(&docs, ctx.jobs.as_ref()).await;

        let queue = Arc::new(StubQueue::up());
        let dispatcher = Dispatcher::new(
            Arc::clone(&queue) as Arc<dyn JobQueue>,
            LocalExecutor::new(4),
            ctx.clone(),
        );

        dispatcher.submit(job.id).await;

        assert_eq!(queue.pushed.lock().unwrap().as_slice(), &[job.id]);
        // Nothing ran locally; the job is still queued for the workers.
        assert_eq!(ctx.jobs.get(job.id).await.unwrap().status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_submit_falls_back_when_queue_is_down() {
        let evaluator = Arc::new(StubEvaluator::happy());
        let (ctx, docs) = context(evaluator);
        let (job, _, _) = seed_job(&docs, ctx.jobs.as_ref()).await;

        let dispatcher = Dispatcher::new(
            Arc::new(StubQueue::down()) as Arc<dyn JobQueue>,
            LocalExecutor::new(4),
            ctx.clone(),
        );

        dispatcher.submit(job.id).await;

        // The fallback executor completes the job within bounded time.
        assert_eq!(wait_for_terminal(&ctx, job.id).await, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_fallback_respects_concurrency_bound() {
        // A 1-permit executor still runs every spawned job, one at a time.
        let evaluator = Arc::new(StubEvaluator::happy());
        let (ctx, docs) = context(Arc::clone(&evaluator));

        let executor = LocalExecutor::new(1);
        let mut ids = Vec::new();
        for _ in 0..4 {
            let (job, _, _) = seed_job(&docs, ctx.jobs.as_ref()).await;
            ids.push(job.id);
        }
        for id in &ids {
            executor.spawn(ctx.clone(), *id);
        }
        for id in ids {
            assert_eq!(wait_for_terminal(&ctx, id).await, JobStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_terminal_state_is_exclusive() {
        // Run many jobs concurrently; each must land in exactly one terminal
        // state with result/error consistency.
        let evaluator = Arc::new(StubEvaluator::happy());
        let (ctx, docs) = context(evaluator);

        let mut ids = Vec::new();
        for _ in 0..8 {
            let (job, _, _) = seed_job(&docs, ctx.jobs.as_ref()).await;
            ids.push(job.id);
        }
        let mut handles = Vec::new();
        for id in &ids {
            let ctx = ctx.clone();
            let id = *id;
            handles.push(tokio::spawn(async move { execute_job(&ctx, id).await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for id in ids {
            let job = ctx.jobs.get(id).await.unwrap();
            assert_eq!(job.status, JobStatus::Completed);
            assert!(job.result.is_some());
            assert!(job.error_detail.is_none());
        }
    }

    #[tokio::test]
    async fn test_claim_failure_other_than_stale_aborts() {
        // A store that refuses claims must not run the pipeline.
        struct RefusingStore;

        #[async_trait]
        impl JobStore for RefusingStore {
            async fn create(
                &self,
                job: crate::models::job::EvaluationJob,
            ) -> Result<crate::models::job::EvaluationJob, StoreError> {
                Ok(job)
            }

            async fn transition(
                &self,
                _id: Uuid,
                _from: JobStatus,
                _to: JobStatus,
                _payload: TransitionPayload,
            ) -> Result<crate::models::job::EvaluationJob, StoreError> {
                Err(StoreError::Database(sqlx::Error::PoolClosed))
            }

            async fn get(
                &self,
                id: Uuid,
            ) -> Result<crate::models::job::EvaluationJob, StoreError> {
                Err(StoreError::NotFound(format!("job {id}")))
            }
        }

        let evaluator = Arc::new(StubEvaluator::happy());
        let (mut ctx, _docs) = context(Arc::clone(&evaluator));
        ctx.jobs = Arc::new(RefusingStore);

        execute_job(&ctx, Uuid::new_v4()).await;
        assert_eq!(evaluator.cv_calls.load(Ordering::SeqCst), 0);
    }
}
