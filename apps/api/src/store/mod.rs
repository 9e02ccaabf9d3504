//! Job Store and Document Store boundaries.
//!
//! The Job Store is the authoritative state machine for evaluation jobs. Its
//! `transition` operation has compare-and-set semantics on `status`: that
//! atomicity is the de-duplication fence the dispatcher relies on when the
//! primary and fallback execution paths race — the losing `Queued →
//! Processing` attempt fails with `StaleTransition` and becomes a no-op.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::document::{Document, DocumentKind};
use crate::models::job::{EvaluationJob, EvaluationResult, JobStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Stale transition: expected {expected}, job was {actual}")]
    StaleTransition {
        expected: JobStatus,
        actual: JobStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Stale CAS attempts are the expected outcome of a dispatch race and
    /// are swallowed at the execution boundary.
    pub fn is_stale(&self) -> bool {
        matches!(self, StoreError::StaleTransition { .. })
    }
}

/// Payload applied alongside a status transition.
#[derive(Debug, Clone)]
pub enum TransitionPayload {
    None,
    Completed(EvaluationResult),
    Failed(String),
}

/// Authoritative state machine and result holder for evaluation jobs.
///
/// Mutated only by the dispatcher's execution entry point after creation.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Creates a job in `Queued`. Document references are validated by the
    /// submission handler against the Document Store before this is called.
    async fn create(&self, job: EvaluationJob) -> Result<EvaluationJob, StoreError>;

    /// Atomically moves `id` from `from` to `to`, applying `payload` and
    /// bumping `updated_at`. Fails with `StaleTransition` when the current
    /// status is not `from`, and with `InvalidReference` when `from → to`
    /// is not an edge of the state machine. Entering `Processing` bumps
    /// `attempt_count`.
    async fn transition(
        &self,
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
        payload: TransitionPayload,
    ) -> Result<EvaluationJob, StoreError>;

    async fn get(&self, id: Uuid) -> Result<EvaluationJob, StoreError>;
}

/// Holds document metadata and resolves text references for the pipeline.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put(&self, doc: Document, text: String) -> Result<Document, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Document, StoreError>;

    /// Resolves a document id to its extracted text.
    async fn get_text(&self, id: Uuid) -> Result<String, StoreError>;

    /// Submission-time reference check: the id must exist and carry the
    /// expected document class.
    async fn verify_kind(&self, id: Uuid, kind: DocumentKind) -> Result<(), StoreError> {
        let doc = match self.get(id).await {
            Ok(doc) => doc,
            Err(StoreError::NotFound(_)) => {
                return Err(StoreError::InvalidReference(format!(
                    "unknown document {id}"
                )))
            }
            Err(e) => return Err(e),
        };
        if doc.kind != kind {
            return Err(StoreError::InvalidReference(format!(
                "document {id} is not a {kind:?}"
            )));
        }
        Ok(())
    }
}
