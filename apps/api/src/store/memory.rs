//! In-memory store implementations backing the test suite; the reference
//! point for the state-machine semantics `PgJobStore` must match.
//!
//! The `Mutex` around the job map is what gives `transition` its
//! compare-and-set atomicity: check and update happen under one lock,
//! with no await point in between.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::document::Document;
use crate::models::job::{EvaluationJob, JobStatus};
use crate::store::{DocumentStore, JobStore, StoreError, TransitionPayload};

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, EvaluationJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: EvaluationJob) -> Result<EvaluationJob, StoreError> {
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
        payload: TransitionPayload,
    ) -> Result<EvaluationJob, StoreError> {
        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidReference(format!(
                "illegal transition {from} -> {to}"
            )));
        }

        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))?;

        if job.status != from {
            return Err(StoreError::StaleTransition {
                expected: from,
                actual: job.status,
            });
        }

        job.status = to;
        job.updated_at = Utc::now();
        if to == JobStatus::Processing {
            job.attempt_count += 1;
        }
        match payload {
            TransitionPayload::None => {}
            TransitionPayload::Completed(result) => job.result = Some(result),
            TransitionPayload::Failed(detail) => job.error_detail = Some(detail),
        }

        Ok(job.clone())
    }

    async fn get(&self, id: Uuid) -> Result<EvaluationJob, StoreError> {
        let jobs = self.jobs.lock().expect("job store lock poisoned");
        jobs.get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))
    }
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<HashMap<Uuid, (Document, String)>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn put(&self, doc: Document, text: String) -> Result<Document, StoreError> {
        let mut docs = self.docs.lock().expect("document store lock poisoned");
        docs.insert(doc.id, (doc.clone(), text));
        Ok(doc)
    }

    async fn get(&self, id: Uuid) -> Result<Document, StoreError> {
        let docs = self.docs.lock().expect("document store lock poisoned");
        docs.get(&id)
            .map(|(d, _)| d.clone())
            .ok_or_else(|| StoreError::NotFound(format!("document {id}")))
    }

    async fn get_text(&self, id: Uuid) -> Result<String, StoreError> {
        let docs = self.docs.lock().expect("document store lock poisoned");
        docs.get(&id)
            .map(|(_, text)| text.clone())
            .ok_or_else(|| StoreError::NotFound(format!("document {id}")))
    }
}
