//! Postgres-backed stores.
//!
//! The compare-and-set in `transition` is a single `UPDATE ... WHERE id = $1
//! AND status = $2`; zero rows affected means either an unknown job or a
//! stale claim, disambiguated with a follow-up read.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::document::{Document, DocumentKind};
use crate::models::job::{EvaluationJob, EvaluationResult, JobStatus};
use crate::store::{DocumentStore, JobStore, StoreError, TransitionPayload};

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct JobRow {
    id: Uuid,
    job_title: String,
    cv_document_id: Uuid,
    report_document_id: Uuid,
    status: String,
    result: Option<serde_json::Value>,
    error_detail: Option<String>,
    attempt_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for EvaluationJob {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = JobStatus::from_str(&row.status)
            .map_err(|e| StoreError::InvalidReference(e.to_string()))?;
        let result: Option<EvaluationResult> = row
            .result
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| StoreError::InvalidReference(format!("stored result corrupt: {e}")))?;
        Ok(EvaluationJob {
            id: row.id,
            job_title: row.job_title,
            cv_document_id: row.cv_document_id,
            report_document_id: row.report_document_id,
            status,
            result,
            error_detail: row.error_detail,
            attempt_count: row.attempt_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: EvaluationJob) -> Result<EvaluationJob, StoreError> {
        sqlx::query(
            "INSERT INTO evaluation_jobs \
             (id, job_title, cv_document_id, report_document_id, status, attempt_count, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(job.id)
        .bind(&job.job_title)
        .bind(job.cv_document_id)
        .bind(job.report_document_id)
        .bind(job.status.to_string())
        .bind(job.attempt_count)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
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

        let (result_json, error_detail) = match payload {
            TransitionPayload::None => (None, None),
            TransitionPayload::Completed(result) => {
                let value = serde_json::to_value(&result).map_err(|e| {
                    StoreError::InvalidReference(format!("result not serializable: {e}"))
                })?;
                (Some(value), None)
            }
            TransitionPayload::Failed(detail) => (None, Some(detail)),
        };

        let attempt_bump: i32 = if to == JobStatus::Processing { 1 } else { 0 };

        let row = sqlx::query_as::<_, JobRow>(
            "UPDATE evaluation_jobs \
             SET status = $3, \
                 result = COALESCE($4, result), \
                 error_detail = COALESCE($5, error_detail), \
                 attempt_count = attempt_count + $6, \
                 updated_at = NOW() \
             WHERE id = $1 AND status = $2 \
             RETURNING *",
        )
        .bind(id)
        .bind(from.to_string())
        .bind(to.to_string())
        .bind(result_json)
        .bind(error_detail)
        .bind(attempt_bump)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => {
                // Zero rows: the job is missing or its status moved under us.
                let current = self.get(id).await?;
                Err(StoreError::StaleTransition {
                    expected: from,
                    actual: current.status,
                })
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<EvaluationJob, StoreError> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM evaluation_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(StoreError::NotFound(format!("job {id}"))),
        }
    }
}

pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct DocumentRow {
    id: Uuid,
    kind: String,
    text_ref: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = StoreError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let kind = DocumentKind::from_str(&row.kind)
            .map_err(|e| StoreError::InvalidReference(e.to_string()))?;
        Ok(Document {
            id: row.id,
            kind,
            text_ref: row.text_ref,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn put(&self, doc: Document, text: String) -> Result<Document, StoreError> {
        sqlx::query(
            "INSERT INTO documents (id, kind, text_ref, extracted_text, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(doc.id)
        .bind(doc.kind.to_string())
        .bind(&doc.text_ref)
        .bind(&text)
        .bind(doc.created_at)
        .execute(&self.pool)
        .await?;
        Ok(doc)
    }

    async fn get(&self, id: Uuid) -> Result<Document, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, kind, text_ref, created_at FROM documents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(StoreError::NotFound(format!("document {id}"))),
        }
    }

    async fn get_text(&self, id: Uuid) -> Result<String, StoreError> {
        let text: Option<String> =
            sqlx::query_scalar("SELECT extracted_text FROM documents WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        text.ok_or_else(|| StoreError::NotFound(format!("document {id}")))
    }
}
