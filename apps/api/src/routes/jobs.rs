use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::document::DocumentKind;
use crate::models::job::{EvaluationJob, EvaluationResult, JobStatus};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub job_title: String,
    pub cv_document_id: Uuid,
    pub report_document_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub id: Uuid,
    pub status: JobStatus,
}

/// POST /evaluate
/// Validates the document references, creates the job in `Queued` and hands
/// it to the dispatcher. Accepted jobs always answer 202; their fate is
/// visible only through polling.
pub async fn handle_evaluate(
    State(state): State<AppState>,
    Json(req): Json<EvaluateRequest>,
) -> Result<(StatusCode, Json<EvaluateResponse>), AppError> {
    if req.job_title.trim().is_empty() {
        return Err(AppError::Validation("job_title must not be empty".to_string()));
    }

    // Reference check happens before the job record exists: a bad id means
    // no job is created at all.
    state
        .documents
        .verify_kind(req.cv_document_id, DocumentKind::Cv)
        .await?;
    state
        .documents
        .verify_kind(req.report_document_id, DocumentKind::ProjectReport)
        .await?;

    let job = state
        .jobs
        .create(EvaluationJob::new(
            req.job_title,
            req.cv_document_id,
            req.report_document_id,
        ))
        .await?;

    state.dispatcher.submit(job.id).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(EvaluateResponse {
            id: job.id,
            status: job.status,
        }),
    ))
}

/// Polling view of a job: pending jobs expose only their status, terminal
/// jobs expose the result or the failure detail.
#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub id: Uuid,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<EvaluationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /result/:id
pub async fn handle_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResultResponse>, AppError> {
    let job = state.jobs.get(id).await?;
    Ok(Json(ResultResponse {
        id: job.id,
        status: job.status,
        result: job.result,
        error: job.error_detail,
    }))
}
