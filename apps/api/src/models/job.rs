use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Externally visible lifecycle of an evaluation job.
///
/// Legal edges: `Queued → Processing → Completed` and
/// `Queued → Processing → Failed`. Processing is never skipped and
/// terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self → to` is an edge of the state machine.
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The folded output of a successful pipeline run, stored on the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// CV-to-role match rate, 0.0..=1.0.
    pub cv_match_rate: f64,
    pub cv_feedback: String,
    /// Project deliverable score, 1.0..=5.0.
    pub project_score: f64,
    pub project_feedback: String,
    /// 3-5 sentence synthesis of both stages.
    pub overall_summary: String,
}

/// One candidate-screening evaluation request, tracked end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationJob {
    pub id: Uuid,
    pub job_title: String,
    pub cv_document_id: Uuid,
    pub report_document_id: Uuid,
    pub status: JobStatus,
    /// Set iff status == Completed.
    pub result: Option<EvaluationResult>,
    /// Set iff status == Failed.
    pub error_detail: Option<String>,
    pub attempt_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EvaluationJob {
    pub fn new(job_title: String, cv_document_id: Uuid, report_document_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_title,
            cv_document_id,
            report_document_id,
            status: JobStatus::Queued,
            result: None,
            error_detail: None,
            attempt_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
