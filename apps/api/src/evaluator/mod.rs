//! Evaluator boundary — the external AI capability behind a typed contract.
//!
//! Every LLM interaction in the pipeline goes through this trait. Responses
//! are parsed into strictly typed assessment structs and range-checked once,
//! here, at the boundary: an out-of-range score is a `MalformedResult`, a
//! fatal error, never something to clamp quietly into range.

pub mod llm;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::ClassifyError;

#[derive(Debug, Error)]
pub enum EvaluatorError {
    // Retryable: transient conditions worth another attempt.
    #[error("evaluator timed out")]
    Timeout,

    #[error("evaluator rate limited")]
    RateLimited,

    #[error("evaluator network error: {0}")]
    Network(String),

    // Fatal: retrying cannot help.
    #[error("evaluator authentication failed")]
    Auth,

    #[error("evaluator rejected request: {0}")]
    InvalidRequest(String),

    #[error("evaluator returned malformed result: {0}")]
    MalformedResult(String),
}

impl ClassifyError for EvaluatorError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            EvaluatorError::Timeout | EvaluatorError::RateLimited | EvaluatorError::Network(_)
        )
    }
}

/// Per-dimension CV rubric scores, each 1-5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvScores {
    pub technical_skills_match: u8,
    pub experience_level: u8,
    pub relevant_achievements: u8,
    pub cultural_fit: u8,
}

/// CV stage output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvAssessment {
    pub scores: CvScores,
    pub cv_match_rate: f64,
    pub cv_feedback: String,
}

/// Per-dimension project rubric scores, each 1-5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectScores {
    pub correctness: u8,
    pub code_quality: u8,
    pub resilience: u8,
    pub documentation: u8,
    pub creativity_bonus: u8,
}

/// Project stage output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectAssessment {
    pub scores: ProjectScores,
    pub project_score: f64,
    pub project_feedback: String,
}

/// Synthesis stage output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synthesis {
    pub overall_summary: String,
}

fn check_dimension(name: &str, value: u8) -> Result<(), EvaluatorError> {
    if !(1..=5).contains(&value) {
        return Err(EvaluatorError::MalformedResult(format!(
            "{name} = {value}, expected 1..=5"
        )));
    }
    Ok(())
}

impl CvAssessment {
    pub fn validate(&self) -> Result<(), EvaluatorError> {
        if !(0.0..=1.0).contains(&self.cv_match_rate) {
            return Err(EvaluatorError::MalformedResult(format!(
                "cv_match_rate = {}, expected 0.0..=1.0",
                self.cv_match_rate
            )));
        }
        if self.cv_feedback.trim().is_empty() {
            return Err(EvaluatorError::MalformedResult(
                "cv_feedback is empty".to_string(),
            ));
        }
        check_dimension("technical_skills_match", self.scores.technical_skills_match)?;
        check_dimension("experience_level", self.scores.experience_level)?;
        check_dimension("relevant_achievements", self.scores.relevant_achievements)?;
        check_dimension("cultural_fit", self.scores.cultural_fit)?;
        Ok(())
    }
}

impl ProjectAssessment {
    pub fn validate(&self) -> Result<(), EvaluatorError> {
        if !(1.0..=5.0).contains(&self.project_score) {
            return Err(EvaluatorError::MalformedResult(format!(
                "project_score = {}, expected 1.0..=5.0",
                self.project_score
            )));
        }
        if self.project_feedback.trim().is_empty() {
            return Err(EvaluatorError::MalformedResult(
                "project_feedback is empty".to_string(),
            ));
        }
        check_dimension("correctness", self.scores.correctness)?;
        check_dimension("code_quality", self.scores.code_quality)?;
        check_dimension("resilience", self.scores.resilience)?;
        check_dimension("documentation", self.scores.documentation)?;
        check_dimension("creativity_bonus", self.scores.creativity_bonus)?;
        Ok(())
    }
}

impl Synthesis {
    pub fn validate(&self) -> Result<(), EvaluatorError> {
        if self.overall_summary.trim().is_empty() {
            return Err(EvaluatorError::MalformedResult(
                "overall_summary is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Structured prompt for the CV stage.
#[derive(Debug, Clone)]
pub struct CvPrompt {
    pub job_title: String,
    pub cv_text: String,
    pub context_snippets: Vec<String>,
}

/// Structured prompt for the project stage.
#[derive(Debug, Clone)]
pub struct ProjectPrompt {
    pub report_text: String,
    pub context_snippets: Vec<String>,
}

/// The external AI capability: structured prompt in, structured score out.
///
/// Implementations perform exactly one attempt per call and classify their
/// failures; retry lives with the caller's `RetryPolicy`.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate_cv(&self, prompt: &CvPrompt) -> Result<CvAssessment, EvaluatorError>;

    async fn evaluate_project(
        &self,
        prompt: &ProjectPrompt,
    ) -> Result<ProjectAssessment, EvaluatorError>;

    async fn synthesize(
        &self,
        cv: &CvAssessment,
        project: &ProjectAssessment,
    ) -> Result<Synthesis, EvaluatorError>;
}
