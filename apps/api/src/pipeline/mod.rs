//! Evaluation Pipeline — the fixed three-stage chain.
//!
//! CV stage → Project stage → Synthesis stage, strictly sequential: each
//! stage feeds the next and any unrecoverable failure aborts the rest.
//! Retrieval degrades gracefully (a retriever outage means evaluating
//! without reference context, not failing the job); evaluator calls go
//! through the retry controller with an independent budget per stage.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::evaluator::{CvPrompt, Evaluator, EvaluatorError, ProjectPrompt};
use crate::models::job::{EvaluationJob, EvaluationResult};
use crate::retriever::{ContextRetriever, ContextTag};
use crate::retry::{RetryError, RetryPolicy};
use crate::store::{DocumentStore, StoreError};

const CONTEXT_TOP_K: usize = 3;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("document lookup failed: {0}")]
    Document(#[from] StoreError),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: &'static str,
        source: RetryError<EvaluatorError>,
    },
}

pub struct Pipeline {
    retriever: Arc<dyn ContextRetriever>,
    evaluator: Arc<dyn Evaluator>,
    retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        retriever: Arc<dyn ContextRetriever>,
        evaluator: Arc<dyn Evaluator>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            retriever,
            evaluator,
            retry,
        }
    }

    /// Runs all three stages for one job and folds the outputs into the
    /// job's result payload.
    pub async fn run(
        &self,
        job: &EvaluationJob,
        docs: &dyn DocumentStore,
    ) -> Result<EvaluationResult, PipelineError> {
        let cv_text = docs.get_text(job.cv_document_id).await?;
        let report_text = docs.get_text(job.report_document_id).await?;

        // Stage 1: CV scoring against job-description and rubric context.
        let mut cv_context = self
            .gather(&job.job_title, ContextTag::JobDescription)
            .await;
        cv_context.extend(self.gather(&job.job_title, ContextTag::CvRubric).await);

        let cv_prompt = CvPrompt {
            job_title: job.job_title.clone(),
            cv_text,
            context_snippets: cv_context,
        };
        let cv = self
            .retry
            .run("cv evaluation", || self.evaluator.evaluate_cv(&cv_prompt))
            .await
            .map_err(|source| PipelineError::Stage {
                stage: "cv",
                source,
            })?;
        debug!(job_id = %job.id, cv_match_rate = cv.cv_match_rate, "CV stage done");

        // Stage 2: project scoring against case-brief and rubric context.
        let mut project_context = self.gather("case study brief", ContextTag::CaseBrief).await;
        project_context.extend(
            self.gather(
                "project scoring prompt chaining rag error handling",
                ContextTag::ProjectRubric,
            )
            .await,
        );

        let project_prompt = ProjectPrompt {
            report_text,
            context_snippets: project_context,
        };
        let project = self
            .retry
            .run("project evaluation", || {
                self.evaluator.evaluate_project(&project_prompt)
            })
            .await
            .map_err(|source| PipelineError::Stage {
                stage: "project",
                source,
            })?;
        debug!(job_id = %job.id, project_score = project.project_score, "project stage done");

        // Stage 3: synthesis over both prior outputs, no retrieval.
        let synthesis = self
            .retry
            .run("synthesis", || self.evaluator.synthesize(&cv, &project))
            .await
            .map_err(|source| PipelineError::Stage {
                stage: "synthesis",
                source,
            })?;

        info!(
            job_id = %job.id,
            cv_match_rate = cv.cv_match_rate,
            project_score = project.project_score,
            "pipeline complete"
        );

        Ok(EvaluationResult {
            cv_match_rate: cv.cv_match_rate,
            cv_feedback: cv.cv_feedback,
            project_score: project.project_score,
            project_feedback: project.project_feedback,
            overall_summary: synthesis.overall_summary,
        })
    }

    /// Retrieval with graceful degradation: an unavailable retriever yields
    /// empty context, never a stage failure.
    async fn gather(&self, query: &str, tag: ContextTag) -> Vec<String> {
        match self.retriever.retrieve(query, tag, CONTEXT_TOP_K).await {
            Ok(snippets) => snippets,
            Err(e) => {
                warn!("context retrieval for {tag:?} failed, proceeding without: {e}");
                vec![]
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Stub collaborators shared by pipeline, dispatcher and route tests.

    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use uuid::Uuid;

    use crate::evaluator::{
        CvAssessment, CvPrompt, CvScores, Evaluator, EvaluatorError, ProjectAssessment,
        ProjectPrompt, ProjectScores, Synthesis,
    };
    use crate::models::document::{Document, DocumentKind};
    use crate::models::job::EvaluationJob;
    use crate::retriever::{ContextRetriever, ContextTag, RetrieverError};
    use crate::store::memory::MemoryDocumentStore;
    use crate::store::{DocumentStore, JobStore};

    pub fn cv_assessment(rate: f64) -> CvAssessment {
        CvAssessment {
            scores: CvScores {
                technical_skills_match: 4,
                experience_level: 4,
                relevant_achievements: 3,
                cultural_fit: 4,
            },
            cv_match_rate: rate,
            cv_feedback: "Strong backend background.".to_string(),
        }
    }

    pub fn project_assessment(score: f64) -> ProjectAssessment {
        ProjectAssessment {
            scores: ProjectScores {
                correctness: 5,
                code_quality: 4,
                resilience: 4,
                documentation: 4,
                creativity_bonus: 3,
            },
            project_score: score,
            project_feedback: "Solid error handling.".to_string(),
        }
    }

    /// Scripted evaluator: fails with `fail_with` for the first
    /// `failures_before_success` calls of each method, then returns fixed
    /// assessments.
    pub struct StubEvaluator {
        pub cv_match_rate: f64,
        pub project_score: f64,
        pub failures_before_success: u32,
        pub fail_with: fn() -> EvaluatorError,
        pub cv_calls: AtomicU32,
        pub project_calls: AtomicU32,
        pub synthesis_calls: AtomicU32,
    }

    impl StubEvaluator {
        pub fn happy() -> Self {
            Self::scripted(0, || EvaluatorError::Timeout)
        }

        pub fn scripted(failures_before_success: u32, fail_with: fn() -> EvaluatorError) -> Self {
            Self {
                cv_match_rate: 0.82,
                project_score: 4.5,
                failures_before_success,
                fail_with,
                cv_calls: AtomicU32::new(0),
                project_calls: AtomicU32::new(0),
                synthesis_calls: AtomicU32::new(0),
            }
        }

        fn should_fail(&self, calls: &AtomicU32) -> bool {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            n < self.failures_before_success
        }
    }

    #[async_trait]
    impl Evaluator for StubEvaluator {
        async fn evaluate_cv(&self, _prompt: &CvPrompt) -> Result<CvAssessment, EvaluatorError> {
            if self.should_fail(&self.cv_calls) {
                return Err((self.fail_with)());
            }
            let assessment = cv_assessment(self.cv_match_rate);
            assessment.validate()?;
            Ok(assessment)
        }

        async fn evaluate_project(
            &self,
            _prompt: &ProjectPrompt,
        ) -> Result<ProjectAssessment, EvaluatorError> {
            if self.should_fail(&self.project_calls) {
                return Err((self.fail_with)());
            }
            let assessment = project_assessment(self.project_score);
            assessment.validate()?;
            Ok(assessment)
        }

        async fn synthesize(
            &self,
            _cv: &CvAssessment,
            _project: &ProjectAssessment,
        ) -> Result<Synthesis, EvaluatorError> {
            if self.should_fail(&self.synthesis_calls) {
                return Err((self.fail_with)());
            }
            Ok(Synthesis {
                overall_summary: "Strong candidate. Project shows production instincts. \
                                  Recommended to proceed to interview."
                    .to_string(),
            })
        }
    }

    /// Retriever returning a fixed snippet per query, or erroring when down.
    pub struct StubRetriever {
        pub down: bool,
    }

    #[async_trait]
    impl ContextRetriever for StubRetriever {
        async fn retrieve(
            &self,
            query: &str,
            tag: ContextTag,
            _top_k: usize,
        ) -> Result<Vec<String>, RetrieverError> {
            if self.down {
                return Err(RetrieverError::Request("connection refused".to_string()));
            }
            Ok(vec![format!("{tag:?} reference for '{query}'")])
        }
    }

    /// Seeds a CV and a report document and returns a queued job referencing
    /// them, created in the given stores.
    pub async fn seed_job(
        docs: &MemoryDocumentStore,
        jobs: &dyn JobStore,
    ) -> (EvaluationJob, Uuid, Uuid) {
        let cv = docs
            .put(
                Document::new(DocumentKind::Cv, "cv-text".to_string()),
                "Five years of Rust backend development.".to_string(),
            )
            .await
            .unwrap();
        let report = docs
            .put(
                Document::new(DocumentKind::ProjectReport, "report-text".to_string()),
                "Built an LLM evaluation chain with retries and RAG.".to_string(),
            )
            .await
            .unwrap();
        let job = jobs
            .create(EvaluationJob::new(
                "Backend Engineer".to_string(),
                cv.id,
                report.id,
            ))
            .await
            .unwrap();
        (job, cv.id, report.id)
    }
}
