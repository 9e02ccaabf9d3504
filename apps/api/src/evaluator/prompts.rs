//! Prompt templates for the three evaluation stages.
//!
//! Each prompt instructs the model to return bare JSON matching the typed
//! assessment structs; the adapter strips code fences before parsing.

use crate::evaluator::{CvAssessment, CvPrompt, ProjectAssessment, ProjectPrompt};

pub const CV_SYSTEM: &str = "You are a technical recruiter scoring a candidate CV \
against a role. Score conservatively and justify briefly. Respond with JSON only, \
no prose outside the JSON object.";

pub const PROJECT_SYSTEM: &str = "You are a senior engineer reviewing a take-home \
project report against the case study rubric. Respond with JSON only, no prose \
outside the JSON object.";

pub const SYNTHESIS_SYSTEM: &str = "You are a hiring committee member writing a \
final screening summary. Respond with JSON only, no prose outside the JSON object.";

pub fn build_cv_prompt(prompt: &CvPrompt) -> String {
    format!(
        "Role: {title}\n\n\
         Reference context (job description and CV scoring rubric):\n{context}\n\n\
         Candidate CV:\n{cv}\n\n\
         Score each rubric dimension 1-5 (technical_skills_match, experience_level, \
         relevant_achievements, cultural_fit), derive cv_match_rate between 0.0 and 1.0, \
         and write cv_feedback.\n\
         Return JSON: {{\"scores\": {{\"technical_skills_match\": n, \"experience_level\": n, \
         \"relevant_achievements\": n, \"cultural_fit\": n}}, \"cv_match_rate\": x, \
         \"cv_feedback\": \"...\"}}",
        title = prompt.job_title,
        context = join_context(&prompt.context_snippets),
        cv = prompt.cv_text,
    )
}

pub fn build_project_prompt(prompt: &ProjectPrompt) -> String {
    format!(
        "Reference context (case study brief and project scoring rubric):\n{context}\n\n\
         Project report:\n{report}\n\n\
         Score each rubric dimension 1-5 (correctness, code_quality, resilience, \
         documentation, creativity_bonus), derive project_score between 1.0 and 5.0, \
         and write project_feedback.\n\
         Return JSON: {{\"scores\": {{\"correctness\": n, \"code_quality\": n, \
         \"resilience\": n, \"documentation\": n, \"creativity_bonus\": n}}, \
         \"project_score\": x, \"project_feedback\": \"...\"}}",
        context = join_context(&prompt.context_snippets),
        report = prompt.report_text,
    )
}

pub fn build_synthesis_prompt(cv: &CvAssessment, project: &ProjectAssessment) -> String {
    format!(
        "CV evaluation: match rate {rate:.2}. Feedback: {cv_feedback}\n\n\
         Project evaluation: score {score:.2}. Feedback: {project_feedback}\n\n\
         Write an overall_summary of 3 to 5 sentences covering strengths, gaps, \
         and a hiring recommendation.\n\
         Return JSON: {{\"overall_summary\": \"...\"}}",
        rate = cv.cv_match_rate,
        cv_feedback = cv.cv_feedback,
        score = project.project_score,
        project_feedback = project.project_feedback,
    )
}

fn join_context(snippets: &[String]) -> String {
    if snippets.is_empty() {
        return "(no reference context retrieved)".to_string();
    }
    snippets
        .iter()
        .enumerate()
        .map(|(i, s)| format!("[{}] {s}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}
