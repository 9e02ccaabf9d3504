//! Anthropic-backed `Evaluator`.
//!
//! Single point of entry for Claude API calls. The client performs exactly
//! one attempt per call and maps HTTP failures onto the retryable/fatal
//! split; backoff and budgets belong to the pipeline's `RetryPolicy`.

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::evaluator::prompts;
use crate::evaluator::{
    CvAssessment, CvPrompt, Evaluator, EvaluatorError, ProjectAssessment, ProjectPrompt, Synthesis,
};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Hardcoded to prevent accidental model drift between stages.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 2048;
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl MessagesResponse {
    fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Clone)]
pub struct LlmEvaluator {
    client: Client,
    api_key: String,
}

impl LlmEvaluator {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    /// One attempt against the Messages API, classified on failure.
    async fn call(&self, prompt: &str, system: &str) -> Result<String, EvaluatorError> {
        let request_body = MessagesRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EvaluatorError::Timeout
                } else {
                    EvaluatorError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => EvaluatorError::Auth,
                429 => EvaluatorError::RateLimited,
                s if (500..600).contains(&s) => {
                    EvaluatorError::Network(format!("upstream {s}: {body}"))
                }
                s => EvaluatorError::InvalidRequest(format!("status {s}: {body}")),
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| EvaluatorError::MalformedResult(format!("response body: {e}")))?;

        debug!(
            "LLM call succeeded: input_tokens={}, output_tokens={}",
            parsed.usage.input_tokens, parsed.usage.output_tokens
        );

        parsed
            .text()
            .map(str::to_owned)
            .ok_or_else(|| EvaluatorError::MalformedResult("empty content".to_string()))
    }

    /// Calls the model and deserializes the text response as JSON.
    async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, EvaluatorError> {
        let text = self.call(prompt, system).await?;
        let text = strip_json_fences(&text);
        serde_json::from_str(text).map_err(|e| EvaluatorError::MalformedResult(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Evaluator for LlmEvaluator {
    async fn evaluate_cv(&self, prompt: &CvPrompt) -> Result<CvAssessment, EvaluatorError> {
        let assessment: CvAssessment = self
            .call_json(&prompts::build_cv_prompt(prompt), prompts::CV_SYSTEM)
            .await?;
        assessment.validate()?;
        Ok(assessment)
    }

    async fn evaluate_project(
        &self,
        prompt: &ProjectPrompt,
    ) -> Result<ProjectAssessment, EvaluatorError> {
        let assessment: ProjectAssessment = self
            .call_json(&prompts::build_project_prompt(prompt), prompts::PROJECT_SYSTEM)
            .await?;
        assessment.validate()?;
        Ok(assessment)
    }

    async fn synthesize(
        &self,
        cv: &CvAssessment,
        project: &ProjectAssessment,
    ) -> Result<Synthesis, EvaluatorError> {
        let synthesis: Synthesis = self
            .call_json(
                &prompts::build_synthesis_prompt(cv, project),
                prompts::SYNTHESIS_SYSTEM,
            )
            .await?;
        synthesis.validate()?;
        Ok(synthesis)
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
