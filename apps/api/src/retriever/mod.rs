//! Context Retriever boundary.
//!
//! The pipeline asks for ranked reference snippets by query and document
//! class; the backing vector index lives in a separate service reached over
//! HTTP. Pure read, no observable side effects.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Document classes the reference collection is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextTag {
    JobDescription,
    CvRubric,
    CaseBrief,
    ProjectRubric,
}

#[derive(Debug, Error)]
pub enum RetrieverError {
    #[error("retriever request failed: {0}")]
    Request(String),

    #[error("retriever returned malformed response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Returns up to `top_k` reference snippets ranked by relevance.
    async fn retrieve(
        &self,
        query: &str,
        tag: ContextTag,
        top_k: usize,
    ) -> Result<Vec<String>, RetrieverError>;
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    tag: ContextTag,
    top_k: usize,
}

#[derive(Deserialize)]
struct QueryResponse {
    documents: Vec<String>,
}

/// Retriever backed by a vector-search sidecar exposing a `/query` endpoint.
pub struct HttpContextRetriever {
    client: reqwest::Client,
    base_url: String,
}

impl HttpContextRetriever {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .expect("Failed to build HTTP client"),
            base_url,
        }
    }
}

#[async_trait]
impl ContextRetriever for HttpContextRetriever {
    async fn retrieve(
        &self,
        query: &str,
        tag: ContextTag,
        top_k: usize,
    ) -> Result<Vec<String>, RetrieverError> {
        if query.trim().is_empty() {
            return Ok(vec![]);
        }

        let response = self
            .client
            .post(format!("{}/query", self.base_url.trim_end_matches('/')))
            .json(&QueryRequest { query, tag, top_k })
            .send()
            .await
            .map_err(|e| RetrieverError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrieverError::Request(format!("status {status}")));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| RetrieverError::Malformed(e.to_string()))?;
        Ok(parsed.documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ContextTag::CvRubric).unwrap(),
            "\"cv_rubric\""
        );
        assert_eq!(
            serde_json::to_string(&ContextTag::CaseBrief).unwrap(),
            "\"case_brief\""
        );
    }

    #[tokio::test]
    async fn test_empty_query_short_circuits() {
        // No HTTP call is made for an empty query, so a bogus URL is fine.
        let retriever = HttpContextRetriever::new("http://127.0.0.1:1".to_string());
        let snippets = retriever
            .retrieve("  ", ContextTag::JobDescription, 3)
            .await
            .unwrap();
        assert!(snippets.is_empty());
    }
}
