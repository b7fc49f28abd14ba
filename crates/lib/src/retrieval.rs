//! Retrieval service client: POST {endpoint}/query with the user's question, returns
//! the top-k context snippets.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("retriever request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("retriever api error: {0}")]
    Api(String),
    #[error("retriever endpoint not configured")]
    NotConfigured,
}

/// Source of context snippets for a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn query(&self, text: &str, top_k: u32) -> Result<Vec<String>, RetrievalError>;
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    contexts: Option<Vec<String>>,
}

/// HTTP client for the retrieval service.
#[derive(Clone)]
pub struct RetrieverClient {
    endpoint: Option<String>,
    client: reqwest::Client,
}

impl RetrieverClient {
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.map(|u| u.trim_end_matches('/').to_string()),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl Retriever for RetrieverClient {
    /// POST /query. A response without `contexts` (or with `null`) yields an empty list.
    async fn query(&self, text: &str, top_k: u32) -> Result<Vec<String>, RetrievalError> {
        let endpoint = self.endpoint.as_ref().ok_or(RetrievalError::NotConfigured)?;
        let url = format!("{}/query", endpoint);
        let body = QueryRequest { query: text, top_k };
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(RetrievalError::Api(format!("{} {}", status, body)));
        }
        let data: QueryResponse = res.json().await?;
        Ok(data.contexts.unwrap_or_default())
    }
}
