//! Cross-encoder relevance model served by text-embeddings-inference.
//!
//! This module is only available when the `tei` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::reranker::RelevanceModel;

/// A [`RelevanceModel`] calling a text-embeddings-inference `POST /rerank` endpoint.
///
/// The server hosts the cross-encoder (for example
/// `cross-encoder/ms-marco-MiniLM-L-6-v2`); this client only ships pairs and
/// reads scores back.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use docrag::{CrossEncoderReranker, tei::TeiRelevanceModel};
///
/// let model = TeiRelevanceModel::new("http://localhost:8080");
/// let reranker = CrossEncoderReranker::new(Arc::new(model));
/// ```
#[derive(Debug, Clone)]
pub struct TeiRelevanceModel {
    client: reqwest::Client,
    base_url: String,
}

impl TeiRelevanceModel {
    /// Create a model client for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [&'a str],
    raw_scores: bool,
}

#[derive(Deserialize)]
struct RankedText {
    index: usize,
    score: f32,
}

fn reranker_error(message: String) -> RagError {
    RagError::RerankerError { reranker: "TEI".into(), message }
}

/// Place scores back at their candidate positions.
fn scores_by_index(ranked: Vec<RankedText>, count: usize) -> Result<Vec<f32>> {
    let mut scores = vec![None; count];
    for item in ranked {
        let slot = scores
            .get_mut(item.index)
            .ok_or_else(|| reranker_error(format!("score for unknown candidate {}", item.index)))?;
        *slot = Some(item.score);
    }
    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.ok_or_else(|| reranker_error(format!("no score for candidate {i}"))))
        .collect()
}

#[async_trait]
impl RelevanceModel for TeiRelevanceModel {
    async fn score(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>> {
        debug!(reranker = "TEI", candidates = candidates.len(), "scoring candidates");

        let response = self
            .client
            .post(format!("{}/rerank", self.base_url.trim_end_matches('/')))
            .json(&RerankRequest { query, texts: candidates, raw_scores: false })
            .send()
            .await
            .map_err(|e| {
                error!(reranker = "TEI", error = %e, "request failed");
                reranker_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(reranker = "TEI", %status, "API error");
            return Err(reranker_error(format!("API returned {status}: {body}")));
        }

        let ranked: Vec<RankedText> = response
            .json()
            .await
            .map_err(|e| reranker_error(format!("failed to parse response: {e}")))?;
        scores_by_index(ranked, candidates.len())
    }

    fn name(&self) -> &str {
        "tei"
    }
}
