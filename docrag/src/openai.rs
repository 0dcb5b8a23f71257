//! Embeddings from OpenAI or any server implementing its `POST /embeddings`
//! route (vLLM, LocalAI, LiteLLM, llama.cpp server).
//!
//! This module is only available when the `openai` feature is enabled.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Base URL of the hosted OpenAI API.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Dimensionality of `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// Inputs sent in one request.
const DEFAULT_MAX_BATCH: usize = 256;

/// An [`EmbeddingProvider`] speaking the OpenAI embeddings protocol.
///
/// Compatible servers usually run without authentication, so the API key is
/// optional. Batches larger than [`with_max_batch`](Self::with_max_batch)
/// are split across requests and reassembled in input order.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::openai::OpenAIEmbeddingProvider;
///
/// // Hosted API
/// let hosted = OpenAIEmbeddingProvider::new("sk-...");
///
/// // Local vLLM serving a 1024-dimension model
/// let local = OpenAIEmbeddingProvider::compatible("http://localhost:8000/v1")
///     .with_model("BAAI/bge-large-en-v1.5", 1024);
/// ```
#[derive(Clone)]
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    truncate_to: Option<usize>,
    max_batch: usize,
}

impl OpenAIEmbeddingProvider {
    /// Provider for the hosted OpenAI API, authenticated with `api_key`.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::compatible(DEFAULT_BASE_URL).with_api_key(api_key)
    }

    /// Provider for an OpenAI-compatible server at `base_url` (including any
    /// `/v1` prefix), without authentication.
    pub fn compatible(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: None,
            model: DEFAULT_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            truncate_to: None,
            max_batch: DEFAULT_MAX_BATCH,
        }
    }

    /// Send `api_key` as a bearer token. An empty key disables authentication.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.api_key = (!api_key.is_empty()).then_some(api_key);
        self
    }

    /// Set the model name and the dimensionality it produces.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }

    /// Ask the server to shorten embeddings to `dimensions` (Matryoshka models).
    pub fn with_truncation(mut self, dimensions: usize) -> Self {
        self.truncate_to = Some(dimensions);
        self.dimensions = dimensions;
        self
    }

    /// Cap the number of inputs per request.
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body =
            EmbeddingsRequest { model: &self.model, input: inputs, dimensions: self.truncate_to };
        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url.trim_end_matches('/')))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            error!(
                provider = "OpenAI",
                base_url = %self.base_url,
                error = %e,
                "request failed"
            );
            embedding_error(format!("request to {} failed: {e}", self.base_url))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail =
                serde_json::from_str::<ApiError>(&body).map(|e| e.error.message).unwrap_or(body);
            error!(provider = "OpenAI", %status, %detail, "API error");
            return Err(embedding_error(format!("API returned {status}: {detail}")));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| embedding_error(format!("failed to parse response: {e}")))?;
        in_input_order(parsed.data, inputs.len())
    }
}

impl fmt::Debug for OpenAIEmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIEmbeddingProvider")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.api_key.is_some())
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("max_batch", &self.max_batch)
            .finish()
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

fn embedding_error(message: String) -> RagError {
    RagError::EmbeddingError { provider: "OpenAI".into(), message }
}

/// Place each returned vector at its input position.
///
/// Servers may answer out of order; every input must get exactly one
/// non-empty vector.
fn in_input_order(items: Vec<EmbeddingItem>, count: usize) -> Result<Vec<Vec<f32>>> {
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; count];
    for item in items {
        if item.embedding.is_empty() {
            return Err(embedding_error(format!("empty embedding for input {}", item.index)));
        }
        let slot = slots.get_mut(item.index).ok_or_else(|| {
            embedding_error(format!("embedding for unknown input {}", item.index))
        })?;
        if slot.is_some() {
            let message = format!("duplicate embedding for input {}", item.index);
            return Err(embedding_error(message));
        }
        *slot = Some(item.embedding);
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(i, v)| v.ok_or_else(|| embedding_error(format!("no embedding for input {i}"))))
        .collect()
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(&[text]).await?;
        vectors.pop().ok_or_else(|| embedding_error("no embedding returned".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.max_batch) {
            debug!(
                provider = "OpenAI",
                model = %self.model,
                batch_size = batch.len(),
                "embedding batch"
            );
            vectors.extend(self.request(batch).await?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(index: usize, embedding: Vec<f32>) -> EmbeddingItem {
        EmbeddingItem { index, embedding }
    }

    #[test]
    fn out_of_order_items_are_reordered() {
        let items = vec![item(1, vec![0.5]), item(0, vec![0.25])];
        assert_eq!(in_input_order(items, 2).unwrap(), vec![vec![0.25], vec![0.5]]);
    }

    #[test]
    fn missing_duplicate_or_empty_items_fail() {
        assert!(in_input_order(vec![item(0, vec![1.0])], 2).is_err());
        assert!(in_input_order(vec![item(0, vec![1.0]), item(0, vec![2.0])], 2).is_err());
        assert!(in_input_order(vec![item(3, vec![1.0])], 1).is_err());
        assert!(in_input_order(vec![item(0, vec![])], 1).is_err());
    }

    #[test]
    fn truncation_is_sent_only_when_set() {
        let plain = serde_json::to_value(EmbeddingsRequest {
            model: "m",
            input: &["a", "b"],
            dimensions: None,
        })
        .unwrap();
        assert!(plain.get("dimensions").is_none());
        assert_eq!(plain["input"][1], "b");

        let provider = OpenAIEmbeddingProvider::compatible("http://localhost:8000/v1")
            .with_truncation(256);
        assert_eq!(provider.dimensions(), 256);
        assert_eq!(provider.truncate_to, Some(256));
    }

    #[test]
    fn empty_key_means_unauthenticated() {
        assert!(OpenAIEmbeddingProvider::new("").api_key.is_none());
        assert!(OpenAIEmbeddingProvider::new("sk-test").api_key.is_some());
    }

    #[test]
    fn debug_output_hides_the_key() {
        let provider = OpenAIEmbeddingProvider::new("sk-secret");
        let rendered = format!("{provider:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("authenticated: true"));
    }

    #[test]
    fn batch_cap_is_at_least_one() {
        let provider = OpenAIEmbeddingProvider::compatible("http://x").with_max_batch(0);
        assert_eq!(provider.max_batch, 1);
    }
}
