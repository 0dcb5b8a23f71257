//! First-stage retrieval: embed the query and search the index.

use std::sync::Arc;

use tracing::debug;

use crate::document::SearchResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, Stage};
use crate::vectorstore::VectorIndex;

/// Embeds queries and fetches their nearest chunks.
///
/// Failures are tagged with [`Stage::Embed`] or [`Stage::Retrieve`] and
/// returned without retrying.
#[derive(Clone)]
pub struct Retriever {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    max_distance: Option<f32>,
}

impl Retriever {
    /// Create a retriever over `index` using `embedding_provider` for queries.
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self { embedding_provider, index, max_distance: None }
    }

    /// Drop results farther than `max_distance` from the query.
    pub fn with_max_distance(mut self, max_distance: Option<f32>) -> Self {
        self.max_distance = max_distance;
        self
    }

    /// Return at most `k` results, nearest first.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let embedding =
            self.embedding_provider.embed(query).await.map_err(|e| e.at(Stage::Embed))?;
        let mut results =
            self.index.search(&embedding, k).await.map_err(|e| e.at(Stage::Retrieve))?;

        if let Some(max) = self.max_distance {
            results.retain(|r| r.distance <= max);
        }
        debug!(k, result_count = results.len(), "retrieved candidates");
        Ok(results)
    }
}
