//! Retrieval pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the ingest and query workflows by
//! composing an [`EmbeddingProvider`], a [`VectorIndex`], a [`Chunker`], a
//! [`Reranker`], a [`ContextAssembler`], and a [`Generator`].
//!
//! # Example
//!
//! ```rust,ignore
//! use docrag::{ExtractiveGenerator, HashingEmbeddingProvider, InMemoryVectorIndex, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
//!     .index(Arc::new(InMemoryVectorIndex::default()))
//!     .generator(Arc::new(ExtractiveGenerator))
//!     .build()?;
//!
//! pipeline.ingest(&document).await?;
//! let mut answer = pipeline.answer("What is the refund window?").await?;
//! while let Some(fragment) = answer.next().await {
//!     print!("{}", fragment?);
//! }
//! ```

use std::sync::Arc;

use futures::StreamExt;
use tracing::{error, info};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::context::ContextAssembler;
use crate::document::{Document, QueryContext, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result, Stage};
use crate::generation::{Generator, TextStream};
use crate::reranker::{CrossEncoderReranker, LexicalRelevanceModel, Reranker};
use crate::retriever::Retriever;
use crate::vectorstore::VectorIndex;

/// The retrieval pipeline orchestrator.
///
/// Ingestion runs chunk → embed → index; queries run retrieve → rerank →
/// assemble → generate. Every failure is returned immediately, tagged with
/// the [`Stage`] it came from. Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    chunker: Arc<dyn Chunker>,
    reranker: Arc<dyn Reranker>,
    generator: Arc<dyn Generator>,
    retriever: Retriever,
    assembler: ContextAssembler,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector index.
    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Ingest a single document: chunk → embed → index.
    ///
    /// Returns the number of chunks indexed. All chunks are embedded before
    /// the index is touched, so a failed embedding leaves the index as it was.
    /// Ingesting a document id twice stores its chunks twice.
    ///
    /// # Errors
    ///
    /// Returns the embedding or index error tagged with [`Stage::Embed`] or
    /// [`Stage::Index`].
    pub async fn ingest(&self, document: &Document) -> Result<usize> {
        let mut chunks = self.chunker.chunk(document);
        if chunks.is_empty() {
            info!(document.id = %document.id, chunk_count = 0, "ingested document (empty)");
            return Ok(0);
        }

        let embeddings = {
            let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
            self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
                error!(document.id = %document.id, error = %e, "embedding failed during ingestion");
                e.at(Stage::Embed)
            })?
        };
        if embeddings.len() != chunks.len() {
            error!(document.id = %document.id, "embedding count mismatch during ingestion");
            return Err(RagError::EmbeddingError {
                provider: "batch".to_string(),
                message: format!(
                    "received {} embeddings for {} chunks of document '{}'",
                    embeddings.len(),
                    chunks.len(),
                    document.id
                ),
            }
            .at(Stage::Embed));
        }

        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }

        let chunk_count = chunks.len();
        self.index.add(chunks).await.map_err(|e| {
            error!(document.id = %document.id, error = %e, "indexing failed during ingestion");
            e.at(Stage::Index)
        })?;

        info!(document.id = %document.id, chunk_count, "ingested document");
        Ok(chunk_count)
    }

    /// Ingest multiple documents, stopping at the first failure.
    ///
    /// Returns the total number of chunks indexed. Documents ingested before
    /// the failing one stay indexed.
    pub async fn ingest_batch(&self, documents: &[Document]) -> Result<usize> {
        let mut total = 0;
        for document in documents {
            total += self.ingest(document).await?;
        }
        Ok(total)
    }

    /// Remove every indexed chunk of `document_id`.
    pub async fn remove_document(&self, document_id: &str) -> Result<usize> {
        self.index.remove_document(document_id).await.map_err(|e| e.at(Stage::Index))
    }

    /// Fetch the `k` nearest chunks for `query`.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.retriever.retrieve(query, k).await
    }

    /// Retrieve, rerank and assemble using the configured `k_retrieve` and `k_rerank`.
    pub async fn query(&self, query: &str) -> Result<QueryContext> {
        self.query_with(query, self.config.k_retrieve, self.config.k_rerank).await
    }

    /// Retrieve `k_retrieve` candidates, keep the best `k_rerank`, and
    /// assemble them into a bounded context.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] (tagged [`Stage::Rerank`]) if
    /// `k_rerank` is zero, [`RagError::NoResults`] (tagged [`Stage::Retrieve`])
    /// if retrieval yields no candidates, and [`RagError::NoResults`] (tagged
    /// [`Stage::Assemble`]) if the assembled context is empty.
    pub async fn query_with(
        &self,
        query: &str,
        k_retrieve: usize,
        k_rerank: usize,
    ) -> Result<QueryContext> {
        if k_rerank == 0 {
            return Err(RagError::ConfigError("k_rerank must be greater than zero".to_string())
                .at(Stage::Rerank));
        }

        let candidates = self.retriever.retrieve(query, k_retrieve).await.map_err(|e| {
            error!(error = %e, "retrieval failed");
            e
        })?;
        if candidates.is_empty() {
            info!(k_retrieve, "query retrieved no candidates");
            return Err(RagError::NoResults.at(Stage::Retrieve));
        }

        let texts: Vec<String> = candidates.iter().map(|c| c.chunk.text.clone()).collect();
        let reranking = self.reranker.rerank(query, &texts, k_rerank).await.map_err(|e| {
            error!(error = %e, "reranking failed");
            e.at(Stage::Rerank)
        })?;

        let context = self.assembler.assemble(&reranking.text);
        if context.is_empty() {
            info!(selected = ?reranking.indices, "selected candidates produced no context");
            return Err(RagError::NoResults.at(Stage::Assemble));
        }
        info!(
            candidate_count = candidates.len(),
            selected = ?reranking.indices,
            context_chars = context.chars().count(),
            "query completed"
        );

        Ok(QueryContext { candidates, reranking, context })
    }

    /// Answer `query` with the configured `k_retrieve` and `k_rerank`.
    pub async fn answer(&self, query: &str) -> Result<TextStream> {
        self.answer_with(query, self.config.k_retrieve, self.config.k_rerank).await
    }

    /// Answer `query`, streaming the generator's fragments.
    ///
    /// The generator is only invoked once a non-empty context exists. Every
    /// error of [`query_with`](Self::query_with) is returned before it runs.
    pub async fn answer_with(
        &self,
        query: &str,
        k_retrieve: usize,
        k_rerank: usize,
    ) -> Result<TextStream> {
        let prepared = self.query_with(query, k_retrieve, k_rerank).await?;
        self.generate(&prepared, query).await
    }

    /// Stream an answer for `query` from an already prepared context.
    pub async fn generate(&self, prepared: &QueryContext, query: &str) -> Result<TextStream> {
        let stream =
            self.generator.generate_stream(&prepared.context, query).await.map_err(|e| {
                error!(generator = self.generator.name(), error = %e, "generation failed");
                e.at(Stage::Generate)
            })?;
        Ok(Box::pin(stream.map(|fragment| fragment.map_err(|e| e.at(Stage::Generate)))))
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// The embedding provider, index, and generator are required. The config
/// defaults to [`RagConfig::default()`], the chunker to a
/// [`RecursiveChunker`] built from the config, and the reranker to a
/// [`CrossEncoderReranker`] over [`LexicalRelevanceModel`].
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .index(Arc::new(index))
///     .reranker(Arc::new(reranker))  // optional
///     .generator(Arc::new(generator))
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    index: Option<Arc<dyn VectorIndex>>,
    chunker: Option<Arc<dyn Chunker>>,
    reranker: Option<Arc<dyn Reranker>>,
    generator: Option<Arc<dyn Generator>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector index.
    pub fn index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the reranker.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Set the answer generator.
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Build the [`RagPipeline`], validating the config and required fields.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the config is invalid or a
    /// required field is missing.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let index =
            self.index.ok_or_else(|| RagError::ConfigError("index is required".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| RagError::ConfigError("generator is required".to_string()))?;

        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(RecursiveChunker::from_config(&config)?),
        };
        let reranker = self.reranker.unwrap_or_else(|| {
            Arc::new(CrossEncoderReranker::new(Arc::new(LexicalRelevanceModel::default())))
        });

        let retriever = Retriever::new(embedding_provider.clone(), index.clone())
            .with_max_distance(config.max_distance);
        let assembler = ContextAssembler::new(config.max_context_chars);

        Ok(RagPipeline {
            config,
            embedding_provider,
            index,
            chunker,
            reranker,
            generator,
            retriever,
            assembler,
        })
    }
}
