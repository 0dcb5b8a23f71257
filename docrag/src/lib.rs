//! # docrag
//!
//! Retrieval pipeline for retrieval-augmented generation.
//!
//! ## Overview
//!
//! Documents are split by a [`Chunker`], embedded by an
//! [`EmbeddingProvider`], and stored in a [`VectorIndex`]. Queries are
//! embedded and searched by the [`Retriever`], the candidates are re-scored by
//! a [`Reranker`], the winners are bounded by the [`ContextAssembler`], and a
//! [`Generator`] streams the answer. [`RagPipeline`] wires these together.
//!
//! Offline implementations of every collaborator are included
//! ([`HashingEmbeddingProvider`], [`LexicalRelevanceModel`],
//! [`ExtractiveGenerator`]), so the pipeline runs without any model server.
//!
//! ## Features
//!
//! - `ollama`: [`ollama::OllamaEmbeddingProvider`] and [`ollama::OllamaGenerator`]
//! - `openai`: [`openai::OpenAIEmbeddingProvider`] for OpenAI-compatible embedding servers
//! - `tei`: [`tei::TeiRelevanceModel`], a hosted cross-encoder
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docrag::{
//!     Document, ExtractiveGenerator, HashingEmbeddingProvider, InMemoryVectorIndex, RagPipeline,
//! };
//!
//! let pipeline = RagPipeline::builder()
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
//!     .index(Arc::new(InMemoryVectorIndex::default()))
//!     .generator(Arc::new(ExtractiveGenerator))
//!     .build()?;
//!
//! pipeline.ingest(&Document::new("faq", "Refunds are issued within 30 days.")).await?;
//! let answer = pipeline.answer("How long do refunds take?").await?;
//! ```

pub mod chunking;
pub mod config;
pub mod context;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod inmemory;
pub mod pipeline;
pub mod reranker;
pub mod retriever;
pub mod vectorstore;

#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "tei")]
pub mod tei;

pub use chunking::{Chunker, DEFAULT_SEPARATORS, RecursiveChunker, split_text};
pub use config::{RagConfig, RagConfigBuilder};
pub use context::ContextAssembler;
pub use document::{Chunk, Document, QueryContext, Reranking, SearchResult, normalize_document_id};
pub use embedding::{EmbeddingProvider, HashingEmbeddingProvider};
pub use error::{RagError, Result, Stage};
pub use generation::{ExtractiveGenerator, Generator, SYSTEM_PROMPT, TextStream, user_prompt};
pub use inmemory::InMemoryVectorIndex;
pub use pipeline::{RagPipeline, RagPipelineBuilder};
pub use reranker::{
    CrossEncoderReranker, DEFAULT_TOP_K, LexicalRelevanceModel, RelevanceModel, Reranker,
    select_top_k,
};
pub use retriever::Retriever;
pub use vectorstore::{DistanceMetric, VectorIndex, cosine_similarity, squared_euclidean};
