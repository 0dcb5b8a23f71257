//! Error types for the `docrag` crate.

use std::fmt;

use thiserror::Error;

/// The pipeline step a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Splitting a document into chunks.
    Chunk,
    /// Generating embeddings for chunks or queries.
    Embed,
    /// Writing entries into the vector index.
    Index,
    /// Searching the vector index.
    Retrieve,
    /// Re-scoring retrieved candidates.
    Rerank,
    /// Bounding the context for generation.
    Assemble,
    /// Producing the answer.
    Generate,
}

impl Stage {
    /// Lowercase stage name used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Chunk => "chunk",
            Stage::Embed => "embed",
            Stage::Index => "index",
            Stage::Retrieve => "retrieve",
            Stage::Rerank => "rerank",
            Stage::Assemble => "assemble",
            Stage::Generate => "generate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in retrieval pipeline operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// An embedding's length differs from the dimension fixed by the index.
    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimension adopted by the index.
        expected: usize,
        /// The dimension of the offending vector.
        actual: usize,
    },

    /// A search was issued against an index with no entries.
    #[error("Vector index is empty")]
    EmptyIndex,

    /// The re-ranker was called without any candidates.
    #[error("Cannot rerank an empty candidate set")]
    EmptyCandidateSet,

    /// Retrieval returned no candidates for the query.
    #[error("No results retrieved for query")]
    NoResults,

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred while generating the answer.
    #[error("Generation error ({generator}): {message}")]
    GenerationError {
        /// The generator that produced the error.
        generator: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during candidate reranking.
    #[error("Reranker error ({reranker}): {message}")]
    RerankerError {
        /// The reranker or relevance model that produced the error.
        reranker: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Saving or loading a persisted index failed.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A failure inside the ingestion or query pipeline, tagged with its stage.
    #[error("{stage} stage failed: {source}")]
    Pipeline {
        /// The step that failed.
        stage: Stage,
        /// The underlying error.
        #[source]
        source: Box<RagError>,
    },
}

impl RagError {
    /// Tag an error with the pipeline stage it came from.
    ///
    /// Errors that already carry a stage are returned unchanged.
    pub fn at(self, stage: Stage) -> Self {
        match self {
            RagError::Pipeline { .. } => self,
            other => RagError::Pipeline { stage, source: Box::new(other) },
        }
    }

    /// The stage this error was tagged with, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RagError::Pipeline { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The underlying error with any stage tagging removed.
    pub fn root(&self) -> &RagError {
        match self {
            RagError::Pipeline { source, .. } => source.root(),
            other => other,
        }
    }
}

/// A convenience result type for retrieval pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_tagging_is_not_nested() {
        let err = RagError::EmptyIndex.at(Stage::Retrieve).at(Stage::Generate);
        assert_eq!(err.stage(), Some(Stage::Retrieve));
        assert!(matches!(err.root(), RagError::EmptyIndex));
        assert_eq!(err.to_string(), "retrieve stage failed: Vector index is empty");
    }

    #[test]
    fn untagged_error_has_no_stage() {
        let err = RagError::DimensionMismatch { expected: 3, actual: 4 };
        assert_eq!(err.stage(), None);
        assert!(matches!(err.root(), RagError::DimensionMismatch { expected: 3, actual: 4 }));
    }
}
