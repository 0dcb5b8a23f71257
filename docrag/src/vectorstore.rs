//! Vector index trait and distance metrics.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{Chunk, SearchResult};
use crate::error::Result;

/// How distance between two embeddings is measured.
///
/// Fixed for the lifetime of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Sum of squared component differences.
    SquaredEuclidean,
    /// `1 - cosine_similarity`, in `[0, 2]`.
    #[default]
    Cosine,
}

impl DistanceMetric {
    /// Distance between two vectors of equal length.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::SquaredEuclidean => squared_euclidean(a, b),
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
        }
    }
}

/// Squared Euclidean distance.
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// A nearest-neighbor index over chunk embeddings.
///
/// The index adopts the dimension of its first insertion (unless fixed at
/// construction) and rejects empty vectors and vectors of any other length.
/// Concurrent writers must be serialized by the implementation or the caller.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::{DistanceMetric, InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new(DistanceMetric::Cosine);
/// index.add(chunks).await?;
/// let results = index.search(&query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Append chunks with embeddings set.
    ///
    /// Either every chunk is added or none is. Fails with
    /// [`RagError::DimensionMismatch`](crate::RagError::DimensionMismatch) if
    /// any embedding differs from the index dimension.
    async fn add(&self, chunks: Vec<Chunk>) -> Result<()>;

    /// Return the `k` entries nearest to `embedding`, closest first.
    ///
    /// Returns every entry when the index holds fewer than `k`. Fails with
    /// [`RagError::EmptyIndex`](crate::RagError::EmptyIndex) when there are
    /// no entries.
    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// Remove every entry belonging to `document_id`, returning how many were removed.
    async fn remove_document(&self, document_id: &str) -> Result<usize>;

    /// Number of stored entries.
    async fn len(&self) -> usize;

    /// Whether the index holds no entries.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// The dimension fixed for this index, once known.
    async fn dimension(&self) -> Option<usize>;

    /// The metric this index searches with.
    fn metric(&self) -> DistanceMetric;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_zero_distance() {
        let v = [0.3, -0.2, 0.9];
        assert!(DistanceMetric::Cosine.distance(&v, &v).abs() < 1e-6);
        assert_eq!(DistanceMetric::SquaredEuclidean.distance(&v, &v), 0.0);
    }

    #[test]
    fn zero_vector_has_unit_cosine_distance() {
        assert_eq!(DistanceMetric::Cosine.distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn squared_euclidean_is_not_rooted() {
        assert_eq!(squared_euclidean(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
    }
}
