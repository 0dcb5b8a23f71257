//! Configuration for the retrieval pipeline.

use serde::{Deserialize, Serialize};

use crate::chunking::DEFAULT_SEPARATORS;
use crate::error::{RagError, Result};
use crate::vectorstore::DistanceMetric;

/// Configuration parameters for the retrieval pipeline.
///
/// Deserializes from partial JSON; missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of characters repeated between consecutive chunks.
    pub chunk_overlap: usize,
    /// Separators tried in order when splitting text. `""` means a hard cut.
    pub separators: Vec<String>,
    /// Number of candidates fetched from the vector index per query.
    pub k_retrieve: usize,
    /// Number of candidates kept after re-ranking.
    pub k_rerank: usize,
    /// Character budget for the assembled generation context.
    pub max_context_chars: usize,
    /// Distance metric for newly created indexes.
    pub metric: DistanceMetric,
    /// Candidates farther than this are dropped after retrieval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_distance: Option<f32>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 400,
            chunk_overlap: 100,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
            k_retrieve: 10,
            k_rerank: 3,
            max_context_chars: 4000,
            metric: DistanceMetric::Cosine,
            max_distance: None,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `k_retrieve == 0` or `k_rerank == 0`
    /// - `max_context_chars == 0`
    /// - `max_distance` is negative or NaN
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.k_retrieve == 0 {
            return Err(RagError::ConfigError("k_retrieve must be greater than zero".to_string()));
        }
        if self.k_rerank == 0 {
            return Err(RagError::ConfigError("k_rerank must be greater than zero".to_string()));
        }
        if self.max_context_chars == 0 {
            return Err(RagError::ConfigError(
                "max_context_chars must be greater than zero".to_string(),
            ));
        }
        if let Some(max) = self.max_distance {
            if max.is_nan() || max < 0.0 {
                return Err(RagError::ConfigError(format!(
                    "max_distance ({max}) must be a non-negative number"
                )));
            }
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Replace the separator list.
    pub fn separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Set the number of candidates fetched from the index.
    pub fn k_retrieve(mut self, k: usize) -> Self {
        self.config.k_retrieve = k;
        self
    }

    /// Set the number of candidates kept after re-ranking.
    pub fn k_rerank(mut self, k: usize) -> Self {
        self.config.k_rerank = k;
        self
    }

    /// Set the context budget in characters.
    pub fn max_context_chars(mut self, chars: usize) -> Self {
        self.config.max_context_chars = chars;
        self
    }

    /// Set the distance metric.
    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.config.metric = metric;
        self
    }

    /// Drop retrieved candidates farther than `distance`.
    pub fn max_distance(mut self, distance: f32) -> Self {
        self.config.max_distance = Some(distance);
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.k_retrieve, 10);
        assert_eq!(config.k_rerank, 3);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let err = RagConfig::builder().chunk_size(20).chunk_overlap(20).build().unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[test]
    fn zero_rerank_is_rejected() {
        assert!(RagConfig::builder().k_rerank(0).build().is_err());
    }

    #[test]
    fn zero_context_budget_is_rejected() {
        let err = RagConfig::builder().max_context_chars(0).build().unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
        assert!(RagConfig::builder().max_context_chars(1).build().is_ok());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: RagConfig =
            serde_json::from_str(r#"{"chunk_size": 200, "metric": "squared_euclidean"}"#).unwrap();
        assert_eq!(config.chunk_size, 200);
        assert_eq!(config.chunk_overlap, 100);
        assert_eq!(config.metric, DistanceMetric::SquaredEuclidean);
        assert!(config.max_distance.is_none());
    }
}
