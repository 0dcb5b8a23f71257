//! Second-stage re-ranking of retrieved candidates.
//!
//! A [`Reranker`] takes the query and the candidate texts produced by vector
//! search and keeps the most relevant few. [`CrossEncoderReranker`] does this
//! with a [`RelevanceModel`] that scores each (query, candidate) pair jointly,
//! which ranks more precisely than comparing independent embeddings.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::document::Reranking;
use crate::error::{RagError, Result};

/// Default number of candidates kept by a reranker.
pub const DEFAULT_TOP_K: usize = 3;

/// A reranker that re-scores and reorders candidate texts.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rank `candidates` against `query` and keep the best `top_k`.
    ///
    /// The returned [`Reranking`] holds the selected texts concatenated in
    /// ranked order and their original indices in `candidates`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyCandidateSet`] when `candidates` is empty.
    async fn rerank(&self, query: &str, candidates: &[String], top_k: usize) -> Result<Reranking>;
}

/// A pairwise relevance model, such as a cross-encoder.
///
/// Returns one score per candidate, higher meaning more relevant.
#[async_trait]
pub trait RelevanceModel: Send + Sync {
    /// Score every candidate against the query.
    async fn score(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>>;

    /// A short name used in logs and errors.
    fn name(&self) -> &str;
}

type ModelLoader = Box<dyn Fn() -> Result<Arc<dyn RelevanceModel>> + Send + Sync>;

/// A [`Reranker`] backed by a [`RelevanceModel`].
///
/// The model is either supplied ready to use, or produced by a loader that
/// runs on the first call and is reused for every later call. A failed load
/// is reported to the caller and retried on the next call.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use docrag::{CrossEncoderReranker, LexicalRelevanceModel, Reranker};
///
/// let reranker = CrossEncoderReranker::new(Arc::new(LexicalRelevanceModel::default()));
/// let ranked = reranker.rerank("pto carryover", &candidates, 3).await?;
/// println!("{:?}", ranked.indices);
/// ```
pub struct CrossEncoderReranker {
    model: OnceCell<Arc<dyn RelevanceModel>>,
    loader: Option<ModelLoader>,
}

impl CrossEncoderReranker {
    /// Create a reranker around an already loaded model.
    pub fn new(model: Arc<dyn RelevanceModel>) -> Self {
        Self { model: OnceCell::new_with(Some(model)), loader: None }
    }

    /// Create a reranker that loads its model on first use.
    pub fn lazy<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn RelevanceModel>> + Send + Sync + 'static,
    {
        Self { model: OnceCell::new(), loader: Some(Box::new(loader)) }
    }

    async fn model(&self) -> Result<&Arc<dyn RelevanceModel>> {
        self.model
            .get_or_try_init(|| async {
                let loader = self.loader.as_ref().ok_or_else(|| RagError::RerankerError {
                    reranker: "CrossEncoder".to_string(),
                    message: "no model or loader configured".to_string(),
                })?;
                debug!("loading relevance model");
                loader()
            })
            .await
    }
}

impl fmt::Debug for CrossEncoderReranker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossEncoderReranker")
            .field("model", &self.model.get().map(|m| m.name().to_string()))
            .field("lazy", &self.loader.is_some())
            .finish()
    }
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
    async fn rerank(&self, query: &str, candidates: &[String], top_k: usize) -> Result<Reranking> {
        if candidates.is_empty() {
            return Err(RagError::EmptyCandidateSet);
        }

        let model = self.model().await?;
        let texts: Vec<&str> = candidates.iter().map(String::as_str).collect();
        let scores = model.score(query, &texts).await?;
        if scores.len() != candidates.len() {
            return Err(RagError::RerankerError {
                reranker: model.name().to_string(),
                message: format!(
                    "model returned {} scores for {} candidates",
                    scores.len(),
                    candidates.len()
                ),
            });
        }

        let reranking = select_top_k(candidates, &scores, top_k);
        debug!(
            model = model.name(),
            candidates = candidates.len(),
            selected = ?reranking.indices,
            "reranked candidates"
        );
        Ok(reranking)
    }
}

/// Order candidates by descending score and keep the first `top_k`.
///
/// Ties keep their original order and NaN scores sort last.
pub fn select_top_k(candidates: &[String], scores: &[f32], top_k: usize) -> Reranking {
    let mut order: Vec<usize> = (0..candidates.len().min(scores.len())).collect();
    order.sort_by(|&a, &b| {
        let (sa, sb) = (scores[a], scores[b]);
        match (sa.is_nan(), sb.is_nan()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => sb.total_cmp(&sa),
        }
    });
    order.truncate(top_k);

    let mut reranking = Reranking::default();
    for index in order {
        reranking.text.push_str(&candidates[index]);
        reranking.indices.push(index);
        reranking.scores.push(scores[index]);
    }
    reranking
}

/// An offline relevance model scoring query terms found in the candidate.
///
/// Each distinct query term present in the candidate contributes a
/// BM25-style saturated term frequency, damped by candidate length. Query and
/// candidate are scored together, so the result depends on the pair rather
/// than on two independent vectors.
#[derive(Debug, Clone)]
pub struct LexicalRelevanceModel {
    k1: f32,
    b: f32,
    avg_len: f32,
}

impl Default for LexicalRelevanceModel {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75, avg_len: 60.0 }
    }
}

impl LexicalRelevanceModel {
    /// Create a model with custom BM25 saturation (`k1`) and length normalization (`b`).
    pub fn new(k1: f32, b: f32) -> Self {
        Self { k1, b, ..Self::default() }
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_lowercase)
}

#[async_trait]
impl RelevanceModel for LexicalRelevanceModel {
    async fn score(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>> {
        let terms: BTreeSet<String> = tokenize(query).collect();
        Ok(candidates
            .iter()
            .map(|candidate| {
                let tokens: Vec<String> = tokenize(candidate).collect();
                let len = tokens.len() as f32;
                let norm = self.k1 * (1.0 - self.b + self.b * len / self.avg_len);
                terms
                    .iter()
                    .map(|term| {
                        let tf = tokens.iter().filter(|t| *t == term).count() as f32;
                        if tf == 0.0 { 0.0 } else { tf * (self.k1 + 1.0) / (tf + norm) }
                    })
                    .sum::<f32>()
            })
            .collect())
    }

    fn name(&self) -> &str {
        "lexical"
    }
}
