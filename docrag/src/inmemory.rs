//! In-memory vector index with exhaustive search.
//!
//! This module provides [`InMemoryVectorIndex`], a flat index backed by a
//! `Vec` protected by a `tokio::sync::RwLock`. Searches score every entry, so
//! it suits development, tests, and document sets up to a few hundred
//! thousand chunks. The index can be snapshotted to a directory and loaded
//! back.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::{DistanceMetric, VectorIndex};

/// File name of the snapshot inside an index directory.
pub const SNAPSHOT_FILE: &str = "index.json";

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    /// Insertion-order id, never reused.
    id: u64,
    chunk: Chunk,
}

#[derive(Debug, Default)]
struct IndexState {
    dimension: Option<usize>,
    next_id: u64,
    entries: Vec<IndexEntry>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    metric: DistanceMetric,
    dimension: Option<usize>,
    next_id: u64,
    entries: Vec<IndexEntry>,
}

/// An in-memory vector index searched exhaustively.
///
/// Entries are kept in insertion order; equal distances resolve to the
/// earlier insertion. Re-adding chunks of an already indexed document
/// appends new entries next to the old ones. Use
/// [`remove_document`](VectorIndex::remove_document) first to replace a
/// document.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::{DistanceMetric, InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new(DistanceMetric::Cosine);
/// index.add(chunks).await?;
/// index.save("./docrag-index").await?;
/// ```
#[derive(Debug)]
pub struct InMemoryVectorIndex {
    metric: DistanceMetric,
    state: RwLock<IndexState>,
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new(DistanceMetric::default())
    }
}

impl InMemoryVectorIndex {
    /// Create an empty index that adopts the dimension of its first insertion.
    pub fn new(metric: DistanceMetric) -> Self {
        Self { metric, state: RwLock::new(IndexState::default()) }
    }

    /// Create an empty index with the dimension fixed up front.
    pub fn with_dimension(metric: DistanceMetric, dimension: usize) -> Self {
        Self {
            metric,
            state: RwLock::new(IndexState { dimension: Some(dimension), ..IndexState::default() }),
        }
    }

    /// Write a snapshot of the index into `dir`, creating it if needed.
    ///
    /// The snapshot is written to a temporary file and renamed into place, so
    /// a crash never leaves a half-written `index.json`.
    pub async fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        let json = {
            let state = self.state.read().await;
            let snapshot = Snapshot {
                version: SNAPSHOT_VERSION,
                metric: self.metric,
                dimension: state.dimension,
                next_id: state.next_id,
                entries: state.entries.clone(),
            };
            serde_json::to_vec(&snapshot).map_err(|e| {
                RagError::PersistenceError(format!("failed to serialize index: {e}"))
            })?
        };

        tokio::fs::create_dir_all(dir).await.map_err(|e| io_error("create", dir, e))?;
        let path = dir.join(SNAPSHOT_FILE);
        let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        tokio::fs::write(&tmp, &json).await.map_err(|e| io_error("write", &tmp, e))?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| io_error("rename", &path, e))?;

        info!(path = %path.display(), bytes = json.len(), "saved vector index");
        Ok(())
    }

    /// Load an index previously written with [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PersistenceError`] if the snapshot is missing,
    /// unreadable, or inconsistent.
    pub async fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(SNAPSHOT_FILE);
        let bytes = tokio::fs::read(&path).await.map_err(|e| io_error("read", &path, e))?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
            RagError::PersistenceError(format!("invalid snapshot {}: {e}", path.display()))
        })?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(RagError::PersistenceError(format!(
                "unsupported snapshot version {} in {}",
                snapshot.version,
                path.display()
            )));
        }
        check_snapshot(&snapshot)
            .map_err(|e| RagError::PersistenceError(format!("{e} in {}", path.display())))?;

        debug!(path = %path.display(), entries = snapshot.entries.len(), "loaded vector index");
        Ok(Self {
            metric: snapshot.metric,
            state: RwLock::new(IndexState {
                dimension: snapshot.dimension,
                next_id: snapshot.next_id,
                entries: snapshot.entries,
            }),
        })
    }

    /// Load the index in `dir` if a snapshot exists, otherwise create an empty one.
    pub async fn open_or_create(dir: impl AsRef<Path>, metric: DistanceMetric) -> Result<Self> {
        let dir = dir.as_ref();
        match tokio::fs::try_exists(dir.join(SNAPSHOT_FILE)).await {
            Ok(true) => Self::load(dir).await,
            Ok(false) => Ok(Self::new(metric)),
            Err(e) => Err(io_error("inspect", dir, e)),
        }
    }
}

/// Structural checks a snapshot must pass before its entries are trusted.
fn check_snapshot(snapshot: &Snapshot) -> std::result::Result<(), String> {
    let dimension = match (snapshot.dimension, snapshot.entries.is_empty()) {
        (Some(0), _) => return Err("dimension 0".to_string()),
        (Some(dimension), _) => dimension,
        (None, true) => return Ok(()),
        (None, false) => return Err("entries without a dimension".to_string()),
    };

    let mut last_id = None;
    for entry in &snapshot.entries {
        if entry.chunk.embedding.len() != dimension {
            return Err(format!(
                "entry '{}' has dimension {}, snapshot declares {dimension}",
                entry.chunk.id,
                entry.chunk.embedding.len()
            ));
        }
        if last_id.is_some_and(|last| entry.id <= last) {
            return Err(format!("entry id {} is out of order", entry.id));
        }
        last_id = Some(entry.id);
    }
    if let Some(last) = last_id {
        if snapshot.next_id <= last {
            return Err(format!("next_id {} does not exceed entry id {last}", snapshot.next_id));
        }
    }
    Ok(())
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> RagError {
    RagError::PersistenceError(format!("failed to {action} {}: {e}", path.display()))
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add(&self, chunks: Vec<Chunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        if let Some(chunk) = chunks.iter().find(|c| c.embedding.is_empty()) {
            return Err(RagError::EmbeddingError {
                provider: "index".to_string(),
                message: format!("chunk '{}' has no embedding", chunk.id),
            });
        }

        let mut state = self.state.write().await;
        let expected = state.dimension.unwrap_or(chunks[0].embedding.len());
        if let Some(chunk) = chunks.iter().find(|c| c.embedding.len() != expected) {
            return Err(RagError::DimensionMismatch { expected, actual: chunk.embedding.len() });
        }

        state.dimension = Some(expected);
        let count = chunks.len();
        for chunk in chunks {
            let id = state.next_id;
            state.next_id += 1;
            state.entries.push(IndexEntry { id, chunk });
        }
        debug!(added = count, total = state.entries.len(), "indexed chunks");
        Ok(())
    }

    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if embedding.is_empty() {
            return Err(RagError::EmbeddingError {
                provider: "index".to_string(),
                message: "query embedding is empty".to_string(),
            });
        }
        let state = self.state.read().await;
        if state.entries.is_empty() {
            return Err(RagError::EmptyIndex);
        }
        if let Some(expected) = state.dimension {
            if embedding.len() != expected {
                return Err(RagError::DimensionMismatch { expected, actual: embedding.len() });
            }
        }

        let mut scored: Vec<(f32, &IndexEntry)> = state
            .entries
            .iter()
            .map(|entry| (self.metric.distance(&entry.chunk.embedding, embedding), entry))
            .collect();

        // Stable sort over insertion order keeps ties deterministic.
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, entry)| SearchResult { chunk: entry.chunk.clone(), distance })
            .collect())
    }

    async fn remove_document(&self, document_id: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let before = state.entries.len();
        state.entries.retain(|entry| entry.chunk.document_id != document_id);
        let removed = before - state.entries.len();
        debug!(document.id = document_id, removed, "removed document entries");
        Ok(removed)
    }

    async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    async fn dimension(&self) -> Option<usize> {
        self.state.read().await.dimension
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }
}
