//! Data types for documents, chunks, and search results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Optional URI pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    /// Create a document with no metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: HashMap::new(), source_uri: None }
    }

    /// Create a document whose id is derived from an uploaded file name.
    ///
    /// The file name is kept as `source_uri` and the id is normalized with
    /// [`normalize_document_id`].
    pub fn from_file_name(file_name: &str, text: impl Into<String>) -> Self {
        let mut document = Self::new(normalize_document_id(file_name), text);
        document.metadata.insert("file_name".to_string(), file_name.to_string());
        document.source_uri = Some(file_name.to_string());
        document
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Turn a file name into a document id: `-`, `.` and spaces become `_`.
pub fn normalize_document_id(file_name: &str) -> String {
    file_name.chars().map(|c| if matches!(c, '-' | '.' | ' ') { '_' } else { c }).collect()
}

/// A segment of a [`Document`] with its vector embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk, `{document_id}_{sequence_index}`.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The vector embedding for this chunk's text. Empty until ingestion.
    #[serde(default)]
    pub embedding: Vec<f32>,
    /// Key-value metadata inherited from the parent document.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Position of this chunk within its document.
    pub sequence_index: usize,
}

/// A retrieved [`Chunk`] paired with its distance to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Distance to the query embedding (lower is closer).
    pub distance: f32,
}

/// The outcome of re-ranking a candidate set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Reranking {
    /// Selected candidate texts concatenated in ranked order.
    pub text: String,
    /// Original candidate indices of the selected texts, in ranked order.
    pub indices: Vec<usize>,
    /// Relevance scores matching `indices` (higher is more relevant).
    pub scores: Vec<f32>,
}

/// Everything the query path computes before generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryContext {
    /// First-stage retrieval results, nearest first.
    pub candidates: Vec<SearchResult>,
    /// Second-stage re-ranking over the candidate texts.
    pub reranking: Reranking,
    /// Bounded context handed to the generator.
    pub context: String,
}

impl QueryContext {
    /// The candidates selected by the re-ranker, in ranked order.
    pub fn selected(&self) -> impl Iterator<Item = &SearchResult> {
        self.reranking.indices.iter().filter_map(|&i| self.candidates.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_normalized() {
        assert_eq!(normalize_document_id("q3 report-final.txt"), "q3_report_final_txt");
        let doc = Document::from_file_name("my notes.md", "body");
        assert_eq!(doc.id, "my_notes_md");
        assert_eq!(doc.source_uri.as_deref(), Some("my notes.md"));
        assert_eq!(doc.metadata.get("file_name").map(String::as_str), Some("my notes.md"));
    }
}
