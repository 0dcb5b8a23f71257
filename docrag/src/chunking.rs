//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`RecursiveChunker`], which
//! splits text hierarchically (paragraphs, lines, punctuation, words, then
//! characters) and merges the pieces back into overlapping windows.

use crate::config::RagConfig;
use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// Separators tried in order: paragraph, line, punctuation, word, hard cut.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", ", ", "? ", "! ", " ", ""];

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata but no embeddings.
/// Embeddings are attached later by the pipeline.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    /// Each returned chunk has an empty embedding vector.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text recursively by separators, then merges the pieces into
/// windows of at most `chunk_size` characters.
///
/// Every window after the first begins with the last `chunk_overlap`
/// characters of the window before it, so consecutive chunks overlap by
/// exactly `chunk_overlap` characters. Sizes are counted in `char`s.
///
/// Chunk IDs are generated as `{document_id}_{sequence_index}`. Each chunk
/// inherits the parent document's metadata.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(400, 100)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker` with [`DEFAULT_SEPARATORS`].
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - maximum number of characters per chunk
    /// * `chunk_overlap` - number of characters repeated between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Create a chunker from the sizes and separators in a [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Ok(Self::new(config.chunk_size, config.chunk_overlap)?
            .with_separators(config.separators.iter().cloned()))
    }

    /// Replace the separator list. Order is priority order.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Split raw text into chunk texts.
    pub fn split(&self, text: &str) -> Vec<String> {
        let separators: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        split_text(text, self.chunk_size, self.chunk_overlap, &separators)
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.is_empty() {
            return Vec::new();
        }

        self.split(&document.text)
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                id: format!("{}_{i}", document.id),
                text,
                embedding: Vec::new(),
                metadata: document.metadata.clone(),
                document_id: document.id.clone(),
                sequence_index: i,
            })
            .collect()
    }
}

/// Split `text` into overlapping windows of at most `chunk_size` characters.
///
/// Callers must ensure `chunk_overlap < chunk_size`.
pub fn split_text(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &[&str],
) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    // Leaves room for the carried overlap plus at least one whole piece.
    let piece_limit = chunk_size.saturating_sub(chunk_overlap).max(1);

    let mut pieces = Vec::new();
    split_pieces(text, piece_limit, separators, &mut pieces);
    merge_pieces(&pieces, chunk_size, chunk_overlap)
}

/// Recursively split `text` until every piece is at most `limit` characters.
///
/// Concatenating the pieces reproduces `text`.
fn split_pieces<'a>(text: &'a str, limit: usize, separators: &[&str], out: &mut Vec<&'a str>) {
    if text.is_empty() {
        return;
    }
    if char_len(text) <= limit {
        out.push(text);
        return;
    }

    let Some(pos) = separators.iter().position(|sep| sep.is_empty() || text.contains(sep)) else {
        out.extend(split_by_size(text, limit));
        return;
    };
    let separator = separators[pos];
    if separator.is_empty() {
        out.extend(split_by_size(text, limit));
        return;
    }

    let remaining_separators = &separators[pos + 1..];
    for segment in split_keeping_separator(text, separator) {
        split_pieces(segment, limit, remaining_separators, out);
    }
}

/// Merge pieces into windows, carrying `overlap` characters between windows.
fn merge_pieces(pieces: &[&str], chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut windows = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    // Every flush is followed by a push, so the final window always holds a fresh piece.
    for piece in pieces {
        let piece_len = char_len(piece);
        if current_len > 0 && current_len + piece_len > chunk_size {
            let carried = tail_chars(&current, overlap).to_string();
            windows.push(std::mem::replace(&mut current, carried));
            current_len = char_len(&current);
        }
        current.push_str(piece);
        current_len += piece_len;
    }

    if current_len > 0 {
        windows.push(current);
    }

    windows
}

/// Split text at a separator while keeping the separator attached to the preceding segment.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

/// Hard character cut into pieces of at most `limit` characters.
fn split_by_size(text: &str, limit: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == limit {
            pieces.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }

    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces
}

/// The last `n` characters of `text` (all of it when shorter).
fn tail_chars(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match text.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
