//! Answer generation from an assembled context.
//!
//! A [`Generator`] turns `(context, question)` into answer text, either in one
//! piece or as a [`TextStream`] of fragments. Streams are lazy and owned by
//! the caller: dropping one before it ends is how generation is cancelled,
//! and any connection it holds is released with it.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::error::{RagError, Result};

/// A finite, ordered stream of answer fragments.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// System prompt for chat-style generators.
pub const SYSTEM_PROMPT: &str = "\
You are an AI assistant providing detailed answers based solely on the given context.
Context is passed as \"Context:\" and the user question as \"Question:\".

To answer the question:
1. Analyze the context and identify the information relevant to the question.
2. Structure the response logically, using paragraphs, lists, or headings where they help.
3. Base the answer only on the context. Do not add outside knowledge or assumptions.
4. If the context does not contain enough information to answer, say so clearly.";

/// The user message sent alongside [`SYSTEM_PROMPT`].
pub fn user_prompt(context: &str, query: &str) -> String {
    format!("Context: {context}\nQuestion: {query}")
}

/// A backend that answers a question from a context.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Start generating and return the fragments as they become available.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::GenerationError`](crate::RagError::GenerationError)
    /// if generation cannot start; failures mid-stream arrive as stream items.
    async fn generate_stream(&self, context: &str, query: &str) -> Result<TextStream>;

    /// Generate the full answer.
    ///
    /// The default implementation drains
    /// [`generate_stream`](Generator::generate_stream).
    async fn generate(&self, context: &str, query: &str) -> Result<String> {
        let mut stream = self.generate_stream(context, query).await?;
        let mut answer = String::new();
        while let Some(fragment) = stream.next().await {
            answer.push_str(&fragment?);
        }
        Ok(answer)
    }

    /// A short name used in logs and errors.
    fn name(&self) -> &str;
}

/// An offline generator that answers with the context itself.
///
/// The context is streamed back one sentence at a time. Useful for running
/// the pipeline without a model server and for inspecting what a real
/// generator would receive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveGenerator;

/// Split text after sentence-ending punctuation, keeping every character.
fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_none_or(|n| n.is_whitespace()) {
            while let Some(ws) = chars.next_if(|n| n.is_whitespace()) {
                current.push(ws);
            }
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[async_trait]
impl Generator for ExtractiveGenerator {
    async fn generate_stream(&self, context: &str, _query: &str) -> Result<TextStream> {
        let fragments = sentences(context);
        Ok(Box::pin(futures::stream::iter(fragments.into_iter().map(Ok::<_, RagError>))))
    }

    fn name(&self) -> &str {
        "extractive"
    }
}
