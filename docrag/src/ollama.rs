//! Ollama embedding provider and streaming generator.
//!
//! This module is only available when the `ollama` feature is enabled.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{Generator, SYSTEM_PROMPT, TextStream, user_prompt};

/// The default Ollama server address.
pub const DEFAULT_HOST: &str = "http://localhost:11434";

/// The default embedding model.
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// The dimensionality of `nomic-embed-text`.
const DEFAULT_DIMENSIONS: usize = 768;

/// The default chat model.
const DEFAULT_CHAT_MODEL: &str = "llama3.2:3b";

fn endpoint(host: &str, path: &str) -> String {
    format!("{}/{path}", host.trim_end_matches('/'))
}

/// An [`EmbeddingProvider`] backed by a local Ollama server.
///
/// Calls `POST /api/embeddings` once per text.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::ollama::OllamaEmbeddingProvider;
///
/// let provider = OllamaEmbeddingProvider::new("http://localhost:11434");
/// let embedding = provider.embed("hello world").await?;
/// ```
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    host: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbeddingProvider {
    /// Create a provider for the server at `host` using `nomic-embed-text`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
        }
    }

    /// Set the model name and the dimensionality it produces.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

fn embedding_error(message: String) -> RagError {
    RagError::EmbeddingError { provider: "Ollama".into(), message }
}

fn generation_error(message: String) -> RagError {
    RagError::GenerationError { generator: "Ollama".into(), message }
}

async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);
    format!("API returned {status}: {detail}")
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = "Ollama", model = %self.model, text_len = text.len(), "embedding text");

        let response = self
            .client
            .post(endpoint(&self.host, "api/embeddings"))
            .json(&EmbeddingRequest { model: &self.model, prompt: text })
            .send()
            .await
            .map_err(|e| {
                error!(provider = "Ollama", error = %e, "request failed");
                embedding_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!(provider = "Ollama", %detail, "API error");
            return Err(embedding_error(detail));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| embedding_error(format!("failed to parse response: {e}")))?;
        if body.embedding.is_empty() {
            let message = format!("model '{}' returned an empty embedding", self.model);
            return Err(embedding_error(message));
        }
        Ok(body.embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// A [`Generator`] streaming answers from Ollama's `POST /api/chat`.
///
/// Sends [`SYSTEM_PROMPT`] and a `Context: ... Question: ...` user message,
/// then yields message fragments until the server reports `done`.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: reqwest::Client,
    host: String,
    model: String,
}

impl OllamaGenerator {
    /// Create a generator for the server at `host` using `llama3.2:3b`.
    pub fn new(host: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), host: host.into(), model: DEFAULT_CHAT_MODEL.into() }
    }

    /// Set the chat model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChatChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChatChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, PartialEq)]
enum ChatLine {
    Skip,
    Fragment(String),
    Done,
}

fn parse_chat_line(line: &[u8]) -> Result<ChatLine> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(ChatLine::Skip);
    }
    let chunk: ChatChunk = serde_json::from_slice(line)
        .map_err(|e| generation_error(format!("malformed stream line: {e}")))?;
    if let Some(message) = chunk.error {
        return Err(generation_error(message));
    }
    if chunk.done {
        return Ok(ChatLine::Done);
    }
    match chunk.message {
        Some(message) if !message.content.is_empty() => Ok(ChatLine::Fragment(message.content)),
        _ => Ok(ChatLine::Skip),
    }
}

/// Turn a newline-delimited JSON response body into answer fragments.
fn chat_fragments(response: reqwest::Response) -> impl Stream<Item = Result<String>> + Send {
    try_stream! {
        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut done = false;

        while !done {
            let bytes = match body.next().await {
                Some(bytes) => bytes,
                None => break,
            };
            let bytes = bytes.map_err(|e| generation_error(format!("stream error: {e}")))?;
            buffer.extend_from_slice(&bytes);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                match parse_chat_line(&line)? {
                    ChatLine::Skip => {}
                    ChatLine::Fragment(text) => {
                        yield text;
                    }
                    ChatLine::Done => {
                        done = true;
                        break;
                    }
                }
            }
        }

        if !done {
            if let ChatLine::Fragment(text) = parse_chat_line(&buffer)? {
                yield text;
            }
        }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate_stream(&self, context: &str, query: &str) -> Result<TextStream> {
        let prompt = user_prompt(context, query);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: &prompt },
            ],
            stream: true,
        };

        debug!(
            generator = "Ollama",
            model = %self.model,
            context_len = context.len(),
            "starting chat"
        );
        let response = self
            .client
            .post(endpoint(&self.host, "api/chat"))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(generator = "Ollama", error = %e, "request failed");
                generation_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!(generator = "Ollama", %detail, "API error");
            return Err(generation_error(detail));
        }

        Ok(Box::pin(chat_fragments(response)))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
