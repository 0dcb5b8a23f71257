//! Subcommand handlers.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use docrag::ollama::{OllamaEmbeddingProvider, OllamaGenerator};
use docrag::openai::OpenAIEmbeddingProvider;
use docrag::tei::TeiRelevanceModel;
use docrag::{
    CrossEncoderReranker, Document, EmbeddingProvider, ExtractiveGenerator, Generator,
    HashingEmbeddingProvider, InMemoryVectorIndex, RagConfig, RagPipeline, VectorIndex,
};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::{Backend, Cli, Command};

/// Longest candidate preview printed by `search` and `ask --show-context`.
const PREVIEW_CHARS: usize = 120;

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let index = Arc::new(
        InMemoryVectorIndex::open_or_create(&cli.index, config.metric)
            .await
            .with_context(|| format!("opening index at {}", cli.index.display()))?,
    );
    if index.metric() != config.metric {
        warn!(
            index.metric = ?index.metric(),
            config.metric = ?config.metric,
            "index was built with a different metric; keeping the index metric"
        );
    }

    if let Command::Stats = cli.command {
        return stats(&index).await;
    }

    let pipeline = build_pipeline(&cli, config, index.clone())?;
    match cli.command {
        Command::Ingest { files } => ingest(&pipeline, &index, &cli.index, &files).await,
        Command::Search { query, k } => search(&pipeline, &query, k).await,
        Command::Ask { query, k_retrieve, k_rerank, show_context } => {
            let k_retrieve = k_retrieve.unwrap_or(pipeline.config().k_retrieve);
            let k_rerank = k_rerank.unwrap_or(pipeline.config().k_rerank);
            ask(&pipeline, &query, k_retrieve, k_rerank, show_context).await
        }
        Command::Stats => stats(&index).await,
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RagConfig> {
    let Some(path) = path else {
        return Ok(RagConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: RagConfig = serde_json::from_str(&raw)
        .with_context(|| format!("parsing config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn build_pipeline(
    cli: &Cli,
    config: RagConfig,
    index: Arc<InMemoryVectorIndex>,
) -> anyhow::Result<RagPipeline> {
    let embedder: Arc<dyn EmbeddingProvider>;
    let generator: Arc<dyn Generator>;
    match cli.backend {
        Backend::Offline => {
            embedder = Arc::new(HashingEmbeddingProvider::default());
            generator = Arc::new(ExtractiveGenerator);
        }
        Backend::Ollama => {
            let mut ollama_embedder = OllamaEmbeddingProvider::new(&cli.ollama_host);
            if let Some(model) = &cli.embed_model {
                ollama_embedder = ollama_embedder.with_model(model, cli.embed_dimensions);
            }
            let mut ollama_generator = OllamaGenerator::new(&cli.ollama_host);
            if let Some(model) = &cli.chat_model {
                ollama_generator = ollama_generator.with_model(model);
            }
            embedder = Arc::new(ollama_embedder);
            generator = Arc::new(ollama_generator);
        }
        Backend::Openai => {
            let mut openai_embedder = OpenAIEmbeddingProvider::compatible(&cli.openai_base_url);
            if let Some(key) = &cli.openai_api_key {
                openai_embedder = openai_embedder.with_api_key(key);
            }
            if let Some(model) = &cli.embed_model {
                openai_embedder = openai_embedder.with_model(model, cli.embed_dimensions);
            }
            embedder = Arc::new(openai_embedder);
            generator = Arc::new(ExtractiveGenerator);
        }
    }
    debug!(backend = ?cli.backend, generator = generator.name(), "pipeline ready");

    let mut builder = RagPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .index(index)
        .generator(generator);
    if let Some(url) = &cli.reranker_url {
        builder = builder
            .reranker(Arc::new(CrossEncoderReranker::new(Arc::new(TeiRelevanceModel::new(url)))));
    }
    Ok(builder.build()?)
}

async fn ingest(
    pipeline: &RagPipeline,
    index: &InMemoryVectorIndex,
    index_dir: &Path,
    files: &[PathBuf],
) -> anyhow::Result<()> {
    let mut total = 0;
    for file in files {
        let text = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("reading {}", file.display()))?;
        let Some(file_name) = file.file_name().and_then(|n| n.to_str()) else {
            bail!("{} has no usable file name", file.display());
        };

        let document = Document::from_file_name(file_name, text);
        let count = pipeline.ingest(&document).await?;
        println!("{}: {count} chunk(s)", document.id);
        total += count;
    }

    index.save(index_dir).await?;
    info!(total, index = %index_dir.display(), "saved index");
    Ok(())
}

async fn search(pipeline: &RagPipeline, query: &str, k: usize) -> anyhow::Result<()> {
    let results = pipeline.retrieve(query, k).await?;
    if results.is_empty() {
        println!("no results");
    }
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.4}] {}: {}",
            rank + 1,
            result.distance,
            result.chunk.id,
            preview(&result.chunk.text)
        );
    }
    Ok(())
}

async fn ask(
    pipeline: &RagPipeline,
    query: &str,
    k_retrieve: usize,
    k_rerank: usize,
    show_context: bool,
) -> anyhow::Result<()> {
    let prepared = pipeline.query_with(query, k_retrieve, k_rerank).await?;
    if show_context {
        println!("Selected candidates: {:?}", prepared.reranking.indices);
        for result in prepared.selected() {
            println!(
                "  [{:.4}] {}: {}",
                result.distance,
                result.chunk.id,
                preview(&result.chunk.text)
            );
        }
        println!("--- context ---\n{}\n---------------", prepared.context);
    }

    let mut answer = pipeline.generate(&prepared, query).await?;
    let mut stdout = std::io::stdout().lock();
    while let Some(fragment) = answer.next().await {
        stdout.write_all(fragment?.as_bytes())?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}

async fn stats(index: &InMemoryVectorIndex) -> anyhow::Result<()> {
    println!("entries:   {}", index.len().await);
    match index.dimension().await {
        Some(dimension) => println!("dimension: {dimension}"),
        None => println!("dimension: (unset)"),
    }
    println!("metric:    {:?}", index.metric());
    Ok(())
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_flattens_and_truncates() {
        assert_eq!(preview("a\n\nb  c"), "a b c");
        let long = "x".repeat(PREVIEW_CHARS + 10);
        assert_eq!(preview(&long), format!("{}...", "x".repeat(PREVIEW_CHARS)));
    }

    #[test]
    fn missing_config_path_uses_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.chunk_size, 400);
        assert_eq!(config.k_rerank, 3);
    }

    #[test]
    fn invalid_config_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rag.json");
        std::fs::write(&path, r#"{"chunk_size": 10, "chunk_overlap": 10}"#).unwrap();
        assert!(load_config(Some(&path)).is_err());

        std::fs::write(&path, r#"{"k_rerank": 5}"#).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap().k_rerank, 5);
    }

    #[test]
    fn openai_backend_uses_compatible_embedder() {
        use clap::Parser;

        let cli = Cli::try_parse_from([
            "docrag",
            "--backend",
            "openai",
            "--openai-base-url",
            "http://localhost:8000/v1",
            "--embed-model",
            "BAAI/bge-large-en-v1.5",
            "--embed-dimensions",
            "1024",
            "stats",
        ])
        .unwrap();
        assert_eq!(cli.backend, Backend::Openai);

        let index = Arc::new(InMemoryVectorIndex::default());
        let pipeline = build_pipeline(&cli, RagConfig::default(), index).unwrap();
        assert_eq!(pipeline.embedding_provider().dimensions(), 1024);
    }
}
