//! docrag CLI: ingest text files into a local index and ask questions about them.

mod commands;
mod env;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Retrieve, re-rank and answer questions over local documents
#[derive(Parser, Debug)]
#[command(name = "docrag", version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the index snapshot
    #[arg(long, env = "DOCRAG_INDEX", default_value = ".docrag")]
    pub index: PathBuf,

    /// Pipeline configuration file (JSON)
    #[arg(short, long, env = "DOCRAG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Embedding and generation backend
    #[arg(long, value_enum, env = "DOCRAG_BACKEND", default_value_t = Backend::Offline)]
    pub backend: Backend,

    /// Ollama server address
    #[arg(long, env = "OLLAMA_HOST", default_value = docrag::ollama::DEFAULT_HOST)]
    pub ollama_host: String,

    /// OpenAI-compatible server address, including any `/v1` prefix
    #[arg(long, env = "OPENAI_BASE_URL", default_value = docrag::openai::DEFAULT_BASE_URL)]
    pub openai_base_url: String,

    /// API key for the OpenAI-compatible server; unset for local servers
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Embedding model (Ollama or OpenAI-compatible backend)
    #[arg(long, env = "DOCRAG_EMBED_MODEL")]
    pub embed_model: Option<String>,

    /// Dimensionality of the embedding model
    #[arg(long, env = "DOCRAG_EMBED_DIMENSIONS", default_value_t = 768)]
    pub embed_dimensions: usize,

    /// Ollama chat model
    #[arg(long, env = "DOCRAG_CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// Cross-encoder rerank server (text-embeddings-inference); lexical scoring when unset
    #[arg(long, env = "DOCRAG_RERANKER_URL")]
    pub reranker_url: Option<String>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Feature-hashing embeddings and an extractive answer; no server needed
    Offline,
    /// Embeddings and chat from an Ollama server
    Ollama,
    /// Embeddings from an OpenAI-compatible server; extractive answers
    Openai,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Chunk, embed and index text files
    Ingest {
        /// Files to ingest (UTF-8 text)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show the nearest chunks for a query
    Search {
        query: String,
        /// Number of results
        #[arg(short, default_value_t = 5)]
        k: usize,
    },
    /// Answer a question from the indexed documents
    Ask {
        query: String,
        /// Candidates fetched from the index
        #[arg(long)]
        k_retrieve: Option<usize>,
        /// Candidates kept after re-ranking
        #[arg(long)]
        k_rerank: Option<usize>,
        /// Print the selected candidates and assembled context before the answer
        #[arg(long)]
        show_context: bool,
    },
    /// Show index size, dimension and metric
    Stats,
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(cwd) = std::env::current_dir() {
        env::load_dotenv(&cwd);
    }

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    commands::run(cli).await
}
