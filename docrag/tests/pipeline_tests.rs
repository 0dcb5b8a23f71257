//! End-to-end tests for ingestion and answering through `RagPipeline`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use docrag::{
    Document, EmbeddingProvider, ExtractiveGenerator, Generator, HashingEmbeddingProvider,
    InMemoryVectorIndex, RagConfig, RagError, RagPipeline, Result, Stage, TextStream, VectorIndex,
};
use futures::StreamExt;

/// A generator that counts how often it is started.
#[derive(Default)]
struct CountingGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl Generator for CountingGenerator {
    async fn generate_stream(&self, context: &str, _query: &str) -> Result<TextStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let context = context.to_string();
        Ok(Box::pin(futures::stream::iter(vec![Ok(context)])))
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// Embeds successfully until `fail_after` texts, then errors.
struct FlakyEmbedder {
    inner: HashingEmbeddingProvider,
    fail_after: usize,
    seen: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.seen.fetch_add(1, Ordering::SeqCst) >= self.fail_after {
            return Err(RagError::EmbeddingError {
                provider: "flaky".to_string(),
                message: "backend unavailable".to_string(),
            });
        }
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

/// A generator whose stream fails after its first fragment.
struct BrokenStreamGenerator;

#[async_trait]
impl Generator for BrokenStreamGenerator {
    async fn generate_stream(&self, _context: &str, _query: &str) -> Result<TextStream> {
        Ok(Box::pin(futures::stream::iter(vec![
            Ok("partial".to_string()),
            Err(RagError::GenerationError {
                generator: "broken".to_string(),
                message: "connection reset".to_string(),
            }),
        ])))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

fn small_config() -> RagConfig {
    RagConfig::builder().chunk_size(80).chunk_overlap(10).k_retrieve(5).k_rerank(2).build().unwrap()
}

fn pipeline_with(
    index: Arc<InMemoryVectorIndex>,
    generator: Arc<dyn Generator>,
    config: RagConfig,
) -> RagPipeline {
    RagPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
        .index(index)
        .generator(generator)
        .build()
        .unwrap()
}

fn handbook() -> Vec<Document> {
    vec![
        Document::new(
            "leave",
            "Employees accrue vacation days monthly. \
             Unused vacation days carry over up to five days.",
        ),
        Document::new(
            "expenses",
            "Hotel expenses are reimbursed up to the city limit. Meals are covered during travel.",
        ),
        Document::new(
            "equipment",
            "Remote workers receive a laptop and a monitor. Equipment is returned on departure.",
        ),
    ]
}

async fn collect(mut stream: TextStream) -> Result<String> {
    let mut answer = String::new();
    while let Some(fragment) = stream.next().await {
        answer.push_str(&fragment?);
    }
    Ok(answer)
}

#[tokio::test]
async fn ingest_then_answer_uses_relevant_context() {
    let index = Arc::new(InMemoryVectorIndex::default());
    let pipeline = pipeline_with(index.clone(), Arc::new(ExtractiveGenerator), small_config());

    let count = pipeline.ingest_batch(&handbook()).await.unwrap();
    assert_eq!(index.len().await, count);
    assert!(count >= 3);

    let prepared = pipeline.query("How many vacation days carry over?").await.unwrap();
    assert!(prepared.reranking.indices.len() <= 2);
    assert!(prepared.context.contains("vacation"));
    let top = prepared.selected().next().unwrap();
    assert_eq!(top.chunk.document_id, "leave");

    let answer = collect(pipeline.answer("How many vacation days carry over?").await.unwrap())
        .await
        .unwrap();
    assert_eq!(answer, prepared.context);
}

#[tokio::test]
async fn k_beyond_index_size_returns_the_single_chunk() {
    let index = Arc::new(InMemoryVectorIndex::default());
    let pipeline = pipeline_with(index, Arc::new(ExtractiveGenerator), small_config());
    pipeline.ingest(&Document::new("one", "A single short note.")).await.unwrap();

    let results = pipeline.retrieve("note", 5).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.id, "one_0");
}

#[tokio::test]
async fn querying_an_empty_index_fails() {
    let generator = Arc::new(CountingGenerator::default());
    let pipeline =
        pipeline_with(Arc::new(InMemoryVectorIndex::default()), generator.clone(), small_config());

    let err = pipeline.answer("anything").await.err().unwrap();
    assert!(matches!(err.root(), RagError::EmptyIndex));
    assert_eq!(err.stage(), Some(Stage::Retrieve));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn no_hits_fails_before_generation() {
    let generator = Arc::new(CountingGenerator::default());
    let config = RagConfig::builder().max_distance(0.0).build().unwrap();
    let pipeline =
        pipeline_with(Arc::new(InMemoryVectorIndex::default()), generator.clone(), config);
    pipeline.ingest_batch(&handbook()).await.unwrap();

    let err = pipeline.answer("quarterly tax filing deadlines").await.err().unwrap();
    assert!(matches!(err.root(), RagError::NoResults));
    assert_eq!(err.stage(), Some(Stage::Retrieve));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn zero_k_retrieve_is_no_results() {
    let generator = Arc::new(CountingGenerator::default());
    let pipeline =
        pipeline_with(Arc::new(InMemoryVectorIndex::default()), generator.clone(), small_config());
    pipeline.ingest_batch(&handbook()).await.unwrap();

    let err = pipeline.answer_with("laptop", 0, 3).await.err().unwrap();
    assert!(matches!(err.root(), RagError::NoResults));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn zero_k_rerank_fails_before_generation() {
    let generator = Arc::new(CountingGenerator::default());
    let pipeline =
        pipeline_with(Arc::new(InMemoryVectorIndex::default()), generator.clone(), small_config());
    let document = Document::new("equipment", "Laptops are refreshed every three years.");
    pipeline.ingest(&document).await.unwrap();

    let err = pipeline.answer_with("laptop", 10, 0).await.err().unwrap();
    assert!(matches!(err.root(), RagError::ConfigError(_)));
    assert_eq!(err.stage(), Some(Stage::Rerank));
    assert!(pipeline.query_with("laptop", 10, 0).await.is_err());
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_embedding_leaves_index_untouched() {
    let index = Arc::new(InMemoryVectorIndex::default());
    let pipeline = RagPipeline::builder()
        .config(RagConfig::builder().chunk_size(20).chunk_overlap(5).build().unwrap())
        .embedding_provider(Arc::new(FlakyEmbedder {
            inner: HashingEmbeddingProvider::default(),
            fail_after: 1,
            seen: AtomicUsize::new(0),
        }))
        .index(index.clone())
        .generator(Arc::new(ExtractiveGenerator))
        .build()
        .unwrap();

    let err = pipeline
        .ingest(&Document::new("greek", "Alpha beta gamma. Delta epsilon zeta."))
        .await
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Embed));
    assert!(matches!(err.root(), RagError::EmbeddingError { .. }));
    assert!(index.is_empty().await);
}

#[tokio::test]
async fn mid_stream_failures_are_tagged_generate() {
    let pipeline = pipeline_with(
        Arc::new(InMemoryVectorIndex::default()),
        Arc::new(BrokenStreamGenerator),
        small_config(),
    );
    pipeline.ingest_batch(&handbook()).await.unwrap();

    let mut stream = pipeline.answer("hotel expenses").await.unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), "partial");
    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Generate));
    assert!(matches!(err.root(), RagError::GenerationError { .. }));
}

#[tokio::test]
async fn remove_document_then_reingest_replaces_chunks() {
    let index = Arc::new(InMemoryVectorIndex::default());
    let pipeline = pipeline_with(index.clone(), Arc::new(ExtractiveGenerator), small_config());
    let doc = Document::new("notes", "Standups start at nine.");

    let first = pipeline.ingest(&doc).await.unwrap();
    pipeline.ingest(&doc).await.unwrap();
    assert_eq!(index.len().await, first * 2);

    assert_eq!(pipeline.remove_document("notes").await.unwrap(), first * 2);
    pipeline.ingest(&doc).await.unwrap();
    assert_eq!(index.len().await, first);
}

#[tokio::test]
async fn context_is_bounded_by_config() {
    let config = RagConfig::builder().max_context_chars(40).k_rerank(3).build().unwrap();
    let index = Arc::new(InMemoryVectorIndex::default());
    let pipeline = pipeline_with(index, Arc::new(ExtractiveGenerator), config);
    pipeline.ingest_batch(&handbook()).await.unwrap();

    let prepared = pipeline.query("equipment laptop monitor").await.unwrap();
    assert!(prepared.context.chars().count() <= 40);
    assert!(!prepared.context.is_empty());
}

#[test]
fn builder_requires_collaborators() {
    let err = RagPipeline::builder()
        .index(Arc::new(InMemoryVectorIndex::default()))
        .generator(Arc::new(ExtractiveGenerator))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, RagError::ConfigError(_)));
}
