//! Tests for the in-memory vector index: ordering, bounds, dimensions, persistence.

use std::collections::HashMap;

use docrag::document::Chunk;
use docrag::inmemory::InMemoryVectorIndex;
use docrag::vectorstore::{DistanceMetric, VectorIndex};
use docrag::RagError;
use proptest::prelude::*;

fn chunk(id: &str, document_id: &str, embedding: Vec<f32>) -> Chunk {
    Chunk {
        id: id.to_string(),
        text: format!("text of {id}"),
        embedding,
        metadata: HashMap::new(),
        document_id: document_id.to_string(),
        sequence_index: 0,
    }
}

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

fn arb_metric() -> impl Strategy<Value = DistanceMetric> {
    prop_oneof![Just(DistanceMetric::Cosine), Just(DistanceMetric::SquaredEuclidean)]
}

/// Search returns at most `k` results, never more than stored, ascending by distance.
mod prop_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ascending_and_bounded_by_k(
            embeddings in proptest::collection::vec(arb_normalized_embedding(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            metric in arb_metric(),
            k in 0usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let count = embeddings.len();
            let results = rt.block_on(async {
                let index = InMemoryVectorIndex::new(metric);
                let chunks = embeddings
                    .into_iter()
                    .enumerate()
                    .map(|(i, e)| chunk(&format!("c{i}"), "doc_1", e))
                    .collect();
                index.add(chunks).await.unwrap();
                index.search(&query, k).await.unwrap()
            });

            prop_assert_eq!(results.len(), k.min(count));
            for window in results.windows(2) {
                prop_assert!(
                    window[0].distance <= window[1].distance,
                    "results not ascending: {} > {}",
                    window[0].distance,
                    window[1].distance,
                );
            }
        }

        #[test]
        fn self_query_on_single_entry_has_zero_distance(
            embedding in arb_normalized_embedding(DIM),
            metric in arb_metric(),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let index = InMemoryVectorIndex::new(metric);
                index.add(vec![chunk("only", "doc", embedding.clone())]).await.unwrap();
                index.search(&embedding, 1).await.unwrap()
            });

            prop_assert_eq!(results.len(), 1);
            prop_assert_eq!(&results[0].chunk.id, "only");
            prop_assert!(results[0].distance.abs() < 1e-5);
        }
    }
}

#[tokio::test]
async fn empty_index_search_fails() {
    let index = InMemoryVectorIndex::new(DistanceMetric::Cosine);
    let err = index.search(&[1.0, 0.0], 3).await.unwrap_err();
    assert!(matches!(err, RagError::EmptyIndex));
}

#[tokio::test]
async fn k_larger_than_index_returns_everything() {
    let index = InMemoryVectorIndex::new(DistanceMetric::SquaredEuclidean);
    index.add(vec![chunk("a", "doc", vec![1.0, 2.0])]).await.unwrap();
    let results = index.search(&[0.0, 0.0], 5).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].distance, 5.0);
}

#[tokio::test]
async fn first_insertion_fixes_dimension() {
    let index = InMemoryVectorIndex::new(DistanceMetric::Cosine);
    assert_eq!(index.dimension().await, None);
    index.add(vec![chunk("a", "doc", vec![1.0, 0.0, 0.0])]).await.unwrap();
    assert_eq!(index.dimension().await, Some(3));

    let err = index.add(vec![chunk("b", "doc", vec![1.0, 0.0])]).await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 2 }));

    let err = index.search(&[1.0], 1).await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 1 }));
}

#[tokio::test]
async fn unembedded_chunks_do_not_fix_dimension() {
    let index = InMemoryVectorIndex::new(DistanceMetric::Cosine);
    let err = index.add(vec![chunk("raw", "doc", Vec::new())]).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingError { .. }));
    assert_eq!(index.dimension().await, None);
    assert!(index.is_empty().await);

    index.add(vec![chunk("a", "doc", vec![1.0, 0.0])]).await.unwrap();
    assert_eq!(index.dimension().await, Some(2));
    assert!(matches!(index.search(&[], 1).await, Err(RagError::EmbeddingError { .. })));
}

#[tokio::test]
async fn mismatched_batch_adds_nothing() {
    let index = InMemoryVectorIndex::with_dimension(DistanceMetric::Cosine, 2);
    let batch = vec![chunk("a", "doc", vec![1.0, 0.0]), chunk("b", "doc", vec![1.0, 0.0, 0.0])];
    assert!(index.add(batch).await.is_err());
    assert_eq!(index.len().await, 0);
    assert!(index.is_empty().await);
}

#[tokio::test]
async fn equal_distances_keep_insertion_order() {
    let index = InMemoryVectorIndex::new(DistanceMetric::Cosine);
    index
        .add(vec![
            chunk("first", "doc", vec![1.0, 0.0]),
            chunk("second", "doc", vec![2.0, 0.0]),
            chunk("third", "doc", vec![0.0, 1.0]),
        ])
        .await
        .unwrap();
    let ids: Vec<String> =
        index.search(&[1.0, 0.0], 3).await.unwrap().into_iter().map(|r| r.chunk.id).collect();
    assert_eq!(ids, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn reingesting_appends_and_remove_document_clears() {
    let index = InMemoryVectorIndex::new(DistanceMetric::Cosine);
    index.add(vec![chunk("doc_0", "doc", vec![1.0, 0.0])]).await.unwrap();
    index.add(vec![chunk("doc_0", "doc", vec![1.0, 0.0])]).await.unwrap();
    index.add(vec![chunk("other_0", "other", vec![0.0, 1.0])]).await.unwrap();
    assert_eq!(index.len().await, 3);

    assert_eq!(index.remove_document("doc").await.unwrap(), 2);
    assert_eq!(index.len().await, 1);
    assert_eq!(index.remove_document("missing").await.unwrap(), 0);
}

#[tokio::test]
async fn snapshot_round_trip_preserves_search() {
    let dir = tempfile::tempdir().unwrap();
    let index = InMemoryVectorIndex::new(DistanceMetric::SquaredEuclidean);
    index
        .add(vec![chunk("a", "doc", vec![0.0, 1.0]), chunk("b", "doc", vec![1.0, 1.0])])
        .await
        .unwrap();
    index.save(dir.path()).await.unwrap();

    let loaded = InMemoryVectorIndex::load(dir.path()).await.unwrap();
    assert_eq!(loaded.metric(), DistanceMetric::SquaredEuclidean);
    assert_eq!(loaded.dimension().await, Some(2));

    let before = index.search(&[1.0, 1.0], 2).await.unwrap();
    let after = loaded.search(&[1.0, 1.0], 2).await.unwrap();
    fn ids(results: &[docrag::SearchResult]) -> Vec<String> {
        results.iter().map(|r| r.chunk.id.clone()).collect()
    }
    assert_eq!(ids(&before), ids(&after));
    assert_eq!(ids(&after), vec!["b", "a"]);
}

#[tokio::test]
async fn open_or_create_starts_empty_without_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let index =
        InMemoryVectorIndex::open_or_create(dir.path().join("fresh"), DistanceMetric::Cosine)
            .await
            .unwrap();
    assert!(index.is_empty().await);
}

#[tokio::test]
async fn corrupt_snapshot_is_a_persistence_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(docrag::inmemory::SNAPSHOT_FILE), "{not json").unwrap();
    let err = InMemoryVectorIndex::load(dir.path()).await.unwrap_err();
    assert!(matches!(err, RagError::PersistenceError(_)));
}

fn snapshot_entry(id: u64, embedding: &str) -> String {
    format!(
        r#"{{"id":{id},"chunk":{{"id":"c{id}","text":"t","embedding":{embedding},"#
    ) + r#""document_id":"d","sequence_index":0}}"#
}

fn write_snapshot(dir: &std::path::Path, dimension: &str, next_id: u64, entries: &[String]) {
    let json = format!(
        r#"{{"version":1,"metric":"cosine","dimension":{dimension},"next_id":{next_id},"#
    ) + &format!(r#""entries":[{}]}}"#, entries.join(","));
    std::fs::write(dir.join(docrag::inmemory::SNAPSHOT_FILE), json).unwrap();
}

#[tokio::test]
async fn inconsistent_snapshots_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let cases = [
        // entries without a dimension
        ("null", 1, vec![snapshot_entry(0, "[1.0]")]),
        ("0", 0, vec![]),
        // mixed lengths
        ("2", 2, vec![snapshot_entry(0, "[1.0,0.0]"), snapshot_entry(1, "[1.0]")]),
        ("1", 1, vec![snapshot_entry(0, "[]")]),
        // ids must ascend and stay below next_id
        ("1", 2, vec![snapshot_entry(1, "[1.0]"), snapshot_entry(0, "[0.5]")]),
        ("1", 3, vec![snapshot_entry(3, "[1.0]")]),
    ];
    for (dimension, next_id, entries) in cases {
        write_snapshot(dir.path(), dimension, next_id, &entries);
        let err = InMemoryVectorIndex::load(dir.path()).await.unwrap_err();
        assert!(
            matches!(err, RagError::PersistenceError(_)),
            "dimension {dimension}, next_id {next_id}: {err}"
        );
    }
}

#[tokio::test]
async fn consistent_snapshot_loads() {
    let dir = tempfile::tempdir().unwrap();
    write_snapshot(dir.path(), "1", 5, &[snapshot_entry(1, "[1.0]"), snapshot_entry(4, "[0.5]")]);
    let index = InMemoryVectorIndex::load(dir.path()).await.unwrap();
    assert_eq!(index.len().await, 2);
    assert_eq!(index.dimension().await, Some(1));

    write_snapshot(dir.path(), "null", 0, &[]);
    assert!(InMemoryVectorIndex::load(dir.path()).await.unwrap().is_empty().await);
}
