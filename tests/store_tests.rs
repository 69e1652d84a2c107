//! Vector store tests against the in-memory backend.
//!
//! Search must stay inside the requested documents, rank by non-decreasing
//! distance and honor `top_k`; writes are all-or-nothing.

use folio::db::{DistanceMetric, InMemoryVectorStore, StoreSchema, VectorStore};
use folio::types::{AppError, ChunkRow};
use rstest::rstest;
use std::sync::Arc;

fn store(metric: DistanceMetric) -> InMemoryVectorStore {
    InMemoryVectorStore::new(StoreSchema::new(metric, 3))
}

fn row(page_number: u32, content: &str, embedding: [f32; 3]) -> ChunkRow {
    ChunkRow {
        page_number,
        content: content.to_string(),
        embedding: embedding.to_vec(),
    }
}

/// Rows spread along the x axis, one per page.
fn spread(count: u32, offset: f32) -> Vec<ChunkRow> {
    (1..=count)
        .map(|page| row(page, &format!("chunk {}", page), [offset + page as f32, 0.0, 0.0]))
        .collect()
}

fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[tokio::test]
async fn test_search_is_scoped_to_selected_documents() {
    let store = store(DistanceMetric::L2);
    store.insert("A", &spread(6, 0.0)).await.unwrap();
    // B sits closer to the query than any row of A
    store.insert("B", &spread(4, -10.0)).await.unwrap();

    let results = store
        .search(&[0.0, 0.0, 0.0], &names(&["A"]), 3)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|chunk| chunk.document_name == "A"));
    let pages: Vec<u32> = results.iter().map(|chunk| chunk.page_number).collect();
    assert_eq!(pages, vec![1, 2, 3]);
    assert!(results
        .windows(2)
        .all(|pair| pair[0].distance <= pair[1].distance));
}

#[tokio::test]
async fn test_search_across_several_documents() {
    let store = store(DistanceMetric::L2);
    store.insert("A", &spread(3, 0.0)).await.unwrap();
    store.insert("B", &spread(3, 0.5)).await.unwrap();
    store.insert("C", &spread(3, -100.0)).await.unwrap();

    let results = store
        .search(&[0.0, 0.0, 0.0], &names(&["A", "B"]), 4)
        .await
        .unwrap();

    let found: Vec<(String, u32)> = results
        .iter()
        .map(|chunk| (chunk.document_name.clone(), chunk.page_number))
        .collect();
    assert_eq!(
        found,
        vec![
            ("A".to_string(), 1),
            ("B".to_string(), 1),
            ("A".to_string(), 2),
            ("B".to_string(), 2),
        ]
    );
}

#[tokio::test]
async fn test_top_k_larger_than_candidates_returns_all() {
    let store = store(DistanceMetric::L2);
    store.insert("A", &spread(2, 0.0)).await.unwrap();
    store.insert("B", &spread(5, 0.0)).await.unwrap();

    let results = store
        .search(&[0.0, 0.0, 0.0], &names(&["A"]), 50)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn test_unknown_document_yields_empty_result() {
    let store = store(DistanceMetric::L2);
    store.insert("A", &spread(2, 0.0)).await.unwrap();

    let results = store
        .search(&[0.0, 0.0, 0.0], &names(&["missing"]), 5)
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_ties_keep_insertion_order() {
    let store = store(DistanceMetric::L2);
    store
        .insert(
            "A",
            &[
                row(1, "first", [1.0, 0.0, 0.0]),
                row(2, "second", [0.0, 1.0, 0.0]),
                row(3, "third", [0.0, 0.0, 1.0]),
            ],
        )
        .await
        .unwrap();

    let results = store
        .search(&[0.0, 0.0, 0.0], &names(&["A"]), 3)
        .await
        .unwrap();
    let contents: Vec<&str> = results.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_duplicate_rows_are_kept() {
    let store = store(DistanceMetric::L2);
    let rows = spread(2, 0.0);
    store.insert("A", &rows).await.unwrap();
    store.insert("A", &rows).await.unwrap();

    assert_eq!(store.count(Some("A")).await.unwrap(), 4);
    assert_eq!(store.list_documents().await.unwrap(), vec!["A"]);

    let results = store
        .search(&[0.0, 0.0, 0.0], &names(&["A"]), 10)
        .await
        .unwrap();
    assert_eq!(results.len(), 4);
    assert!(results
        .windows(2)
        .all(|pair| pair[0].distance <= pair[1].distance));
    // each row and its duplicate sit side by side
    let pages: Vec<u32> = results.iter().map(|chunk| chunk.page_number).collect();
    assert_eq!(pages, vec![1, 1, 2, 2]);
}

#[tokio::test]
async fn test_non_finite_embeddings_never_reach_the_index() {
    let store = InMemoryVectorStore::new(StoreSchema::new(DistanceMetric::L2, 1));
    let one_d = |page: u32, value: f32| ChunkRow {
        page_number: page,
        content: format!("v{}", value),
        embedding: vec![value],
    };

    let err = store
        .insert(
            "A",
            &[one_d(1, 3.0), one_d(2, f32::NAN), one_d(3, 1.0), one_d(4, 2.0)],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidQuery(_)));
    assert_eq!(store.count(None).await.unwrap(), 0);

    store
        .insert("A", &[one_d(1, 3.0), one_d(3, 1.0), one_d(4, 2.0)])
        .await
        .unwrap();
    let results = store.search(&[0.0], &names(&["A"]), 4).await.unwrap();
    let distances: Vec<f32> = results.iter().map(|chunk| chunk.distance).collect();
    assert_eq!(distances, vec![1.0, 2.0, 3.0]);

    let err = store
        .search(&[f32::NAN], &names(&["A"]), 4)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidQuery(_)));
}

#[tokio::test]
async fn test_duplicate_selection_does_not_duplicate_results() {
    let store = store(DistanceMetric::L2);
    store.insert("A", &spread(2, 0.0)).await.unwrap();

    let results = store
        .search(&[0.0, 0.0, 0.0], &names(&["A", "A"]), 10)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
}

#[rstest]
#[case(DistanceMetric::L2)]
#[case(DistanceMetric::Cosine)]
#[case(DistanceMetric::InnerProduct)]
#[tokio::test]
async fn test_closest_row_ranks_first(#[case] metric: DistanceMetric) {
    let store = store(metric);
    store
        .insert(
            "A",
            &[
                row(1, "away", [-1.0, 0.5, 0.0]),
                row(2, "toward", [1.0, 0.0, 0.0]),
                row(3, "sideways", [0.0, 1.0, 0.0]),
            ],
        )
        .await
        .unwrap();

    let results = store
        .search(&[1.0, 0.0, 0.0], &names(&["A"]), 3)
        .await
        .unwrap();

    assert_eq!(results[0].content, "toward");
    assert_eq!(results[2].content, "away");
}

#[tokio::test]
async fn test_empty_selection_is_invalid() {
    let store = store(DistanceMetric::L2);
    store.insert("A", &spread(2, 0.0)).await.unwrap();

    let err = store.search(&[0.0, 0.0, 0.0], &[], 5).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidQuery(_)));
}

#[tokio::test]
async fn test_wrong_dimensions_are_rejected() {
    let store = store(DistanceMetric::L2);

    let err = store
        .search(&[0.0, 0.0], &names(&["A"]), 5)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidQuery(_)));

    let bad = ChunkRow {
        page_number: 1,
        content: "short vector".into(),
        embedding: vec![1.0],
    };
    let err = store
        .insert("A", &[row(1, "fine", [0.0, 0.0, 0.0]), bad])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidQuery(_)));
    assert_eq!(store.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_replace_and_delete() {
    let store = store(DistanceMetric::L2);
    store.insert("A", &spread(4, 0.0)).await.unwrap();
    store.insert("B", &spread(2, 0.0)).await.unwrap();

    let written = store
        .replace_document("A", &[row(9, "new", [0.0, 0.0, 0.0])])
        .await
        .unwrap();
    assert_eq!(written, 1);

    let results = store
        .search(&[0.0, 0.0, 0.0], &names(&["A"]), 10)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].page_number, 9);

    assert_eq!(store.delete_document("A").await.unwrap(), 1);
    assert_eq!(store.list_documents().await.unwrap(), vec!["B"]);
    assert_eq!(store.count(None).await.unwrap(), 2);
}

#[tokio::test]
async fn test_concurrent_searches_see_whole_writes() {
    let store = Arc::new(store(DistanceMetric::L2));
    let rows = spread(50, 0.0);

    let writer = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.insert("A", &rows).await })
    };

    let mut readers = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        readers.push(tokio::spawn(async move {
            store
                .search(&[0.0, 0.0, 0.0], &["A".to_string()], 100)
                .await
                .map(|results| results.len())
        }));
    }

    writer.await.unwrap().unwrap();
    for reader in readers {
        let seen = reader.await.unwrap().unwrap();
        assert!(seen == 0 || seen == 50, "saw a partial write: {}", seen);
    }
}

#[tokio::test]
async fn test_provider_builds_in_memory_store() {
    let provider = folio::db::VectorStoreProvider::InMemory;
    let schema = StoreSchema::new(DistanceMetric::Cosine, 3);

    let store = provider.create_store(schema).await.unwrap();

    assert_eq!(store.provider_name(), "in-memory");
    assert_eq!(store.schema(), &schema);
    assert!(store.list_documents().await.unwrap().is_empty());
}
