use super::*;
use tempfile::TempDir;

const DIM: usize = 5;

fn test_store_path() -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vectors");
    (temp_dir, path)
}

fn unit_vector(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[axis % DIM] = 1.0;
    v
}

fn record(source_path: &str, chunk_index: u32, axis: usize) -> EmbeddingRecord {
    EmbeddingRecord {
        id: format!("{}#{}", source_path, chunk_index),
        vector: unit_vector(axis),
        content_hash: format!("hash_{}_{}", source_path, chunk_index),
        source_path: source_path.to_string(),
        chunk_index,
        category: "philosophy".to_string(),
        section_type: "section".to_string(),
    }
}

#[tokio::test]
async fn vector_store_initialization() {
    let (_temp_dir, path) = test_store_path();

    let store = VectorStore::new(&path, DIM)
        .await
        .expect("should create vector store");
    let count = store.count_rows().await.expect("should count rows");
    assert_eq!(count, 0);
}

#[tokio::test]
async fn upsert_is_idempotent_per_id() {
    let (_temp_dir, path) = test_store_path();
    let store = VectorStore::new(&path, DIM)
        .await
        .expect("should create vector store");

    let records = vec![record("notes/a.md", 0, 0), record("notes/a.md", 1, 1)];
    store
        .upsert_batch(&records)
        .await
        .expect("should store batch");
    assert_eq!(store.count_rows().await.expect("should count rows"), 2);

    // Same ids again must update in place, not append.
    store
        .upsert_batch(&records)
        .await
        .expect("should re-store batch");
    assert_eq!(store.count_rows().await.expect("should count rows"), 2);
}

#[tokio::test]
async fn rejects_wrong_dimension() {
    let (_temp_dir, path) = test_store_path();
    let store = VectorStore::new(&path, DIM)
        .await
        .expect("should create vector store");

    let mut bad = record("notes/a.md", 0, 0);
    bad.vector = vec![0.1, 0.2];

    let result = store.upsert_batch(&[bad]).await;
    assert!(result.is_err(), "dimension mismatch should be rejected");
}

#[tokio::test]
async fn search_ranks_closest_first_and_applies_floor() {
    let (_temp_dir, path) = test_store_path();
    let store = VectorStore::new(&path, DIM)
        .await
        .expect("should create vector store");

    // Axis 0 matches the query exactly; axis 1 is orthogonal.
    let records = vec![record("notes/a.md", 0, 0), record("notes/a.md", 1, 1)];
    store
        .upsert_batch(&records)
        .await
        .expect("should store batch");

    let query = unit_vector(0);
    let hits = store
        .search_similar(&query, 10, 0.7, &SearchFilters::default())
        .await
        .expect("should search");

    assert_eq!(hits.len(), 1, "orthogonal vector must fall below the floor");
    assert_eq!(hits[0].content_hash, "hash_notes/a.md_0");
    assert!(hits[0].similarity > 0.99);
}

#[tokio::test]
async fn category_filter_excludes_other_categories() {
    let (_temp_dir, path) = test_store_path();
    let store = VectorStore::new(&path, DIM)
        .await
        .expect("should create vector store");

    let mut other = record("notes/b.md", 0, 0);
    other.category = "practice".to_string();
    other.content_hash = "hash_other".to_string();
    store
        .upsert_batch(&[record("notes/a.md", 0, 0), other])
        .await
        .expect("should store batch");

    let filters = SearchFilters {
        category: Some("practice".to_string()),
        section_type: None,
    };
    let hits = store
        .search_similar(&unit_vector(0), 10, 0.0, &filters)
        .await
        .expect("should search");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content_hash, "hash_other");
}

#[tokio::test]
async fn delete_source_and_trim_tail() {
    let (_temp_dir, path) = test_store_path();
    let store = VectorStore::new(&path, DIM)
        .await
        .expect("should create vector store");

    let records = vec![
        record("notes/a.md", 0, 0),
        record("notes/a.md", 1, 1),
        record("notes/a.md", 2, 2),
        record("notes/b.md", 0, 3),
    ];
    store
        .upsert_batch(&records)
        .await
        .expect("should store batch");

    // Document shrank to a single chunk.
    store
        .delete_beyond("notes/a.md", 1)
        .await
        .expect("should trim tail");
    assert_eq!(store.count_rows().await.expect("should count rows"), 2);

    // Document removed from the corpus.
    store
        .delete_source("notes/a.md")
        .await
        .expect("should delete source");
    assert_eq!(store.count_rows().await.expect("should count rows"), 1);
}
