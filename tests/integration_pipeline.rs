// End-to-end pipeline tests: walk a markdown corpus, index it into both
// stores, run hybrid queries against it, and synthesize carousel cards.

use std::fmt::Write as _;
use std::hash::Hasher;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use twox_hash::XxHash64;

use kb_carousel::cards::{CardOptions, synthesize};
use kb_carousel::chunker::ChunkerConfig;
use kb_carousel::config::SearchConfig;
use kb_carousel::database::lancedb::VectorStore;
use kb_carousel::database::sqlite::Database;
use kb_carousel::embeddings::EmbeddingProvider;
use kb_carousel::indexer::{Indexer, validate_consistency};
use kb_carousel::search::{HybridSearcher, SearchOptions};

const DIM: usize = 16;

/// Deterministic bag-of-words embedder: each word hashes to a dimension,
/// so documents sharing vocabulary get high cosine similarity.
struct FakeEmbedder;

impl EmbeddingProvider for FakeEmbedder {
    fn dimension(&self) -> usize {
        DIM
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0_f32; DIM];
                for word in text.split_whitespace() {
                    let mut hasher = XxHash64::with_seed(0);
                    hasher.write(word.to_lowercase().as_bytes());
                    vector[(hasher.finish() % DIM as u64) as usize] += 1.0;
                }
                let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for v in &mut vector {
                        *v /= norm;
                    }
                } else {
                    vector[0] = 1.0;
                }
                vector
            })
            .collect())
    }
}

/// Roughly 25 estimated tokens per generated sentence.
fn themed_sentences(count: usize, theme: &str) -> String {
    let mut text = String::new();
    for i in 0..count {
        let _ = write!(
            text,
            "Sentence number {i} explores {theme} with steady attention and care. "
        );
        if i % 6 == 5 {
            text.push_str("\n\n");
        }
    }
    text
}

/// Three sections sized against the default chunking budgets: the intro is
/// too small to keep, the discipline section splits in two, the practice
/// section fits in one chunk.
fn stoicism_document() -> String {
    format!(
        "# Стоицизм\n\n{}\n## Дисциплина\n\n{}\n## Практика\n\n{}",
        themed_sentences(3, "stoic discipline and deliberate daily practice"),
        themed_sentences(46, "stoic discipline and deliberate daily practice"),
        themed_sentences(16, "morning practice rituals and steady habits"),
    )
}

fn cooking_document() -> String {
    format!(
        "# Кулинария\n\n{}",
        themed_sentences(16, "simple cooking with fresh pasta and warm spice"),
    )
}

fn write_doc(dir: &Path, relative: &str, content: &str) {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("should create parent dirs");
    }
    std::fs::write(path, content).expect("should write fixture");
}

async fn open_database(store_dir: &Path) -> Database {
    Database::new(store_dir.join("metadata.db"))
        .await
        .expect("should open database")
}

async fn open_vector_store(store_dir: &Path) -> VectorStore {
    VectorStore::new(store_dir.join("vectors"), DIM)
        .await
        .expect("should open vector store")
}

async fn build_indexer(store_dir: &Path) -> Indexer {
    Indexer::with_provider(
        open_database(store_dir).await,
        open_vector_store(store_dir).await,
        Arc::new(FakeEmbedder),
        ChunkerConfig::default(),
        store_dir.join(".indexer.lock"),
    )
}

async fn build_searcher(store_dir: &Path) -> HybridSearcher {
    // The bag-of-words embedder produces lower similarities than a real
    // model, so the floor is relaxed for these tests.
    HybridSearcher::with_provider(
        open_database(store_dir).await,
        open_vector_store(store_dir).await,
        Arc::new(FakeEmbedder),
        SearchConfig {
            similarity_floor: 0.2,
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn full_pipeline_from_corpus_to_cards() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let corpus = temp_dir.path().join("corpus");
    let store = temp_dir.path().join("store");
    std::fs::create_dir_all(&store).expect("should create store dir");

    write_doc(&corpus, "philosophy/stoicism.md", &stoicism_document());
    write_doc(&corpus, "cooking/pasta.md", &cooking_document());

    let indexer = build_indexer(&store).await;
    let stats = indexer
        .index_corpus(&corpus)
        .await
        .expect("index run should succeed");

    // The sub-minimum intro section drops; the large section splits in two.
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.chunks_written, 4);

    let chunk_rows = indexer
        .database()
        .count_chunks()
        .await
        .expect("should count chunks");
    assert_eq!(chunk_rows, 4);

    let report = validate_consistency(indexer.database(), indexer.vector_store())
        .await
        .expect("consistency check should succeed");
    assert!(report.is_consistent());
    assert_eq!(report.embedding_rows, 4);

    // A second run over the unchanged corpus leaves both stores as they were.
    let rerun = indexer
        .index_corpus(&corpus)
        .await
        .expect("re-index should succeed");
    assert_eq!(rerun.chunks_written, 4);
    assert_eq!(rerun.chunks_deleted, 0);
    assert_eq!(
        indexer
            .vector_store()
            .count_rows()
            .await
            .expect("should count rows"),
        4
    );

    let searcher = build_searcher(&store).await;
    let results = searcher
        .search(
            "stoic discipline and deliberate daily practice",
            &SearchOptions::default(),
        )
        .await
        .expect("search should succeed");

    assert!(!results.combined_results.is_empty());
    assert_eq!(results.stats.unique_results, results.combined_results.len());

    // Both discipline chunks outrank everything from the cooking document.
    let top_two: Vec<&str> = results.combined_results[..2]
        .iter()
        .map(|r| r.record.source_path.as_str())
        .collect();
    assert_eq!(top_two, ["philosophy/stoicism.md", "philosophy/stoicism.md"]);

    let top = &results.combined_results[0];
    assert!(top.vector_score.is_some());
    assert!(top.text_score.is_some());
    assert!(top.combined_score > 0.0);

    let cards = synthesize(
        &results.combined_results,
        &CardOptions {
            max_cards: 2,
            ..Default::default()
        },
    );

    assert_eq!(cards.len(), 2);
    for card in &cards {
        assert!(card.id.starts_with("card-"));
        assert!(!card.title.is_empty());
        assert!(!card.content.is_empty());
        assert!(card.content.chars().count() <= 300);
        assert!(card.summary.chars().count() <= 150);
    }
}

#[tokio::test]
async fn category_filter_restricts_results_to_matching_documents() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let corpus = temp_dir.path().join("corpus");
    let store = temp_dir.path().join("store");
    std::fs::create_dir_all(&store).expect("should create store dir");

    write_doc(&corpus, "philosophy/stoicism.md", &stoicism_document());
    write_doc(&corpus, "cooking/pasta.md", &cooking_document());

    build_indexer(&store)
        .await
        .index_corpus(&corpus)
        .await
        .expect("index run should succeed");

    let searcher = build_searcher(&store).await;
    let options = SearchOptions {
        category: Some("general".to_string()),
        ..Default::default()
    };
    let results = searcher
        .search("steady attention and care", &options)
        .await
        .expect("search should succeed");

    assert!(!results.combined_results.is_empty());
    assert!(
        results
            .combined_results
            .iter()
            .all(|r| r.record.source_path == "cooking/pasta.md")
    );
}

#[tokio::test]
async fn removing_a_document_reaps_both_stores() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let corpus = temp_dir.path().join("corpus");
    let store = temp_dir.path().join("store");
    std::fs::create_dir_all(&store).expect("should create store dir");

    write_doc(&corpus, "philosophy/stoicism.md", &stoicism_document());
    write_doc(&corpus, "cooking/pasta.md", &cooking_document());

    let indexer = build_indexer(&store).await;
    indexer
        .index_corpus(&corpus)
        .await
        .expect("index run should succeed");

    std::fs::remove_file(corpus.join("cooking/pasta.md")).expect("should remove fixture");

    let stats = indexer
        .index_corpus(&corpus)
        .await
        .expect("re-index should succeed");
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks_deleted, 1);

    assert_eq!(
        indexer
            .database()
            .count_chunks()
            .await
            .expect("should count chunks"),
        3
    );

    let report = validate_consistency(indexer.database(), indexer.vector_store())
        .await
        .expect("consistency check should succeed");
    assert!(report.is_consistent());
    assert_eq!(report.chunk_rows, 3);
}
