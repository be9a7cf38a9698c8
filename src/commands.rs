use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use crate::cards::{CardOptions, synthesize};
use crate::config::{Config, default_base_dir};
use crate::database::lancedb::VectorStore;
use crate::database::sqlite::Database;
use crate::embeddings::ollama::OllamaClient;
use crate::indexer::{Indexer, validate_consistency};
use crate::search::{HybridSearcher, SearchOptions};

/// Print the active configuration and where it came from.
#[inline]
pub fn show_config() -> Result<()> {
    let base_dir = default_base_dir();
    let config = Config::load(&base_dir)?;

    println!("Configuration directory: {}", base_dir.display());
    println!();
    println!("Ollama:");
    println!("  URL: {}", config.ollama.ollama_url()?);
    println!("  Model: {}", config.ollama.model);
    println!("  Embedding dimension: {}", config.ollama.embedding_dimension);
    println!();
    println!("Chunking:");
    println!("  Chunk size: {} tokens", config.chunking.chunk_size_tokens);
    println!("  Minimum chunk: {} tokens", config.chunking.min_chunk_tokens);
    println!("  Overlap: {} tokens", config.chunking.overlap_tokens);
    println!();
    println!("Search:");
    println!("  Vector weight: {}", config.search.vector_weight);
    println!("  Full-text weight: {}", config.search.full_text_weight);
    println!("  Similarity floor: {}", config.search.similarity_floor);
    println!("  Cache TTL: {}s", config.search.cache_ttl_secs);

    Ok(())
}

/// Write the default configuration file if none exists yet.
#[inline]
pub fn init_config() -> Result<()> {
    let base_dir = default_base_dir();
    let config_path = base_dir.join("config.toml");

    if config_path.exists() {
        println!("Configuration already exists at {}", config_path.display());
        println!("Edit the file directly, or pass --show to inspect it.");
        return Ok(());
    }

    let config = Config::load(&base_dir)?;
    config.save().context("Failed to write default configuration")?;

    println!("Wrote default configuration to {}", config_path.display());
    Ok(())
}

/// Index (or re-index) every markdown document under `corpus_dir`.
#[inline]
pub async fn index_corpus(corpus_dir: PathBuf) -> Result<()> {
    let config = Config::load(default_base_dir())?;

    if !corpus_dir.is_dir() {
        anyhow::bail!("Corpus path is not a directory: {}", corpus_dir.display());
    }

    let client = OllamaClient::new(&config.ollama)?;
    client
        .health_check()
        .context("Ollama is not reachable; start it before indexing")?;

    let indexer = Indexer::new(&config).await?;
    let stats = indexer.index_corpus(&corpus_dir).await?;

    println!("Index run complete!");
    println!("  Documents indexed: {}", stats.documents);
    println!("  Documents skipped: {}", stats.skipped);
    println!("  Chunks written: {}", stats.chunks_written);
    println!("  Stale chunks removed: {}", stats.chunks_deleted);

    Ok(())
}

/// Run a hybrid query and print the ranked results.
#[inline]
pub async fn search(
    query: String,
    limit: usize,
    category: Option<String>,
    section_type: Option<String>,
) -> Result<()> {
    let config = Config::load(default_base_dir())?;
    let searcher = HybridSearcher::new(&config).await?;

    let options = SearchOptions {
        limit,
        category,
        section_type,
        ..SearchOptions::default()
    };
    let results = searcher.search(&query, &options).await?;

    if results.combined_results.is_empty() {
        println!("No results for '{}'.", query);
        return Ok(());
    }

    println!(
        "Found {} results ({} vector, {} full-text, {}ms):",
        results.combined_results.len(),
        results.stats.vector_count,
        results.stats.full_text_count,
        results.stats.query_time_ms
    );
    println!();

    for (rank, chunk) in results.combined_results.iter().enumerate() {
        let record = &chunk.record;
        println!(
            "{}. {} [{}]",
            rank + 1,
            record.title.as_deref().unwrap_or(&record.source_file),
            record.category
        );
        println!("   Source: {} (chunk {})", record.source_path, record.chunk_index);
        println!(
            "   Score: {:.3} (vector: {}, text: {})",
            chunk.combined_score,
            chunk
                .vector_score
                .map_or_else(|| "-".to_string(), |s| format!("{:.3}", s)),
            chunk
                .text_score
                .map_or_else(|| "-".to_string(), |s| format!("{:.3}", s)),
        );

        let preview: String = record.clean_content.chars().take(160).collect();
        println!("   {}", preview.trim());
        println!();
    }

    Ok(())
}

/// Search and synthesize display cards, printed as JSON.
#[inline]
pub async fn cards(
    query: String,
    max_cards: usize,
    include_code_examples: bool,
    group_by_category: bool,
) -> Result<()> {
    let config = Config::load(default_base_dir())?;
    let searcher = HybridSearcher::new(&config).await?;

    // Over-fetch so category balancing has material to choose from.
    let options = SearchOptions {
        limit: max_cards * 3,
        ..SearchOptions::default()
    };
    let results = searcher.search(&query, &options).await?;

    let card_options = CardOptions {
        max_cards,
        include_code_examples,
        group_by_category,
    };
    let cards = synthesize(&results.combined_results, &card_options);

    if cards.is_empty() {
        println!("No cards could be synthesized for '{}'.", query);
        return Ok(());
    }

    info!("Synthesized {} cards", cards.len());
    let json = serde_json::to_string_pretty(&cards).context("Failed to serialize cards")?;
    println!("{}", json);

    Ok(())
}

/// Show index size and cross-store consistency.
#[inline]
pub async fn show_status() -> Result<()> {
    let config = Config::load(default_base_dir())?;

    let database = Database::new(config.database_path())
        .await
        .context("Failed to open SQLite database")?;
    let vector_store = VectorStore::new(
        config.vector_database_path(),
        config.ollama.embedding_dimension as usize,
    )
    .await
    .context("Failed to open vector store")?;

    let documents = database.indexed_source_paths().await?;
    let report = validate_consistency(&database, &vector_store).await?;

    println!("Knowledge base status:");
    println!("  Documents indexed: {}", documents.len());
    println!("  Chunk rows: {}", report.chunk_rows);
    println!("  Embeddings: {}", report.embedding_rows);
    if report.is_consistent() {
        println!("  Stores: consistent");
    } else {
        println!("  Stores: INCONSISTENT - re-run indexing to repair");
    }
    println!();
    println!("  Database: {}", config.database_path().display());
    println!("  Vectors:  {}", config.vector_database_path().display());

    match OllamaClient::new(&config.ollama).and_then(|client| client.health_check()) {
        Ok(()) => println!("  Ollama: reachable"),
        Err(e) => println!("  Ollama: unreachable ({})", e),
    }

    Ok(())
}
