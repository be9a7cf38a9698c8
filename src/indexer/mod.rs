// Indexer module
// Walks a markdown corpus, chunks every document, embeds the chunks, and
// commits the run to both stores. Embeddings are gathered in full before any
// write so a provider failure leaves the previous index untouched.

pub mod consistency;


use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::fs;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::KbError;
use crate::chunker::{Chunk, ChunkerConfig, chunk_document};
use crate::config::Config;
use crate::database::lancedb::{EmbeddingRecord, VectorStore};
use crate::database::sqlite::Database;
use crate::embeddings::{EmbeddingProvider, OllamaClient};

pub use consistency::{ConsistencyReport, validate_consistency};

/// Number of chunks embedded per provider request
const EMBED_BATCH_SIZE: usize = 5;
/// Pause between embedding batches, keeps a local provider responsive
const EMBED_BATCH_DELAY: Duration = Duration::from_millis(200);

/// Drives a full corpus index run: walk, chunk, embed, commit.
pub struct Indexer {
    database: Database,
    vector_store: VectorStore,
    provider: Arc<dyn EmbeddingProvider>,
    chunker_config: ChunkerConfig,
    lock_file_path: PathBuf,
}

/// Statistics about one completed index run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Documents read and chunked
    pub documents: usize,
    /// Documents skipped because they could not be read
    pub skipped: usize,
    /// Chunk rows written or refreshed
    pub chunks_written: usize,
    /// Stale chunk rows removed
    pub chunks_deleted: usize,
}

impl Indexer {
    /// Create an indexer wired to the configured Ollama provider.
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        let database = Database::new(config.database_path())
            .await
            .context("Failed to initialize SQLite database")?;

        let vector_store = VectorStore::new(
            config.vector_database_path(),
            config.ollama.embedding_dimension as usize,
        )
        .await
        .context("Failed to initialize LanceDB vector store")?;

        let provider: Arc<dyn EmbeddingProvider> = Arc::new(
            OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?,
        );

        Ok(Self {
            database,
            vector_store,
            provider,
            chunker_config: config.chunking.clone(),
            lock_file_path: config.lock_file_path(),
        })
    }

    /// Create an indexer over pre-built stores and a custom provider.
    #[inline]
    pub fn with_provider(
        database: Database,
        vector_store: VectorStore,
        provider: Arc<dyn EmbeddingProvider>,
        chunker_config: ChunkerConfig,
        lock_file_path: PathBuf,
    ) -> Self {
        Self {
            database,
            vector_store,
            provider,
            chunker_config,
            lock_file_path,
        }
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    #[inline]
    pub fn vector_store(&self) -> &VectorStore {
        &self.vector_store
    }

    /// Index every markdown document under `corpus_dir`.
    ///
    /// Holds a lock file for the duration of the run so two runs cannot
    /// interleave their writes.
    #[inline]
    pub async fn index_corpus(&self, corpus_dir: &Path) -> Result<IndexStats> {
        self.acquire_lock().await?;

        let result = self.run_index(corpus_dir).await;

        if let Err(e) = fs::remove_file(&self.lock_file_path).await {
            warn!("Failed to remove indexer lock file: {}", e);
        }

        result
    }

    async fn acquire_lock(&self) -> Result<()> {
        if let Some(parent) = self.lock_file_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create lock file directory")?;
        }

        // create_new fails if the file exists, which makes acquisition atomic.
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_file_path)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(KbError::Database(
                format!(
                    "Another index run appears to be active (lock file {} exists); \
                     remove it if the previous run crashed",
                    self.lock_file_path.display()
                ),
            )
            .into()),
            Err(e) => Err(e).context("Failed to create indexer lock file"),
        }
    }

    async fn run_index(&self, corpus_dir: &Path) -> Result<IndexStats> {
        info!("Indexing corpus at {}", corpus_dir.display());

        let documents = collect_markdown_files(corpus_dir)?;
        info!("Found {} markdown documents", documents.len());

        let mut stats = IndexStats::default();
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut seen_paths: HashSet<String> = HashSet::new();

        for (absolute, relative) in &documents {
            let text = match fs::read_to_string(absolute).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Skipping unreadable document {}: {}", relative, e);
                    stats.skipped += 1;
                    continue;
                }
            };

            let document_chunks = chunk_document(&text, relative, &self.chunker_config);
            debug!("{} produced {} chunks", relative, document_chunks.len());

            seen_paths.insert(relative.clone());
            chunks.extend(document_chunks);
            stats.documents += 1;
        }

        let removed_paths: Vec<String> = self
            .database
            .indexed_source_paths()
            .await?
            .into_iter()
            .filter(|path| !seen_paths.contains(path))
            .collect();

        // Identical content may appear in more than one place; only the last
        // occurrence is kept so both stores persist the same set of rows and
        // a hash never surfaces twice in the vector arm.
        let chunks = dedup_by_content_hash(chunks);

        // Every embedding is gathered before the first write; a provider
        // failure here aborts the run with both stores unchanged.
        let embeddings = self.embed_chunks(&chunks).await?;

        let summary = self.database.write_index_run(&chunks, &removed_paths).await?;
        stats.chunks_written = summary.chunks_written;
        stats.chunks_deleted = summary.chunks_deleted;

        self.commit_vectors(&chunks, &embeddings, &removed_paths)
            .await?;

        if let Ok(report) = validate_consistency(&self.database, &self.vector_store).await {
            if !report.is_consistent() {
                warn!(
                    "Store counts diverged after run: {} chunk rows vs {} embeddings",
                    report.chunk_rows, report.embedding_rows
                );
            }
        }

        info!(
            "Index run complete: {} documents, {} chunks written, {} deleted, {} skipped",
            stats.documents, stats.chunks_written, stats.chunks_deleted, stats.skipped
        );
        Ok(stats)
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(chunks.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding chunks")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        let mut batches = chunks.chunks(EMBED_BATCH_SIZE).peekable();

        while let Some(batch) = batches.next() {
            let texts: Vec<String> = batch
                .iter()
                .map(|chunk| chunk.clean_content.clone())
                .collect();

            let batch_embeddings = self
                .provider
                .embed_batch(&texts)
                .context("Embedding provider failed; aborting run before any write")?;
            embeddings.extend(batch_embeddings);
            bar.set_position(embeddings.len() as u64);

            if batches.peek().is_some() {
                sleep(EMBED_BATCH_DELAY).await;
            }
        }

        bar.finish_and_clear();
        Ok(embeddings)
    }

    async fn commit_vectors(
        &self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
        removed_paths: &[String],
    ) -> Result<()> {
        let records: Vec<EmbeddingRecord> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, vector)| EmbeddingRecord {
                id: format!("{}#{}", chunk.source_path, chunk.chunk_index),
                vector: vector.clone(),
                content_hash: chunk.content_hash.clone(),
                source_path: chunk.source_path.clone(),
                chunk_index: chunk.chunk_index as u32,
                category: chunk.metadata.category.clone(),
                section_type: chunk.metadata.section_type.as_str().to_string(),
            })
            .collect();

        self.vector_store.upsert_batch(&records).await?;

        for path in removed_paths {
            self.vector_store.delete_source(path).await?;
        }

        // Trim tail embeddings for documents that shrank.
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for chunk in chunks {
            let count = counts.entry(chunk.source_path.as_str()).or_insert(0);
            *count = (*count).max(chunk.chunk_index + 1);
        }
        for (path, count) in counts {
            self.vector_store.delete_beyond(path, count).await?;
        }

        Ok(())
    }
}

/// Keep only the last occurrence of each content hash, preserving order.
fn dedup_by_content_hash(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut keep_at: HashMap<String, usize> = HashMap::new();
    for (i, chunk) in chunks.iter().enumerate() {
        keep_at.insert(chunk.content_hash.clone(), i);
    }

    let total = chunks.len();
    let deduped: Vec<Chunk> = chunks
        .into_iter()
        .enumerate()
        .filter(|(i, chunk)| keep_at.get(&chunk.content_hash) == Some(i))
        .map(|(_, chunk)| chunk)
        .collect();

    if deduped.len() < total {
        debug!(
            "Dropped {} chunks with duplicated content",
            total - deduped.len()
        );
    }
    deduped
}

/// Collect `(absolute, relative)` paths of markdown files under `corpus_dir`,
/// sorted for deterministic run order. Hidden files and directories are
/// skipped.
fn collect_markdown_files(corpus_dir: &Path) -> Result<Vec<(PathBuf, String)>> {
    let mut documents = Vec::new();

    let walker = walkdir::WalkDir::new(corpus_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry));

    for entry in walker {
        let entry = entry.context("Failed to walk corpus directory")?;
        if !entry.file_type().is_file() {
            continue;
        }

        let is_markdown = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("md") || ext.eq_ignore_ascii_case("markdown"));
        if !is_markdown {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(corpus_dir)
            .context("Walked path escaped the corpus root")?
            .to_string_lossy()
            .replace('\\', "/");

        documents.push((entry.path().to_path_buf(), relative));
    }

    documents.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(documents)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}
