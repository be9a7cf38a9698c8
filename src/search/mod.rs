// Hybrid search module
// Runs the vector and full-text arms concurrently over the same query,
// fuses their scores by content hash, and returns one ranked list.

pub mod cache;
pub mod fusion;


use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::{Config, SearchConfig};
use crate::database::lancedb::{VectorHit, VectorStore};
use crate::database::sqlite::{ChunkRecord, Database, LexicalHit, SearchFilters};
use crate::embeddings::{EmbeddingProvider, OllamaClient};

use cache::SearchCache;
use fusion::fuse;

/// Each retrieval arm over-fetches by this factor so fusion has slack to
/// reorder before the final cut.
const ARM_OVERFETCH: f32 = 1.5;

/// Per-query options layered over the configured defaults
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub limit: usize,
    pub category: Option<String>,
    pub section_type: Option<String>,
    /// Overrides the configured vector arm weight when set
    pub vector_weight: Option<f32>,
    /// Overrides the configured full-text arm weight when set
    pub full_text_weight: Option<f32>,
}

impl Default for SearchOptions {
    #[inline]
    fn default() -> Self {
        Self {
            limit: 10,
            category: None,
            section_type: None,
            vector_weight: None,
            full_text_weight: None,
        }
    }
}

/// One fused result: the chunk row plus its blended relevance
#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    pub record: ChunkRecord,
    pub combined_score: f32,
    pub vector_score: Option<f32>,
    pub text_score: Option<f32>,
}

/// Timing and cardinality counters for one query
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SearchStats {
    pub vector_count: usize,
    pub full_text_count: usize,
    pub unique_results: usize,
    pub query_time_ms: u64,
}

/// Complete output of one hybrid query
#[derive(Debug, Clone, PartialEq)]
pub struct HybridSearchResults {
    pub vector_results: Vec<VectorHit>,
    pub full_text_results: Vec<LexicalHit>,
    pub combined_results: Vec<RankedChunk>,
    pub stats: SearchStats,
}

pub struct HybridSearcher {
    database: Database,
    vector_store: VectorStore,
    provider: Arc<dyn EmbeddingProvider>,
    config: SearchConfig,
    cache: SearchCache,
}

impl HybridSearcher {
    /// Create a searcher wired to the configured Ollama provider.
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

        Ok(Self::with_provider(
            database,
            vector_store,
            provider,
            config.search.clone(),
        ))
    }

    /// Create a searcher over pre-built stores and a custom provider.
    #[inline]
    pub fn with_provider(
        database: Database,
        vector_store: VectorStore,
        provider: Arc<dyn EmbeddingProvider>,
        config: SearchConfig,
    ) -> Self {
        let cache = SearchCache::new(Duration::from_secs(config.cache_ttl_secs));
        Self {
            database,
            vector_store,
            provider,
            config,
            cache,
        }
    }

    /// Run one hybrid query: both arms concurrently, fused by content hash.
    #[inline]
    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<HybridSearchResults> {
        let cache_key = cache_key(query, options);
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(cached);
        }

        let started = Instant::now();
        let vector_weight = options.vector_weight.unwrap_or(self.config.vector_weight);
        let full_text_weight = options
            .full_text_weight
            .unwrap_or(self.config.full_text_weight);

        let filters = SearchFilters {
            category: options.category.clone(),
            section_type: options.section_type.clone(),
        };

        // The query is embedded exactly once and shared by the vector arm.
        let query_embedding = self
            .provider
            .embed(query)
            .context("Failed to generate embedding for query")?;

        let arm_limit = ((options.limit as f32) * ARM_OVERFETCH).ceil() as usize;
        let (vector_results, full_text_results) = tokio::join!(
            self.vector_store.search_similar(
                &query_embedding,
                arm_limit,
                self.config.similarity_floor,
                &filters,
            ),
            self.database.lexical_search(query, arm_limit, &filters),
        );
        let vector_results = vector_results?;
        let full_text_results = full_text_results?;

        debug!(
            "Arms returned {} vector and {} full-text hits",
            vector_results.len(),
            full_text_results.len()
        );

        let vector_scored: Vec<(String, f32)> = vector_results
            .iter()
            .map(|hit| (hit.content_hash.clone(), hit.similarity))
            .collect();
        let text_scored: Vec<(String, f32)> = full_text_results
            .iter()
            .map(|hit| (hit.record.content_hash.clone(), hit.score))
            .collect();

        let fused = fuse(&vector_scored, &text_scored, vector_weight, full_text_weight);
        let unique_results = fused.len();

        let combined_results = self
            .resolve_records(&fused, &full_text_results, options.limit)
            .await?;

        let results = HybridSearchResults {
            vector_results,
            full_text_results,
            combined_results,
            stats: SearchStats {
                vector_count: vector_scored.len(),
                full_text_count: text_scored.len(),
                unique_results,
                query_time_ms: started.elapsed().as_millis() as u64,
            },
        };

        self.cache.put(cache_key, results.clone());
        Ok(results)
    }

    /// Attach chunk rows to the fused ranking. Rows already carried by the
    /// full-text arm are reused; vector-only hits are fetched in one batch.
    async fn resolve_records(
        &self,
        fused: &[(String, fusion::FusedScore)],
        full_text_results: &[LexicalHit],
        limit: usize,
    ) -> Result<Vec<RankedChunk>> {
        let mut records: HashMap<&str, &ChunkRecord> = full_text_results
            .iter()
            .map(|hit| (hit.record.content_hash.as_str(), &hit.record))
            .collect();

        let missing: Vec<String> = fused
            .iter()
            .take(limit)
            .filter(|(hash, _)| !records.contains_key(hash.as_str()))
            .map(|(hash, _)| hash.clone())
            .collect();

        let fetched = self.database.get_by_content_hashes(&missing).await?;
        for record in &fetched {
            records.insert(record.content_hash.as_str(), record);
        }

        let combined = fused
            .iter()
            .take(limit)
            .filter_map(|(hash, score)| {
                records.get(hash.as_str()).map(|record| RankedChunk {
                    record: (*record).clone(),
                    combined_score: score.combined,
                    vector_score: score.vector,
                    text_score: score.text,
                })
            })
            .collect();

        Ok(combined)
    }
}

fn cache_key(query: &str, options: &SearchOptions) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}",
        query,
        options.limit,
        options.category.as_deref().unwrap_or(""),
        options.section_type.as_deref().unwrap_or(""),
        options.vector_weight.map_or(-1.0, |w| w),
        options.full_text_weight.map_or(-1.0, |w| w),
    )
}
