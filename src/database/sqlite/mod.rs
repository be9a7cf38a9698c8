
pub mod models;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::chunker::Chunk;

pub use models::{ChunkRecord, LexicalHit, SearchFilters, WriteSummary};

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Persist one index run's chunks in a single transaction.
    ///
    /// Rows are upserted keyed on `(source_path, chunk_index)`; rows for
    /// removed documents and stale tail rows beyond each document's new
    /// chunk count are deleted in the same transaction. Any failure rolls
    /// the whole run back, leaving the prior index intact.
    #[inline]
    pub async fn write_index_run(
        &self,
        chunks: &[Chunk],
        removed_paths: &[String],
    ) -> Result<WriteSummary> {
        let mut summary = WriteSummary::default();
        let now = Utc::now().naive_utc();

        let mut chunk_counts: HashMap<&str, i64> = HashMap::new();
        for chunk in chunks {
            let count = chunk_counts.entry(chunk.source_path.as_str()).or_insert(0);
            *count = (*count).max(chunk.chunk_index as i64 + 1);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin index transaction")?;

        for path in removed_paths {
            let result = sqlx::query("DELETE FROM chunks WHERE source_path = ?")
                .bind(path)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to delete chunks for removed {path}"))?;
            summary.chunks_deleted += result.rows_affected() as usize;
        }

        for (path, count) in &chunk_counts {
            let result =
                sqlx::query("DELETE FROM chunks WHERE source_path = ? AND chunk_index >= ?")
                    .bind(path)
                    .bind(count)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("Failed to trim stale chunks for {path}"))?;
            summary.chunks_deleted += result.rows_affected() as usize;
        }

        for chunk in chunks {
            // Identical content never duplicates: a re-submitted hash at a
            // different position replaces the old row.
            sqlx::query(
                "DELETE FROM chunks WHERE content_hash = ? \
                 AND NOT (source_path = ? AND chunk_index = ?)",
            )
            .bind(&chunk.content_hash)
            .bind(&chunk.source_path)
            .bind(chunk.chunk_index as i64)
            .execute(&mut *tx)
            .await
            .with_context(|| {
                format!(
                    "Failed to clear duplicate content for {}#{}",
                    chunk.source_path, chunk.chunk_index
                )
            })?;

            let keywords = serde_json::to_string(&chunk.metadata.keywords)
                .context("Failed to serialize keywords")?;

            sqlx::query(
                r#"
                INSERT INTO chunks (
                    source_path, source_file, chunk_index, title, content,
                    clean_content, token_count, content_hash, category,
                    section_type, semantic_level, has_code, has_philosophy,
                    quality_tier, keywords, created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (source_path, chunk_index) DO UPDATE SET
                    source_file = excluded.source_file,
                    title = excluded.title,
                    content = excluded.content,
                    clean_content = excluded.clean_content,
                    token_count = excluded.token_count,
                    content_hash = excluded.content_hash,
                    category = excluded.category,
                    section_type = excluded.section_type,
                    semantic_level = excluded.semantic_level,
                    has_code = excluded.has_code,
                    has_philosophy = excluded.has_philosophy,
                    quality_tier = excluded.quality_tier,
                    keywords = excluded.keywords,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&chunk.source_path)
            .bind(&chunk.source_file)
            .bind(chunk.chunk_index as i64)
            .bind(&chunk.title)
            .bind(&chunk.content)
            .bind(&chunk.clean_content)
            .bind(chunk.token_count as i64)
            .bind(&chunk.content_hash)
            .bind(&chunk.metadata.category)
            .bind(chunk.metadata.section_type)
            .bind(i64::from(chunk.metadata.semantic_level))
            .bind(chunk.metadata.has_code)
            .bind(chunk.metadata.has_philosophy)
            .bind(chunk.metadata.quality_tier)
            .bind(&keywords)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| {
                format!(
                    "Failed to upsert chunk {}#{}",
                    chunk.source_path, chunk.chunk_index
                )
            })?;

            summary.chunks_written += 1;
        }

        tx.commit()
            .await
            .context("Failed to commit index transaction")?;

        info!(
            "Index run wrote {} chunks, deleted {}",
            summary.chunks_written, summary.chunks_deleted
        );
        Ok(summary)
    }

    /// Language-aware full-text search over chunk content and titles.
    ///
    /// Scores are bm25-derived and squashed to 0-1, higher is better. An
    /// unparseable or empty query yields no hits rather than an error.
    #[inline]
    pub async fn lexical_search(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<LexicalHit>> {
        let Some(match_expr) = build_match_expression(query) else {
            return Ok(Vec::new());
        };

        let mut sql = String::from(
            "SELECT c.id AS id, bm25(chunks_fts) AS score \
             FROM chunks_fts \
             JOIN chunks c ON c.id = chunks_fts.rowid \
             WHERE chunks_fts MATCH ?",
        );
        if filters.category.is_some() {
            sql.push_str(" AND c.category = ?");
        }
        if filters.section_type.is_some() {
            sql.push_str(" AND c.section_type = ?");
        }
        sql.push_str(" ORDER BY score LIMIT ?");

        let mut query_builder = sqlx::query(&sql).bind(&match_expr);
        if let Some(category) = &filters.category {
            query_builder = query_builder.bind(category);
        }
        if let Some(section_type) = &filters.section_type {
            query_builder = query_builder.bind(section_type);
        }
        query_builder = query_builder.bind(limit as i64);

        let rows = query_builder
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Full-text search failed for query: {query}"))?;

        let mut scored: Vec<(i64, f32)> = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.try_get("id").context("Missing id in search row")?;
            let bm25: f64 = row.try_get("score").context("Missing score in search row")?;
            // bm25 is negative for better matches; negate and squash to 0-1.
            let raw = (-bm25).max(0.0) as f32;
            scored.push((id, raw / (raw + 1.0)));
        }

        let ids: Vec<i64> = scored.iter().map(|(id, _)| *id).collect();
        let records = self.get_by_ids(&ids).await?;
        let by_id: HashMap<i64, ChunkRecord> =
            records.into_iter().map(|r| (r.id, r)).collect();

        let hits = scored
            .into_iter()
            .filter_map(|(id, score)| {
                by_id.get(&id).map(|record| LexicalHit {
                    record: record.clone(),
                    score,
                })
            })
            .collect();

        Ok(hits)
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<ChunkRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT * FROM chunks WHERE id IN ({placeholders})");

        let mut query = sqlx::query_as::<_, ChunkRecord>(&sql);
        for id in ids {
            query = query.bind(id);
        }

        query
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch chunks by id")
    }

    /// Fetch chunk rows by their content hashes, in no particular order.
    #[inline]
    pub async fn get_by_content_hashes(&self, hashes: &[String]) -> Result<Vec<ChunkRecord>> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; hashes.len()].join(", ");
        let sql = format!("SELECT * FROM chunks WHERE content_hash IN ({placeholders})");

        let mut query = sqlx::query_as::<_, ChunkRecord>(&sql);
        for hash in hashes {
            query = query.bind(hash);
        }

        query
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch chunks by content hash")
    }

    /// All chunk rows for one document, in source order.
    #[inline]
    pub async fn chunks_for_source(&self, source_path: &str) -> Result<Vec<ChunkRecord>> {
        sqlx::query_as::<_, ChunkRecord>(
            "SELECT * FROM chunks WHERE source_path = ? ORDER BY chunk_index",
        )
        .bind(source_path)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch chunks for {source_path}"))
    }

    /// Distinct document paths currently present in the index.
    #[inline]
    pub async fn indexed_source_paths(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT source_path FROM chunks ORDER BY source_path")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list indexed source paths")?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("source_path").map_err(Into::into))
            .collect()
    }

    #[inline]
    pub async fn count_chunks(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count chunks")
    }
}

/// Build an FTS5 MATCH expression from free text: each token quoted, joined
/// with OR for recall. Returns `None` when no searchable token remains.
fn build_match_expression(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split_whitespace()
        .map(|token| {
            token
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|token| !token.is_empty())
        .map(|token| format!("\"{token}\""))
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}
