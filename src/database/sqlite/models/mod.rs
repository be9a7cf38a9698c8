
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::chunker::{QualityTier, SectionType};

/// A persisted chunk row, read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ChunkRecord {
    pub id: i64,
    pub source_path: String,
    pub source_file: String,
    pub chunk_index: i64,
    pub title: Option<String>,
    pub content: String,
    pub clean_content: String,
    pub token_count: i64,
    pub content_hash: String,
    pub category: String,
    pub section_type: SectionType,
    pub semantic_level: i64,
    pub has_code: bool,
    pub has_philosophy: bool,
    pub quality_tier: QualityTier,
    /// JSON array of keyword strings, as stored
    pub keywords: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ChunkRecord {
    /// Deserialize the keywords column; malformed data degrades to empty.
    #[inline]
    pub fn keyword_list(&self) -> Vec<String> {
        serde_json::from_str(&self.keywords).unwrap_or_default()
    }
}

/// A lexical full-text hit with its raw relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub record: ChunkRecord,
    /// Normalized relevance in 0-1, higher is better
    pub score: f32,
}

/// Optional filters shared by both retrieval arms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    pub category: Option<String>,
    pub section_type: Option<String>,
}

/// Outcome of one transactional index write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub chunks_written: usize,
    pub chunks_deleted: usize,
}
