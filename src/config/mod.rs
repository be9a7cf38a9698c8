
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::chunker::ChunkerConfig;
use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub chunking: ChunkerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub embedding_dimension: u32,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

/// Weights and floors for hybrid retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    /// Weight applied to similarity-search scores during fusion
    pub vector_weight: f32,
    /// Weight applied to full-text relevance scores during fusion
    pub full_text_weight: f32,
    /// Minimum similarity (0-1) for a vector hit to be considered
    pub similarity_floor: f32,
    /// TTL in seconds for cached search results
    pub cache_ttl_secs: u64,
}

impl Default for SearchConfig {
    #[inline]
    fn default() -> Self {
        Self {
            vector_weight: 0.7,
            full_text_weight: 0.3,
            similarity_floor: 0.7,
            cache_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid chunk size: {0} (must be between 100 and 4096)")]
    InvalidChunkSize(usize),
    #[error("Invalid minimum chunk size: {0} (must be between 1 and 1024)")]
    InvalidMinChunkSize(usize),
    #[error("Invalid overlap size: {0} (must be between 0 and 512)")]
    InvalidOverlapSize(usize),
    #[error("Chunk size ({0}) must be greater than minimum chunk size ({1})")]
    ChunkSizeTooSmall(usize, usize),
    #[error("Invalid search weight {0} (must be between 0.0 and 1.0)")]
    InvalidSearchWeight(f32),
    #[error("Invalid similarity floor {0} (must be between 0.0 and 1.0)")]
    InvalidSimilarityFloor(f32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Load config from `<config_dir>/config.toml`, falling back to defaults
    /// if the file does not exist yet.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                ollama: OllamaConfig::default(),
                chunking: ChunkerConfig::default(),
                search: SearchConfig::default(),
                base_dir: config_dir.as_ref().to_path_buf(),
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.base_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.validate_chunking()?;
        self.validate_search()?;
        Ok(())
    }

    fn validate_chunking(&self) -> Result<(), ConfigError> {
        let chunking = &self.chunking;

        if !(100..=4096).contains(&chunking.chunk_size_tokens) {
            return Err(ConfigError::InvalidChunkSize(chunking.chunk_size_tokens));
        }
        if !(1..=1024).contains(&chunking.min_chunk_tokens) {
            return Err(ConfigError::InvalidMinChunkSize(chunking.min_chunk_tokens));
        }
        if chunking.overlap_tokens > 512 {
            return Err(ConfigError::InvalidOverlapSize(chunking.overlap_tokens));
        }
        if chunking.chunk_size_tokens <= chunking.min_chunk_tokens {
            return Err(ConfigError::ChunkSizeTooSmall(
                chunking.chunk_size_tokens,
                chunking.min_chunk_tokens,
            ));
        }

        Ok(())
    }

    fn validate_search(&self) -> Result<(), ConfigError> {
        let search = &self.search;

        for weight in [search.vector_weight, search.full_text_weight] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(ConfigError::InvalidSearchWeight(weight));
            }
        }
        if !(0.0..=1.0).contains(&search.similarity_floor) {
            return Err(ConfigError::InvalidSimilarityFloor(search.similarity_floor));
        }

        Ok(())
    }

    /// Get the path for the SQLite database
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.base_dir.join("metadata.db")
    }

    /// Get the path for the vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.base_dir.join("vectors")
    }

    /// Get the path of the index run lock file
    #[inline]
    pub fn lock_file_path(&self) -> PathBuf {
        self.base_dir.join(".indexer.lock")
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}

/// Default base directory for config and databases.
#[inline]
pub fn default_base_dir() -> PathBuf {
    dirs::data_local_dir()
        .map_or_else(|| PathBuf::from(".kb-carousel"), |d| d.join("kb-carousel"))
}
