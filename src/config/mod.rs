//! Configuration management
//!
//! One TOML file configures the whole pipeline and both harnesses. The
//! configuration round-trips losslessly through serialization, and every
//! load is validated before use.

use crate::chunking::{ChunkOptions, ChunkStrategy};
use crate::embedding::EmbeddingConfig;
use crate::error::{RagError, Result};
use crate::generation::LlmConfig;
use crate::index::IndexConfig;
use crate::retrieval::RerankWeights;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RagConfig {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub strategy: ChunkStrategy,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Smart,
            chunk_size: 300,
            chunk_overlap: 50,
        }
    }
}

impl ChunkingConfig {
    pub fn options(&self) -> ChunkOptions {
        ChunkOptions {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

/// Search and reranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Result count used when a request does not specify one
    pub default_limit: usize,
    /// Inclusive minimum similarity score applied by default
    pub score_threshold: Option<f32>,
    /// Whether searches rerank by default
    pub enable_reranking: bool,
    /// Signal weights for the rerank pass
    pub rerank_weights: RerankWeights,
    /// Candidate pool fetched from the index when reranking
    pub rerank_candidate_pool: usize,
    /// Chunk length at which the rerank length signal saturates
    pub ideal_chunk_length: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 5,
            score_threshold: None,
            enable_reranking: false,
            rerank_weights: RerankWeights::default(),
            rerank_candidate_pool: 20,
            ideal_chunk_length: 300,
        }
    }
}

impl RagConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RagError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RagError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: RagConfig = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RagError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Default config file location (`<config dir>/ragprobe/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ragprobe").join("config.toml"))
    }

    /// Load from an explicit path, the default location, or fall back to
    /// built-in defaults when no file exists
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::load(&default),
                _ => Ok(Self::default()),
            },
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(provider) = std::env::var("RAGPROBE_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }
        if let Ok(model) = std::env::var("RAGPROBE_LLM_MODEL") {
            self.llm.model = model;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&RagConfig::default()).is_ok());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = RagConfig::default();
        config.chunking.strategy = ChunkStrategy::FixedSize;
        config.chunking.chunk_size = 128;
        config.search.enable_reranking = true;
        config.search.score_threshold = Some(0.25);
        config.search.rerank_weights = RerankWeights {
            vector: 0.6,
            keyword: 0.3,
            length: 0.1,
        };

        config.save(&path).unwrap();
        let loaded = RagConfig::load(&path).unwrap();

        assert_eq!(loaded.chunking.strategy, ChunkStrategy::FixedSize);
        assert_eq!(loaded.chunking.chunk_size, 128);
        assert!(loaded.search.enable_reranking);
        assert_eq!(loaded.search.score_threshold, Some(0.25));
        assert_eq!(loaded.search.rerank_weights.vector, 0.6);
        assert_eq!(loaded.search.rerank_weights.length, 0.1);
        assert_eq!(loaded.embedding.dimension, config.embedding.dimension);
    }

    #[test]
    fn test_missing_file_is_config_not_found() {
        let temp = TempDir::new().unwrap();
        let err = RagConfig::load(&temp.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, RagError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("partial.toml");
        std::fs::write(&path, "[search]\ndefault_limit = 9\nenable_reranking = false\nrerank_candidate_pool = 20\nideal_chunk_length = 300\n[search.rerank_weights]\nvector = 0.5\nkeyword = 0.3\nlength = 0.2\n").unwrap();

        let config = RagConfig::load(&path).unwrap();
        assert_eq!(config.search.default_limit, 9);
        // Unspecified sections fall back to defaults
        assert_eq!(config.embedding.provider, "hashing");
        assert_eq!(config.index.backend, "memory");
    }

    #[test]
    fn test_invalid_config_fails_validation() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.toml");
        let mut config = RagConfig::default();
        config.embedding.dimension = 0;
        config.save(&path).unwrap();

        let err = RagConfig::load(&path).unwrap_err();
        assert!(matches!(err, RagError::ConfigValidation { .. }));
    }
}
