//! Embedding generation
//!
//! Architecture:
//! - EmbeddingProvider trait for abstraction over backends
//! - HashingProvider for deterministic offline vectors (no model download)
//! - FastEmbedProvider for local model inference (all-MiniLM-L6-v2, 384-dim)
mod hashing;
mod provider;

pub use hashing::HashingProvider;
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration for embedding generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "hashing" or "fastembed"
    pub provider: String,
    /// Model name (fastembed only, e.g. "all-MiniLM-L6-v2")
    pub model: String,
    /// Embedding dimension (hashing only; fastembed models fix their own)
    pub dimension: usize,
    /// Batch size for ingest
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashing".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            batch_size: 32,
        }
    }
}

/// Build an embedding provider from configuration
///
/// Provider names map to constructors here; an unrecognized name is an
/// explicit error, never a silent fallback.
pub fn create_provider(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingProvider::new(config.dimension)?)),
        "fastembed" => Ok(Arc::new(FastEmbedProvider::new(&config.model)?)),
        other => Err(EmbeddingError::InitializationError(format!(
            "Unsupported embedding provider: {}. Supported: hashing, fastembed",
            other
        ))),
    }
}
