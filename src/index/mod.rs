//! Vector index abstraction and implementations
//!
//! The [`VectorIndex`] trait is the storage seam of the pipeline: anything
//! that can upsert vectors with payloads and return nearest neighbors can
//! back retrieval. Two implementations ship here:
//! - [`MemoryIndex`]: exact cosine scan, deterministic ordering
//! - [`HnswIndex`]: approximate HNSW graph for larger corpora

mod hnsw;
mod memory;

pub use hnsw::HnswIndex;
pub use memory::MemoryIndex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Search failed: {0}")]
    SearchError(String),
}

/// A stored point returned from a search, ordered by descending similarity
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Chunk id the vector was stored under
    pub chunk_id: String,
    /// Stored chunk text
    pub content: String,
    /// Similarity score (higher is closer)
    pub score: f32,
    /// Stored metadata
    pub metadata: HashMap<String, Value>,
}

/// Trait for vector storage backends
///
/// Contract highlights:
/// - `upsert` is idempotent: storing the same id again overwrites in place
/// - `search` orders by descending similarity; ties break by insertion order
///   (earliest first); `score_threshold` is an inclusive lower bound applied
///   before truncating to `limit`; `metadata_filter` is an exact-match
///   conjunction over the supplied keys
/// - `delete` silently ignores unknown ids
/// - query vectors must match the index dimension
pub trait VectorIndex: Send + Sync {
    fn upsert(
        &self,
        chunk_id: &str,
        vector: &[f32],
        content: &str,
        metadata: &HashMap<String, Value>,
    ) -> Result<(), IndexError>;

    fn search(
        &self,
        query: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
        metadata_filter: Option<&HashMap<String, Value>>,
    ) -> Result<Vec<ScoredPoint>, IndexError>;

    fn delete(&self, chunk_ids: &[String]) -> Result<(), IndexError>;

    fn count(&self) -> usize;

    fn reset(&self) -> Result<(), IndexError>;

    fn dimension(&self) -> usize;
}

/// Configuration for the vector index backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Backend name: "memory" or "hnsw"
    pub backend: String,
    /// HNSW construction parameter (higher = better recall, slower build)
    pub hnsw_ef_construction: usize,
    /// HNSW M parameter (number of connections per layer)
    pub hnsw_m: usize,
    /// HNSW search parameter (higher = better recall, slower search)
    pub hnsw_ef_search: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            hnsw_ef_construction: 200,
            hnsw_m: 16,
            hnsw_ef_search: 50,
        }
    }
}

/// Build a vector index from configuration
///
/// Backend names map to constructors; an unrecognized name is an explicit
/// error, never a silent fallback.
pub fn create_index(
    config: &IndexConfig,
    dimension: usize,
) -> Result<Box<dyn VectorIndex>, IndexError> {
    match config.backend.as_str() {
        "memory" => Ok(Box::new(MemoryIndex::new(dimension))),
        "hnsw" => Ok(Box::new(HnswIndex::new(
            dimension,
            config.hnsw_ef_construction,
            config.hnsw_m,
            config.hnsw_ef_search,
        ))),
        other => Err(IndexError::InitializationError(format!(
            "Unsupported index backend: {}. Supported: memory, hnsw",
            other
        ))),
    }
}

/// Cosine similarity between two equal-length vectors
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

/// Exact-match conjunction over the filter's keys
pub(crate) fn matches_filter(
    metadata: &HashMap<String, Value>,
    filter: Option<&HashMap<String, Value>>,
) -> bool {
    match filter {
        None => true,
        Some(filter) => filter
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_factory_rejects_unknown_backend() {
        let config = IndexConfig {
            backend: "warehouse".to_string(),
            ..IndexConfig::default()
        };
        assert!(create_index(&config, 8).is_err());
    }

    #[test]
    fn test_cosine_similarity_bounds() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_metadata_filter_is_conjunction() {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), json!("feed"));
        metadata.insert("lang".to_string(), json!("zh"));

        let mut filter = HashMap::new();
        filter.insert("source".to_string(), json!("feed"));
        assert!(matches_filter(&metadata, Some(&filter)));

        filter.insert("lang".to_string(), json!("en"));
        assert!(!matches_filter(&metadata, Some(&filter)));

        assert!(matches_filter(&metadata, None));
    }
}
