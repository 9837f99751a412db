//! Retrieval pipeline and reranking
//!
//! Composes the chunker, embedding provider and vector index into
//! add/search operations, with an optional multi-factor rerank pass over
//! the initial candidate set.

mod pipeline;
mod reranker;

pub use pipeline::{PipelineError, PipelineStats, RetrievalPipeline};
pub use reranker::{RerankWeights, Reranker};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Search request with optional filters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query text
    pub text: String,

    /// Maximum number of results
    pub limit: usize,

    /// Inclusive minimum similarity score
    pub score_threshold: Option<f32>,

    /// Exact-match conjunction over metadata keys
    pub metadata_filter: Option<HashMap<String, Value>>,

    /// Override the configured reranking toggle for this request
    pub use_reranking: Option<bool>,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>, limit: usize) -> Self {
        Self {
            text: text.into(),
            limit,
            score_threshold: None,
            metadata_filter: None,
            use_reranking: None,
        }
    }
}

/// A retrieved chunk with its scores
///
/// Ephemeral: constructed per query, never persisted. `rerank_score` is
/// set only when the rerank pass ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Chunk id
    pub chunk_id: String,

    /// Chunk text
    pub content: String,

    /// Raw similarity score from the index (higher is closer)
    pub score: f32,

    /// Composite score assigned by the reranker, if reranking ran
    pub rerank_score: Option<f32>,

    /// Chunk metadata
    pub metadata: HashMap<String, Value>,
}
