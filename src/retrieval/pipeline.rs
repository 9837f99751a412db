//! Retrieval pipeline composing chunker, embedding provider and index

use crate::chunking::Chunker;
use crate::config::SearchConfig;
use crate::document::Document;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::index::{IndexError, VectorIndex};
use crate::retrieval::{Reranker, SearchRequest, SearchResult};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Backoff before the single embedding retry
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector index error: {0}")]
    Index(#[from] IndexError),
}

/// Corpus counters exposed by [`RetrievalPipeline::stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub documents: usize,
    pub chunks: usize,
    pub dimension: usize,
}

/// Retrieval pipeline
///
/// Owns its index and provider references exclusively (callers may share a
/// provider across pipelines via the `Arc`). Designed for a single logical
/// caller; queries are re-embedded on every call with no caching between
/// them.
pub struct RetrievalPipeline {
    chunker: Chunker,
    provider: Arc<dyn EmbeddingProvider>,
    index: Box<dyn VectorIndex>,
    reranker: Reranker,
    search_config: SearchConfig,
    /// document id -> chunk ids currently stored for it
    documents: RwLock<HashMap<String, Vec<String>>>,
}

impl RetrievalPipeline {
    pub fn new(
        chunker: Chunker,
        provider: Arc<dyn EmbeddingProvider>,
        index: Box<dyn VectorIndex>,
        search_config: SearchConfig,
    ) -> Self {
        let reranker = Reranker::new(search_config.rerank_weights, search_config.ideal_chunk_length);
        Self {
            chunker,
            provider,
            index,
            reranker,
            search_config,
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Build a pipeline from configuration, resolving the provider and
    /// index backend by name
    pub fn from_config(config: &crate::config::RagConfig) -> Result<Self, PipelineError> {
        let provider = crate::embedding::create_provider(&config.embedding)?;
        let index = crate::index::create_index(&config.index, provider.dimension())?;
        let chunker = Chunker::new(config.chunking.strategy, config.chunking.options());
        Ok(Self::new(chunker, provider, index, config.search.clone()))
    }

    /// Chunk, embed and store documents; returns the stored chunk ids
    ///
    /// The whole batch is embedded in one provider call. A provider failure
    /// is retried once after a short backoff and then surfaced: partial
    /// results are never written, since a partial batch would corrupt the
    /// one-to-one ordering guarantee.
    pub fn add(&self, documents: &[Document]) -> Result<Vec<String>, PipelineError> {
        for document in documents {
            if document.content.trim().is_empty() {
                return Err(PipelineError::InvalidDocument(format!(
                    "Document {} has empty content",
                    document.id
                )));
            }
        }

        let mut chunks = Vec::new();
        for document in documents {
            chunks.extend(
                self.chunker
                    .chunk_document(document)
                    .into_iter()
                    .map(|chunk| (chunk, &document.metadata)),
            );
        }

        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|(c, _)| c.content.clone()).collect();
        let embeddings = self.embed_with_retry(&texts)?;

        if embeddings.len() != chunks.len() {
            return Err(PipelineError::Embedding(EmbeddingError::GenerationError(
                format!(
                    "Embedding count mismatch: expected {}, got {}",
                    chunks.len(),
                    embeddings.len()
                ),
            )));
        }

        let mut chunk_ids = Vec::with_capacity(chunks.len());
        let mut per_document: HashMap<String, Vec<String>> = HashMap::new();

        for ((chunk, doc_metadata), embedding) in chunks.iter().zip(embeddings.iter()) {
            let mut metadata = (*doc_metadata).clone();
            metadata.insert("document_id".to_string(), json!(chunk.document_id));
            metadata.insert("chunk_index".to_string(), json!(chunk.index));
            metadata.insert("offset".to_string(), json!(chunk.offset));

            self.index
                .upsert(&chunk.id, embedding, &chunk.content, &metadata)?;

            chunk_ids.push(chunk.id.clone());
            per_document
                .entry(chunk.document_id.clone())
                .or_default()
                .push(chunk.id.clone());
        }

        // Register new chunk sets, removing chunks a re-added document no
        // longer produces
        let mut registry = self.documents.write().unwrap();
        for (doc_id, new_ids) in per_document {
            if let Some(old_ids) = registry.get(&doc_id) {
                let stale: Vec<String> = old_ids
                    .iter()
                    .filter(|id| !new_ids.contains(id))
                    .cloned()
                    .collect();
                if !stale.is_empty() {
                    self.index.delete(&stale)?;
                }
            }
            registry.insert(doc_id, new_ids);
        }

        info!(
            "Ingested {} documents as {} chunks",
            documents.len(),
            chunk_ids.len()
        );
        Ok(chunk_ids)
    }

    /// Search the corpus
    ///
    /// Embeds the query (every call, no caching), fetches candidates from
    /// the index, optionally reranks, and truncates to the request limit.
    pub fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, PipelineError> {
        if request.text.trim().is_empty() {
            return Err(PipelineError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }

        let mut query_vectors = self.embed_with_retry(std::slice::from_ref(&request.text))?;
        if query_vectors.is_empty() {
            return Err(PipelineError::Embedding(EmbeddingError::GenerationError(
                "Provider returned no embedding for the query".to_string(),
            )));
        }
        let query_vector = query_vectors.remove(0);

        let rerank = request
            .use_reranking
            .unwrap_or(self.search_config.enable_reranking);

        // With reranking on, fetch a wider candidate pool so the rerank
        // pass has something to reorder
        let pool = if rerank {
            request.limit.max(self.search_config.rerank_candidate_pool)
        } else {
            request.limit
        };

        let points = self.index.search(
            &query_vector,
            pool,
            request.score_threshold,
            request.metadata_filter.as_ref(),
        )?;

        debug!(
            "Query returned {} candidates (pool {}, rerank {})",
            points.len(),
            pool,
            rerank
        );

        let mut results: Vec<SearchResult> = points
            .into_iter()
            .map(|point| SearchResult {
                chunk_id: point.chunk_id,
                content: point.content,
                score: point.score,
                rerank_score: None,
                metadata: point.metadata,
            })
            .collect();

        if rerank {
            results = self.reranker.rerank(&request.text, results);
        }
        results.truncate(request.limit);
        Ok(results)
    }

    /// Delete chunks by id; unknown ids are ignored
    pub fn delete(&self, chunk_ids: &[String]) -> Result<(), PipelineError> {
        self.index.delete(chunk_ids)?;

        let mut registry = self.documents.write().unwrap();
        for ids in registry.values_mut() {
            ids.retain(|id| !chunk_ids.contains(id));
        }
        registry.retain(|_, ids| !ids.is_empty());
        Ok(())
    }

    /// Delete a document and all chunks derived from it
    ///
    /// Unknown document ids are a no-op.
    pub fn delete_document(&self, document_id: &str) -> Result<(), PipelineError> {
        let chunk_ids = {
            let mut registry = self.documents.write().unwrap();
            registry.remove(document_id)
        };
        if let Some(chunk_ids) = chunk_ids {
            self.index.delete(&chunk_ids)?;
        }
        Ok(())
    }

    /// Clear the index and the document registry
    pub fn reset(&self) -> Result<(), PipelineError> {
        self.index.reset()?;
        self.documents.write().unwrap().clear();
        Ok(())
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            documents: self.documents.read().unwrap().len(),
            chunks: self.index.count(),
            dimension: self.provider.dimension(),
        }
    }

    fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        match self.provider.embed_batch(texts) {
            Ok(embeddings) => Ok(embeddings),
            // Bad input will not get better on retry
            Err(err @ EmbeddingError::InvalidInput(_)) => Err(err),
            Err(err) => {
                warn!("Embedding batch failed, retrying once: {}", err);
                std::thread::sleep(RETRY_BACKOFF);
                self.provider.embed_batch(texts)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{ChunkOptions, ChunkStrategy};
    use crate::embedding::HashingProvider;
    use crate::index::MemoryIndex;

    fn pipeline() -> RetrievalPipeline {
        let provider = Arc::new(HashingProvider::new(128).unwrap());
        let index = Box::new(MemoryIndex::new(128));
        let chunker = Chunker::new(ChunkStrategy::Sentence, ChunkOptions::default());
        RetrievalPipeline::new(chunker, provider, index, SearchConfig::default())
    }

    #[test]
    fn test_add_rejects_empty_document() {
        let p = pipeline();
        let err = p.add(&[Document::with_id("empty", "   ")]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidDocument(_)));
        assert_eq!(p.stats().chunks, 0);
    }

    #[test]
    fn test_search_rejects_empty_query() {
        let p = pipeline();
        let err = p.search(&SearchRequest::new("  ", 5)).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidQuery(_)));
    }

    #[test]
    fn test_add_returns_derived_chunk_ids() {
        let p = pipeline();
        let ids = p.add(&[Document::with_id("doc", "hello world")]).unwrap();
        assert_eq!(ids, vec!["doc::0".to_string()]);

        let stats = p.stats();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.dimension, 128);
    }

    #[test]
    fn test_readding_identical_document_is_idempotent() {
        let p = pipeline();
        let doc = Document::with_id("doc", "same content every time");
        let first = p.add(std::slice::from_ref(&doc)).unwrap();
        let second = p.add(std::slice::from_ref(&doc)).unwrap();

        assert_eq!(first, second);
        assert_eq!(p.stats().chunks, first.len());
    }

    #[test]
    fn test_readding_shrunk_document_prunes_stale_chunks() {
        let provider = Arc::new(HashingProvider::new(64).unwrap());
        let index = Box::new(MemoryIndex::new(64));
        // Floor of 0 keeps every sentence as its own chunk
        let chunker = Chunker::new(
            ChunkStrategy::Sentence,
            ChunkOptions {
                chunk_size: 0,
                chunk_overlap: 0,
            },
        );
        let p = RetrievalPipeline::new(chunker, provider, index, SearchConfig::default());

        p.add(&[Document::with_id("doc", "First. Second. Third.")]).unwrap();
        assert_eq!(p.stats().chunks, 3);

        p.add(&[Document::with_id("doc", "First.")]).unwrap();
        assert_eq!(p.stats().chunks, 1);
    }

    #[test]
    fn test_delete_document_removes_its_chunks() {
        let p = pipeline();
        p.add(&[
            Document::with_id("keep", "kept content"),
            Document::with_id("drop", "dropped content"),
        ])
        .unwrap();
        assert_eq!(p.stats().documents, 2);

        p.delete_document("drop").unwrap();
        let stats = p.stats();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, 1);

        // Unknown document is a no-op
        p.delete_document("never-existed").unwrap();
    }

    #[test]
    fn test_search_truncates_to_limit() {
        let p = pipeline();
        p.add(&[
            Document::with_id("a", "shared words here"),
            Document::with_id("b", "shared words there"),
            Document::with_id("c", "shared words everywhere"),
        ])
        .unwrap();

        let results = p.search(&SearchRequest::new("shared words", 2)).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_reset_clears_corpus() {
        let p = pipeline();
        p.add(&[Document::with_id("doc", "some content")]).unwrap();
        p.reset().unwrap();

        let stats = p.stats();
        assert_eq!(stats.documents, 0);
        assert_eq!(stats.chunks, 0);
    }

    #[test]
    fn test_rerank_annotates_scores() {
        let p = pipeline();
        p.add(&[Document::with_id("doc", "the treasure is on the peak")]).unwrap();

        let mut request = SearchRequest::new("treasure peak", 5);
        request.use_reranking = Some(true);
        let results = p.search(&request).unwrap();
        assert!(results[0].rerank_score.is_some());

        request.use_reranking = Some(false);
        let results = p.search(&request).unwrap();
        assert!(results[0].rerank_score.is_none());
    }
}
