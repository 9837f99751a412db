//! End-to-end retrieval pipeline tests
//!
//! Exercises the full chunk -> embed -> index -> search path with the
//! deterministic hashing provider, so everything runs offline.

use ragprobe::chunking::{ChunkOptions, ChunkStrategy, Chunker};
use ragprobe::config::{RagConfig, SearchConfig};
use ragprobe::document::Document;
use ragprobe::embedding::HashingProvider;
use ragprobe::index::{IndexConfig, MemoryIndex, VectorIndex};
use ragprobe::retrieval::{RetrievalPipeline, SearchRequest};
use serde_json::json;
use std::sync::Arc;

fn offline_pipeline() -> RetrievalPipeline {
    let provider = Arc::new(HashingProvider::new(384).unwrap());
    let index = Box::new(MemoryIndex::new(384));
    let chunker = Chunker::new(ChunkStrategy::Sentence, ChunkOptions::default());
    RetrievalPipeline::new(chunker, provider, index, SearchConfig::default())
}

#[test]
fn test_needle_document_ranks_first() {
    let pipeline = offline_pipeline();

    pipeline
        .add(&[
            Document::with_id("needle", "重要信息：宝藏在山顶"),
            Document::with_id("weather", "今天天气晴朗"),
            Document::with_id("cats", "猫喜欢睡觉"),
        ])
        .unwrap();

    let mut request = SearchRequest::new("宝藏在哪里", 3);
    request.use_reranking = Some(false);
    let results = pipeline.search(&request).unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].chunk_id, "needle::0");
    assert_eq!(results[0].content, "重要信息：宝藏在山顶");
}

#[test]
fn test_full_lifecycle() {
    let pipeline = offline_pipeline();

    let chunk_ids = pipeline
        .add(&[
            Document::with_id("a", "The treasure is on the mountain peak."),
            Document::with_id("b", "Cats enjoy sleeping in the sun."),
        ])
        .unwrap();
    assert_eq!(chunk_ids.len(), 2);

    let stats = pipeline.stats();
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.chunks, 2);
    assert_eq!(stats.dimension, 384);

    // Delete one chunk directly
    pipeline.delete(&[chunk_ids[1].clone()]).unwrap();
    assert_eq!(pipeline.stats().chunks, 1);
    assert_eq!(pipeline.stats().documents, 1);

    // Deleting it again is a no-op
    pipeline.delete(&[chunk_ids[1].clone()]).unwrap();

    pipeline.reset().unwrap();
    assert_eq!(pipeline.stats().chunks, 0);
    assert_eq!(pipeline.stats().documents, 0);
}

#[test]
fn test_idempotent_document_readds() {
    let pipeline = offline_pipeline();
    let doc = Document::with_id("stable", "Exactly the same sentence every time.");

    let first = pipeline.add(std::slice::from_ref(&doc)).unwrap();
    let second = pipeline.add(std::slice::from_ref(&doc)).unwrap();

    assert_eq!(first, second);
    assert_eq!(pipeline.stats().chunks, first.len());
    assert_eq!(pipeline.stats().documents, 1);
}

#[test]
fn test_metadata_filter_restricts_results() {
    let pipeline = offline_pipeline();

    pipeline
        .add(&[
            Document::with_id("zh", "宝藏在山顶").with_metadata("lang", json!("zh")),
            Document::with_id("zh2", "宝藏在湖底").with_metadata("lang", json!("zh")),
            Document::with_id("en", "treasure on the peak").with_metadata("lang", json!("en")),
        ])
        .unwrap();

    let mut request = SearchRequest::new("宝藏", 10);
    let mut filter = std::collections::HashMap::new();
    filter.insert("lang".to_string(), json!("en"));
    request.metadata_filter = Some(filter);

    let results = pipeline.search(&request).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk_id, "en::0");
}

#[test]
fn test_score_threshold_filters_unrelated_documents() {
    let pipeline = offline_pipeline();

    pipeline
        .add(&[
            Document::with_id("hit", "宝藏在山顶"),
            Document::with_id("miss", "completely unrelated latin text"),
        ])
        .unwrap();

    let mut request = SearchRequest::new("宝藏在哪里", 10);
    request.score_threshold = Some(0.2);
    let results = pipeline.search(&request).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk_id, "hit::0");
}

#[test]
fn test_reranking_annotates_and_respects_limit() {
    let pipeline = offline_pipeline();

    pipeline
        .add(&[
            Document::with_id("a", "the treasure map shows the peak"),
            Document::with_id("b", "a map of the city streets"),
            Document::with_id("c", "weather report for tomorrow"),
        ])
        .unwrap();

    let mut request = SearchRequest::new("treasure map", 2);
    request.use_reranking = Some(true);
    let results = pipeline.search(&request).unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.rerank_score.is_some()));
    assert_eq!(results[0].chunk_id, "a::0");
}

#[test]
fn test_pipeline_from_config_with_hnsw_backend() {
    let mut config = RagConfig::default();
    config.index = IndexConfig {
        backend: "hnsw".to_string(),
        ..IndexConfig::default()
    };
    config.chunking.strategy = ChunkStrategy::Sentence;

    let pipeline = RetrievalPipeline::from_config(&config).unwrap();
    pipeline
        .add(&[
            Document::with_id("needle", "重要信息：宝藏在山顶"),
            Document::with_id("weather", "今天天气晴朗"),
            Document::with_id("cats", "猫喜欢睡觉"),
        ])
        .unwrap();

    let mut request = SearchRequest::new("宝藏在哪里", 3);
    request.use_reranking = Some(false);
    let results = pipeline.search(&request).unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].chunk_id, "needle::0");
}

#[test]
fn test_wrong_dimension_query_fails_at_the_index() {
    let index = MemoryIndex::new(384);
    let err = index.search(&[0.5; 16], 5, None, None).unwrap_err();
    assert!(err.to_string().contains("expected 384"));
}

#[test]
fn test_fixed_size_chunking_through_pipeline() {
    let provider = Arc::new(HashingProvider::new(64).unwrap());
    let index = Box::new(MemoryIndex::new(64));
    let chunker = Chunker::new(
        ChunkStrategy::FixedSize,
        ChunkOptions {
            chunk_size: 10,
            chunk_overlap: 0,
        },
    );
    let pipeline = RetrievalPipeline::new(chunker, provider, index, SearchConfig::default());

    let content = "abcdefghijklmnopqrstuvwxy";
    let chunk_ids = pipeline
        .add(&[Document::with_id("alphabet", content)])
        .unwrap();

    // 25 chars in windows of 10: three chunks, the last one short
    assert_eq!(
        chunk_ids,
        vec!["alphabet::0", "alphabet::1", "alphabet::2"]
    );
    assert_eq!(pipeline.stats().chunks, 3);
}
