use crate::chunking::ChunkStrategy;
use crate::config::RagConfig;
use crate::error::{RagError, Result, ValidationIssue};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every issue before failing
    pub fn validate(config: &RagConfig) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_chunking(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_search(config, &mut errors);
        Self::validate_llm(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RagError::ConfigValidation { errors })
        }
    }

    fn validate_chunking(config: &RagConfig, errors: &mut Vec<ValidationIssue>) {
        let chunking = &config.chunking;

        // A zero size is only meaningful for the sentence strategy, where
        // it disables merging
        if chunking.chunk_size == 0 && chunking.strategy != ChunkStrategy::Sentence {
            errors.push(ValidationIssue::new(
                "chunking.chunk_size",
                "chunk_size must be greater than 0 for fixed_size and smart strategies",
            ));
        }

        if chunking.strategy == ChunkStrategy::FixedSize
            && chunking.chunk_size > 0
            && chunking.chunk_overlap >= chunking.chunk_size
        {
            errors.push(ValidationIssue::new(
                "chunking.chunk_overlap",
                format!(
                    "chunk_overlap ({}) must be smaller than chunk_size ({})",
                    chunking.chunk_overlap, chunking.chunk_size
                ),
            ));
        }
    }

    fn validate_embedding(config: &RagConfig, errors: &mut Vec<ValidationIssue>) {
        let embedding = &config.embedding;

        if embedding.dimension == 0 {
            errors.push(ValidationIssue::new(
                "embedding.dimension",
                "Dimension must be greater than 0",
            ));
        }

        if embedding.batch_size == 0 {
            errors.push(ValidationIssue::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if !matches!(embedding.provider.as_str(), "hashing" | "fastembed") {
            errors.push(ValidationIssue::new(
                "embedding.provider",
                format!(
                    "Unknown provider: {}. Supported: hashing, fastembed",
                    embedding.provider
                ),
            ));
        }
    }

    fn validate_index(config: &RagConfig, errors: &mut Vec<ValidationIssue>) {
        let index = &config.index;

        if !matches!(index.backend.as_str(), "memory" | "hnsw") {
            errors.push(ValidationIssue::new(
                "index.backend",
                format!("Unknown backend: {}. Supported: memory, hnsw", index.backend),
            ));
        }

        if index.backend == "hnsw"
            && (index.hnsw_m == 0 || index.hnsw_ef_construction == 0 || index.hnsw_ef_search == 0)
        {
            errors.push(ValidationIssue::new(
                "index",
                "HNSW parameters must all be greater than 0",
            ));
        }
    }

    fn validate_search(config: &RagConfig, errors: &mut Vec<ValidationIssue>) {
        let search = &config.search;

        if search.default_limit == 0 {
            errors.push(ValidationIssue::new(
                "search.default_limit",
                "Default limit must be greater than 0",
            ));
        }

        if search.rerank_candidate_pool == 0 {
            errors.push(ValidationIssue::new(
                "search.rerank_candidate_pool",
                "Rerank candidate pool must be greater than 0",
            ));
        }

        let weights = &search.rerank_weights;
        if weights.vector < 0.0 || weights.keyword < 0.0 || weights.length < 0.0 {
            errors.push(ValidationIssue::new(
                "search.rerank_weights",
                "Rerank weights must be non-negative",
            ));
        }

        if let Some(threshold) = search.score_threshold {
            if !(-1.0..=1.0).contains(&threshold) {
                errors.push(ValidationIssue::new(
                    "search.score_threshold",
                    format!("Score threshold {} outside [-1, 1]", threshold),
                ));
            }
        }
    }

    fn validate_llm(config: &RagConfig, errors: &mut Vec<ValidationIssue>) {
        let llm = &config.llm;

        if llm.provider != "openai-compat" {
            errors.push(ValidationIssue::new(
                "llm.provider",
                format!("Unknown provider: {}. Supported: openai-compat", llm.provider),
            ));
        }

        if llm.api_base.trim().is_empty() {
            errors.push(ValidationIssue::new(
                "llm.api_base",
                "API base URL cannot be empty",
            ));
        }

        if !(0.0..=2.0).contains(&llm.temperature) {
            errors.push(ValidationIssue::new(
                "llm.temperature",
                format!("Temperature {} outside [0, 2]", llm.temperature),
            ));
        }
    }
}
