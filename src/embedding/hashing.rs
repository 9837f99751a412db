//! Deterministic feature-hashing embedding provider
//!
//! Maps character unigrams and bigrams into a fixed number of hash buckets
//! and L2-normalizes the result. Cosine similarity between two vectors then
//! reflects character n-gram overlap, which is enough for retrieval tests
//! and offline operation: no model download, no network, and identical
//! input always produces an identical vector.

use super::provider::{EmbeddingError, EmbeddingProvider};
use ahash::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};

/// Fixed hasher keys so vectors are reproducible across runs
const HASH_SEEDS: (u64, u64, u64, u64) = (0x5261, 0x6770, 0x726f, 0x6265);

/// Offline embedding provider backed by character n-gram feature hashing
pub struct HashingProvider {
    dimension: usize,
    hasher: RandomState,
}

impl HashingProvider {
    /// Create a provider producing vectors of the given dimension
    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::InitializationError(
                "Dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            hasher: RandomState::with_seeds(
                HASH_SEEDS.0,
                HASH_SEEDS.1,
                HASH_SEEDS.2,
                HASH_SEEDS.3,
            ),
        })
    }

    fn bucket<T: Hash>(&self, feature: T) -> usize {
        let mut h = self.hasher.build_hasher();
        feature.hash(&mut h);
        (h.finish() % self.dimension as u64) as usize
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        // Keep letters, digits and CJK; drop whitespace and punctuation
        let chars: Vec<char> = text
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();

        for &c in &chars {
            vector[self.bucket((0u8, c))] += 1.0;
        }
        for pair in chars.windows(2) {
            vector[self.bucket((1u8, pair[0], pair[1]))] += 1.0;
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for v in vector.iter_mut() {
                *v /= magnitude;
            }
        }
        vector
    }
}

impl EmbeddingProvider for HashingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }
        Ok(self.encode(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(
                "Batch contains an empty text".to_string(),
            ));
        }
        Ok(texts.iter().map(|t| self.encode(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "char-ngram-hashing"
    }
}
