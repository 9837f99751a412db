//! Exact in-memory vector index
//!
//! Scans every stored vector with cosine similarity, which keeps the full
//! index contract exact: deterministic ordering, insertion-order tie-breaks,
//! inclusive thresholds, metadata filters, and idempotent upsert/delete.
//! Intended for evaluation harnesses and modest corpora; use the HNSW
//! backend when scan cost matters more than exactness.

use super::{cosine_similarity, matches_filter, IndexError, ScoredPoint, VectorIndex};
use ahash::{HashMap as AHashMap, HashMapExt};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

struct Entry {
    chunk_id: String,
    vector: Vec<f32>,
    content: String,
    metadata: HashMap<String, Value>,
    alive: bool,
}

#[derive(Default)]
struct Inner {
    /// Entries in insertion order; slots are never reused so the slot index
    /// doubles as the insertion-order tie-break key
    entries: Vec<Entry>,
    /// chunk_id -> slot of the live entry
    slots: AHashMap<String, usize>,
}

/// Exact-scan vector index
pub struct MemoryIndex {
    inner: RwLock<Inner>,
    dimension: usize,
}

impl MemoryIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: Vec::new(),
                slots: AHashMap::new(),
            }),
            dimension,
        }
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl VectorIndex for MemoryIndex {
    fn upsert(
        &self,
        chunk_id: &str,
        vector: &[f32],
        content: &str,
        metadata: &HashMap<String, Value>,
    ) -> Result<(), IndexError> {
        self.check_dimension(vector)?;

        let mut inner = self.inner.write().unwrap();
        match inner.slots.get(chunk_id).copied() {
            // Overwrite in place: the entry keeps its insertion slot so
            // tie-breaking is stable across idempotent re-adds
            Some(slot) => {
                let entry = &mut inner.entries[slot];
                entry.vector = vector.to_vec();
                entry.content = content.to_string();
                entry.metadata = metadata.clone();
            }
            None => {
                let slot = inner.entries.len();
                inner.entries.push(Entry {
                    chunk_id: chunk_id.to_string(),
                    vector: vector.to_vec(),
                    content: content.to_string(),
                    metadata: metadata.clone(),
                    alive: true,
                });
                inner.slots.insert(chunk_id.to_string(), slot);
            }
        }
        Ok(())
    }

    fn search(
        &self,
        query: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
        metadata_filter: Option<&HashMap<String, Value>>,
    ) -> Result<Vec<ScoredPoint>, IndexError> {
        self.check_dimension(query)?;

        let inner = self.inner.read().unwrap();
        let mut scored: Vec<(usize, f32, &Entry)> = inner
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.alive)
            .filter(|(_, e)| matches_filter(&e.metadata, metadata_filter))
            .map(|(slot, e)| (slot, cosine_similarity(query, &e.vector), e))
            .filter(|(_, score, _)| match score_threshold {
                Some(threshold) => *score >= threshold,
                None => true,
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(_, score, e)| ScoredPoint {
                chunk_id: e.chunk_id.clone(),
                content: e.content.clone(),
                score,
                metadata: e.metadata.clone(),
            })
            .collect())
    }

    fn delete(&self, chunk_ids: &[String]) -> Result<(), IndexError> {
        let mut inner = self.inner.write().unwrap();
        for id in chunk_ids {
            // Unknown ids are ignored so deletion stays idempotent
            if let Some(slot) = inner.slots.remove(id) {
                inner.entries[slot].alive = false;
            }
        }
        Ok(())
    }

    fn count(&self) -> usize {
        self.inner.read().unwrap().slots.len()
    }

    fn reset(&self) -> Result<(), IndexError> {
        let mut inner = self.inner.write().unwrap();
        inner.entries.clear();
        inner.slots.clear();
        Ok(())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
