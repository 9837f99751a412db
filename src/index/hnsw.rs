//! HNSW vector index for approximate similarity search
//!
//! Wraps an in-process HNSW graph (cosine distance) behind the
//! [`VectorIndex`] trait. HNSW graphs cannot remove points, so upsert and
//! delete tombstone the old payload and searches over-fetch to compensate.
//! Result order is approximate: the exactness guarantees of the memory
//! backend (deterministic ties, exact recall) do not hold here.

use super::{matches_filter, IndexError, ScoredPoint, VectorIndex};
use ahash::{HashMap as AHashMap, HashMapExt};
use hnsw_rs::prelude::*;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

struct Payload {
    chunk_id: String,
    content: String,
    metadata: HashMap<String, Value>,
    alive: bool,
}

struct Store {
    /// HNSW data id -> payload; dead payloads are tombstones
    payloads: AHashMap<usize, Payload>,
    /// chunk_id -> live data id
    ids: AHashMap<String, usize>,
    next_data_id: usize,
    tombstones: usize,
}

/// Approximate vector index backed by an HNSW graph
pub struct HnswIndex {
    index: RwLock<Hnsw<'static, f32, DistCosine>>,
    store: RwLock<Store>,
    dimension: usize,
    ef_construction: usize,
    m: usize,
    ef_search: usize,
}

impl HnswIndex {
    /// Create a new index
    ///
    /// # Arguments
    /// * `dimension` - Vector dimension (must match embedding dimension)
    /// * `ef_construction` - HNSW construction parameter (higher = better recall, slower build)
    /// * `m` - HNSW M parameter (number of connections per layer)
    /// * `ef_search` - HNSW search parameter (higher = better recall, slower search)
    pub fn new(dimension: usize, ef_construction: usize, m: usize, ef_search: usize) -> Self {
        let index = Hnsw::<f32, DistCosine>::new(
            m,
            dimension,
            ef_construction,
            200, // max_nb_connection
            DistCosine,
        );

        Self {
            index: RwLock::new(index),
            store: RwLock::new(Store {
                payloads: AHashMap::new(),
                ids: AHashMap::new(),
                next_data_id: 0,
                tombstones: 0,
            }),
            dimension,
            ef_construction,
            m,
            ef_search,
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

impl VectorIndex for HnswIndex {
    fn upsert(
        &self,
        chunk_id: &str,
        vector: &[f32],
        content: &str,
        metadata: &HashMap<String, Value>,
    ) -> Result<(), IndexError> {
        self.check_dimension(vector)?;

        let mut store = self.store.write().unwrap();

        // Same id again: the old graph point cannot be removed, so it
        // becomes a tombstone and the new point takes over the id
        if let Some(old) = store.ids.get(chunk_id).copied() {
            if let Some(payload) = store.payloads.get_mut(&old) {
                payload.alive = false;
            }
            store.tombstones += 1;
        }

        let data_id = store.next_data_id;
        store.next_data_id += 1;

        let data = vector.to_vec();
        let index = self.index.write().unwrap();
        index.insert((&data, data_id));

        store.payloads.insert(
            data_id,
            Payload {
                chunk_id: chunk_id.to_string(),
                content: content.to_string(),
                metadata: metadata.clone(),
                alive: true,
            },
        );
        store.ids.insert(chunk_id.to_string(), data_id);

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

        let store = self.store.read().unwrap();
        if limit == 0 || store.ids.is_empty() {
            return Ok(Vec::new());
        }

        // Over-fetch so tombstoned and filtered-out points cannot starve
        // the result set
        let knbn = (limit + store.tombstones).max(limit);

        let index = self.index.read().unwrap();
        let neighbors = index.search(query, knbn, self.ef_search);

        let mut results = Vec::new();
        for neighbor in neighbors {
            let Some(payload) = store.payloads.get(&neighbor.d_id) else {
                continue;
            };
            if !payload.alive || !matches_filter(&payload.metadata, metadata_filter) {
                continue;
            }
            let score = 1.0 - neighbor.distance; // Convert distance to similarity
            if let Some(threshold) = score_threshold {
                if score < threshold {
                    continue;
                }
            }
            results.push(ScoredPoint {
                chunk_id: payload.chunk_id.clone(),
                content: payload.content.clone(),
                score,
                metadata: payload.metadata.clone(),
            });
            if results.len() == limit {
                break;
            }
        }

        Ok(results)
    }

    fn delete(&self, chunk_ids: &[String]) -> Result<(), IndexError> {
        let mut store = self.store.write().unwrap();
        for id in chunk_ids {
            // Unknown ids are ignored so deletion stays idempotent
            if let Some(data_id) = store.ids.remove(id) {
                if let Some(payload) = store.payloads.get_mut(&data_id) {
                    payload.alive = false;
                }
                store.tombstones += 1;
            }
        }
        Ok(())
    }

    fn count(&self) -> usize {
        self.store.read().unwrap().ids.len()
    }

    fn reset(&self) -> Result<(), IndexError> {
        // Lock order is store then index, same as upsert
        let mut store = self.store.write().unwrap();
        let mut index = self.index.write().unwrap();
        *index = Hnsw::<f32, DistCosine>::new(
            self.m,
            self.dimension,
            self.ef_construction,
            200, // max_nb_connection
            DistCosine,
        );

        store.payloads.clear();
        store.ids.clear();
        store.next_data_id = 0;
        store.tombstones = 0;

        Ok(())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> HashMap<String, Value> {
        HashMap::new()
    }

    #[test]
    fn test_index_creation() {
        let index = HnswIndex::new(384, 200, 16, 50);
        assert_eq!(index.dimension(), 384);
        assert_eq!(index.count(), 0);
    }

    #[test]
    fn test_insert_and_search() {
        let index = HnswIndex::new(384, 200, 16, 50);

        let mut vec1 = vec![0.0; 384];
        vec1[0] = 1.0;
        let mut vec2 = vec![0.0; 384];
        vec2[1] = 1.0;
        let mut vec3 = vec![0.0; 384];
        vec3[0] = 0.9;
        vec3[1] = 0.1;

        index.upsert("one", &vec1, "first", &meta()).unwrap();
        index.upsert("two", &vec2, "second", &meta()).unwrap();
        index.upsert("three", &vec3, "third", &meta()).unwrap();

        assert_eq!(index.count(), 3);

        let results = index.search(&vec1, 2, None, None).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].chunk_id == "one" || results[0].chunk_id == "three");
        assert!(results[0].score > 0.8);
    }

    #[test]
    fn test_dimension_validation() {
        let index = HnswIndex::new(384, 200, 16, 50);
        let vec = vec![1.0; 128];
        assert!(index.upsert("a", &vec, "x", &meta()).is_err());
        assert!(index.search(&vec, 5, None, None).is_err());
    }

    #[test]
    fn test_upsert_tombstones_old_point() {
        let index = HnswIndex::new(4, 200, 16, 50);
        index.upsert("a", &[1.0, 0.0, 0.0, 0.0], "old", &meta()).unwrap();
        index.upsert("a", &[0.0, 1.0, 0.0, 0.0], "new", &meta()).unwrap();

        assert_eq!(index.count(), 1);
        let results = index.search(&[0.0, 1.0, 0.0, 0.0], 5, None, None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "new");
    }

    #[test]
    fn test_delete_hides_points() {
        let index = HnswIndex::new(4, 200, 16, 50);
        index.upsert("a", &[1.0, 0.0, 0.0, 0.0], "x", &meta()).unwrap();
        index.delete(&["a".to_string(), "missing".to_string()]).unwrap();

        assert_eq!(index.count(), 0);
        let results = index.search(&[1.0, 0.0, 0.0, 0.0], 5, None, None).unwrap();
        assert!(results.is_empty());
    }
}
