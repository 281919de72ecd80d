//! HNSW index implementation (C2)
//!
//! Wraps the `hnsw_rs` crate. Vectors are stored alongside the graph so the
//! index can be fully rebuilt after deletes; the graph topology itself is
//! never persisted, only the vectors and tombstones.

use hnsw_rs::hnsw::Hnsw;
use hnsw_rs::prelude::*;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

pub type VectorId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HnswConfig {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub metric: DistanceMetric,
}

impl Default for HnswConfig {
    fn default() -> Self {
        HnswConfig {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
            metric: DistanceMetric::Cosine,
        }
    }
}

/// Approximate nearest-neighbor index over a single logical collection
/// (one per-KB-per-file partition, or one schema-graph-node axis).
pub struct HnswIndex {
    inner: RwLock<Option<HnswInnerOwned>>,
    config: HnswConfig,
    tombstones: RwLock<HashSet<VectorId>>,
    vectors: RwLock<Vec<(VectorId, Vec<f32>)>>,
    dimension: RwLock<usize>,
}

struct HnswInnerOwned {
    hnsw: Box<Hnsw<'static, f32, DistL2>>,
    _storage: Arc<Vec<Vec<f32>>>,
    index_to_vector_id: Vec<VectorId>,
}

unsafe impl Send for HnswInnerOwned {}
unsafe impl Sync for HnswInnerOwned {}

impl HnswIndex {
    pub fn new(config: HnswConfig) -> Self {
        HnswIndex {
            inner: RwLock::new(None),
            config,
            tombstones: RwLock::new(HashSet::new()),
            vectors: RwLock::new(Vec::new()),
            dimension: RwLock::new(0),
        }
    }

    fn rebuild_hnsw(&self) -> Result<(), String> {
        let vectors = self.vectors.read();
        let tombstones = self.tombstones.read();

        let active: Vec<(VectorId, &Vec<f32>)> = vectors
            .iter()
            .filter(|(id, _)| !tombstones.contains(id))
            .map(|(id, v)| (*id, v))
            .collect();

        if active.is_empty() {
            *self.inner.write() = None;
            return Ok(());
        }

        let dim = active[0].1.len();
        let storage: Vec<Vec<f32>> = active.iter().map(|(_, v)| (*v).clone()).collect();
        let index_to_vector_id: Vec<VectorId> = active.iter().map(|(id, _)| *id).collect();
        let storage = Arc::new(storage);

        // SAFETY: `storage` is moved into `HnswInnerOwned._storage`, which
        // outlives the graph referencing it; both live behind the same
        // RwLock write-guard swap, so the old pair is dropped atomically and
        // no code path extracts `_storage` independently of the graph.
        let storage_ref: &'static Vec<Vec<f32>> =
            unsafe { &*Arc::as_ptr(&storage).cast::<Vec<Vec<f32>>>() };

        let max_elements = storage_ref.len();
        let max_layer = if storage_ref.len() <= 1 {
            4
        } else {
            let m = (self.config.m as f64).max(2.0);
            let n = storage_ref.len() as f64;
            (n.ln() / m.ln()).ceil().clamp(4.0, 16.0) as usize
        };
        let mut hnsw: Hnsw<'static, f32, DistL2> = Hnsw::new(
            self.config.m,
            max_elements,
            max_layer,
            self.config.ef_construction,
            DistL2,
        );
        hnsw.set_keeping_pruned(true);
        hnsw.set_extend_candidates(true);
        hnsw.modify_level_scale(0.2);

        for (idx, vec) in storage_ref.iter().enumerate() {
            hnsw.insert((vec, idx));
        }

        *self.inner.write() = Some(HnswInnerOwned {
            hnsw: Box::new(hnsw),
            _storage: storage,
            index_to_vector_id,
        });
        *self.dimension.write() = dim;
        Ok(())
    }

    fn normalize(vec: &[f32]) -> Vec<f32> {
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 1e-10 {
            vec.iter().map(|x| x / norm).collect()
        } else {
            vec.to_vec()
        }
    }

    fn prepare(&self, vec: &[f32]) -> Vec<f32> {
        match self.config.metric {
            DistanceMetric::Cosine => Self::normalize(vec),
            DistanceMetric::Euclidean => vec.to_vec(),
        }
    }

    /// Transforms raw L2 distance (what `hnsw_rs` always computes internally)
    /// into the metric the caller asked for. Cosine distance on unit vectors
    /// follows `1 - cos(theta) = L2^2 / 2`.
    fn transform_distance(&self, dist: f32) -> f64 {
        match self.config.metric {
            DistanceMetric::Euclidean => dist as f64,
            DistanceMetric::Cosine => (dist * dist / 2.0) as f64,
        }
    }

    pub fn search(&self, query: &[f32], k: usize, ef: Option<usize>) -> Vec<(VectorId, f64)> {
        let inner_guard = self.inner.read();
        let Some(inner) = &*inner_guard else {
            return Vec::new();
        };
        let ef_search = ef.unwrap_or(self.config.ef_search);
        let prepared = self.prepare(query);
        let raw = inner.hnsw.search(&prepared, k, ef_search);

        let mut results: Vec<(VectorId, f64)> = raw
            .into_iter()
            .filter_map(|n| {
                inner
                    .index_to_vector_id
                    .get(n.d_id)
                    .map(|id| (*id, self.transform_distance(n.distance)))
            })
            .collect();
        results.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);
        results
    }

    pub fn insert(&self, id: VectorId, vector: &[f32]) -> Result<(), String> {
        if vector.is_empty() {
            return Err("cannot insert empty vector".to_string());
        }
        if matches!(self.config.metric, DistanceMetric::Cosine) {
            let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm <= 1e-10 {
                return Err("cannot insert zero-norm vector for cosine metric".to_string());
            }
        }
        {
            let mut dim = self.dimension.write();
            if *dim == 0 {
                *dim = vector.len();
            } else if *dim != vector.len() {
                return Err(format!(
                    "dimension mismatch: index has dimension {}, got {}",
                    *dim,
                    vector.len()
                ));
            }
        }
        {
            let mut vectors = self.vectors.write();
            let prepared = self.prepare(vector);
            if let Some(pos) = vectors.iter().position(|(existing, _)| *existing == id) {
                vectors[pos] = (id, prepared);
            } else {
                vectors.push((id, prepared));
            }
        }
        self.rebuild_hnsw()
    }

    pub fn delete(&self, id: VectorId) {
        self.tombstones.write().insert(id);
        if self.tombstone_ratio() > 0.3 {
            let active: Vec<(VectorId, Vec<f32>)> = {
                let vectors = self.vectors.read();
                let tombstones = self.tombstones.read();
                vectors
                    .iter()
                    .filter(|(id, _)| !tombstones.contains(id))
                    .cloned()
                    .collect()
            };
            let _ = self.rebuild(&active);
        }
    }

    pub fn rebuild(&self, vectors: &[(VectorId, Vec<f32>)]) -> Result<(), String> {
        self.tombstones.write().clear();
        *self.inner.write() = None;
        if let Some((_, vec)) = vectors.first() {
            *self.dimension.write() = vec.len();
        } else {
            *self.dimension.write() = 0;
            self.vectors.write().clear();
            return Ok(());
        }
        {
            let mut stored = self.vectors.write();
            stored.clear();
            for (id, vec) in vectors {
                stored.push((*id, self.prepare(vec)));
            }
        }
        self.rebuild_hnsw()
    }

    pub fn tombstone_ratio(&self) -> f64 {
        let vectors = self.vectors.read();
        let tombstones = self.tombstones.read();
        if vectors.is_empty() {
            0.0
        } else {
            tombstones.len() as f64 / vectors.len() as f64
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        *self.dimension.read()
    }
}

unsafe impl Send for HnswIndex {}
unsafe impl Sync for HnswIndex {}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(metric: DistanceMetric) -> HnswConfig {
        HnswConfig { m: 8, ef_construction: 100, ef_search: 32, metric }
    }

    #[test]
    fn insert_and_search_euclidean() {
        let index = HnswIndex::new(config(DistanceMetric::Euclidean));
        index.insert(0, &[0.0, 0.0]).unwrap();
        index.insert(1, &[1.0, 0.0]).unwrap();
        index.insert(2, &[0.0, 1.0]).unwrap();
        let results = index.search(&[0.1, 0.1], 1, None);
        assert_eq!(results[0].0, 0);
    }

    #[test]
    fn insert_and_search_cosine() {
        let index = HnswIndex::new(config(DistanceMetric::Cosine));
        index.insert(0, &[1.0, 0.0, 0.0]).unwrap();
        index.insert(1, &[0.0, 1.0, 0.0]).unwrap();
        index.insert(2, &[0.0, 0.0, 1.0]).unwrap();
        let results = index.search(&[1.0, 0.0, 0.0], 1, Some(100));
        assert_eq!(results[0].0, 0);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let index = HnswIndex::new(config(DistanceMetric::Euclidean));
        index.insert(0, &[1.0, 2.0, 3.0]).unwrap();
        assert!(index.insert(1, &[1.0, 2.0]).is_err());
    }

    #[test]
    fn delete_tombstones_and_excludes_from_rebuild() {
        let index = HnswIndex::new(config(DistanceMetric::Euclidean));
        index.insert(0, &[0.0, 0.0]).unwrap();
        index.insert(1, &[1.0, 0.0]).unwrap();
        index.insert(2, &[2.0, 0.0]).unwrap();
        index.insert(3, &[3.0, 0.0]).unwrap();
        index.delete(0);
        assert_eq!(index.len(), 4);
        index
            .rebuild(&[(1, vec![1.0, 0.0]), (2, vec![2.0, 0.0]), (3, vec![3.0, 0.0])])
            .unwrap();
        let results = index.search(&[0.0, 0.0], 3, None);
        assert!(results.iter().all(|(id, _)| *id != 0));
    }

    #[test]
    fn empty_index_search_is_empty() {
        let index = HnswIndex::new(config(DistanceMetric::Cosine));
        assert!(index.search(&[1.0, 0.0], 5, None).is_empty());
    }
}
