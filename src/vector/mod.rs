//! Dense-vector index backend (C2)
//!
//! Two kinds of collection live here:
//! - one document collection per `(kb_id, file_id)` partition, holding one
//!   vector per inverted-index child chunk;
//! - one dual-vector schema-graph-node collection per `sql_id`, holding a
//!   name-embedding axis and a description-embedding axis per schema
//!   element, combined by a weighted ranker at search time.
//!
//! When [`VectorConfig::enabled`] is false every method becomes a no-op
//! returning empty results instead of an error — callers upstream (the
//! retrieval orchestrator, the SQL pipeline) don't need to special-case a
//! disabled backend.

mod hnsw_index;

pub use hnsw_index::{DistanceMetric, HnswConfig, VectorId};
pub(crate) use hnsw_index::HnswIndex;

use crate::config::VectorConfig;
use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DocKey {
    kb_id: i64,
    file_id: i64,
}

pub struct VectorStore {
    config: VectorConfig,
    document_collections: DashMap<DocKey, HnswIndex>,
    schema_name_collections: DashMap<i64, HnswIndex>,
    schema_desc_collections: DashMap<i64, HnswIndex>,
}

impl VectorStore {
    pub fn new(config: VectorConfig) -> Self {
        VectorStore {
            config,
            document_collections: DashMap::new(),
            schema_name_collections: DashMap::new(),
            schema_desc_collections: DashMap::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn hnsw_config(&self) -> HnswConfig {
        HnswConfig {
            m: self.config.hnsw_max_neighbors,
            ef_construction: self.config.hnsw_ef_construction,
            ef_search: self.config.hnsw_ef_construction / 2,
            metric: DistanceMetric::Cosine,
        }
    }

    /// Inserts or updates the vector for a single document chunk. `chunk_id`
    /// is the inverted index's own numeric id for the child chunk.
    pub fn upsert_chunk_vector(
        &self,
        kb_id: i64,
        file_id: i64,
        chunk_id: VectorId,
        vector: &[f32],
    ) -> Result<(), String> {
        if !self.enabled() {
            return Ok(());
        }
        let key = DocKey { kb_id, file_id };
        let index = self
            .document_collections
            .entry(key)
            .or_insert_with(|| HnswIndex::new(self.hnsw_config()));
        index.insert(chunk_id, vector)
    }

    /// Removes every vector belonging to `file_id`'s partition. Called as
    /// part of the file-delete cascade.
    pub fn delete_file_partition(&self, kb_id: i64, file_id: i64) {
        self.document_collections.remove(&DocKey { kb_id, file_id });
    }

    pub fn search_document_chunks(
        &self,
        kb_id: i64,
        file_id: i64,
        query: &[f32],
        k: usize,
    ) -> Vec<(VectorId, f64)> {
        if !self.enabled() {
            return Vec::new();
        }
        match self.document_collections.get(&DocKey { kb_id, file_id }) {
            Some(index) => index.search(query, k, None),
            None => Vec::new(),
        }
    }

    /// Searches every file partition under a knowledge base and merges by
    /// score. Used when a query is not scoped to one file.
    pub fn search_knowledge_base(&self, kb_id: i64, query: &[f32], k: usize) -> Vec<(i64, VectorId, f64)> {
        if !self.enabled() {
            return Vec::new();
        }
        let mut merged: Vec<(i64, VectorId, f64)> = self
            .document_collections
            .iter()
            .filter(|entry| entry.key().kb_id == kb_id)
            .flat_map(|entry| {
                let file_id = entry.key().file_id;
                entry.value().search(query, k, None).into_iter().map(move |(id, score)| (file_id, id, score))
            })
            .collect();
        merged.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));
        merged.truncate(k);
        merged
    }

    pub fn upsert_schema_node_vectors(
        &self,
        sql_id: i64,
        node_id: VectorId,
        name_vector: &[f32],
        description_vector: &[f32],
    ) -> Result<(), String> {
        if !self.enabled() {
            return Ok(());
        }
        self.schema_name_collections
            .entry(sql_id)
            .or_insert_with(|| HnswIndex::new(self.hnsw_config()))
            .insert(node_id, name_vector)?;
        self.schema_desc_collections
            .entry(sql_id)
            .or_insert_with(|| HnswIndex::new(self.hnsw_config()))
            .insert(node_id, description_vector)
    }

    pub fn delete_sql_schema_vectors(&self, sql_id: i64) {
        self.schema_name_collections.remove(&sql_id);
        self.schema_desc_collections.remove(&sql_id);
    }

    /// Ranks schema-graph nodes by a weighted combination of name-axis and
    /// description-axis cosine similarity. Both axes are converted from
    /// distance (`0` identical) to similarity (`1` identical) before fusion.
    pub fn search_schema_nodes(
        &self,
        sql_id: i64,
        query: &[f32],
        k: usize,
        name_weight: f64,
        description_weight: f64,
    ) -> Vec<(VectorId, f64)> {
        if !self.enabled() {
            return Vec::new();
        }
        let candidate_pool = k.max(1) * 4;
        let name_hits: std::collections::HashMap<VectorId, f64> = self
            .schema_name_collections
            .get(&sql_id)
            .map(|index| index.search(query, candidate_pool, None))
            .unwrap_or_default()
            .into_iter()
            .map(|(id, dist)| (id, 1.0 - dist))
            .collect();
        let desc_hits: std::collections::HashMap<VectorId, f64> = self
            .schema_desc_collections
            .get(&sql_id)
            .map(|index| index.search(query, candidate_pool, None))
            .unwrap_or_default()
            .into_iter()
            .map(|(id, dist)| (id, 1.0 - dist))
            .collect();

        let mut node_ids: std::collections::HashSet<VectorId> = name_hits.keys().copied().collect();
        node_ids.extend(desc_hits.keys().copied());

        let mut ranked: Vec<(VectorId, f64)> = node_ids
            .into_iter()
            .map(|id| {
                let score = name_weight * name_hits.get(&id).copied().unwrap_or(0.0)
                    + description_weight * desc_hits.get(&id).copied().unwrap_or(0.0);
                (id, score)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(k);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_config() -> VectorConfig {
        VectorConfig { enabled: true, embedding_dim: 3, hnsw_max_neighbors: 8, hnsw_ef_construction: 100 }
    }

    #[test]
    fn disabled_store_is_a_no_op() {
        let store = VectorStore::new(VectorConfig { enabled: false, ..enabled_config() });
        store.upsert_chunk_vector(1, 1, 1, &[1.0, 0.0, 0.0]).unwrap();
        assert!(store.search_document_chunks(1, 1, &[1.0, 0.0, 0.0], 5).is_empty());
    }

    #[test]
    fn chunk_vectors_are_scoped_per_file() {
        let store = VectorStore::new(enabled_config());
        store.upsert_chunk_vector(1, 10, 1, &[1.0, 0.0, 0.0]).unwrap();
        store.upsert_chunk_vector(1, 20, 2, &[0.0, 1.0, 0.0]).unwrap();
        let hits = store.search_document_chunks(1, 10, &[1.0, 0.0, 0.0], 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 1);
    }

    #[test]
    fn delete_file_partition_clears_its_vectors() {
        let store = VectorStore::new(enabled_config());
        store.upsert_chunk_vector(1, 10, 1, &[1.0, 0.0, 0.0]).unwrap();
        store.delete_file_partition(1, 10);
        assert!(store.search_document_chunks(1, 10, &[1.0, 0.0, 0.0], 5).is_empty());
    }

    #[test]
    fn search_knowledge_base_merges_across_files() {
        let store = VectorStore::new(enabled_config());
        store.upsert_chunk_vector(1, 10, 1, &[1.0, 0.0, 0.0]).unwrap();
        store.upsert_chunk_vector(1, 20, 2, &[0.0, 1.0, 0.0]).unwrap();
        let hits = store.search_knowledge_base(1, &[1.0, 0.0, 0.0], 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].1, 1);
    }

    #[test]
    fn schema_node_ranker_fuses_both_axes() {
        let store = VectorStore::new(enabled_config());
        store
            .upsert_schema_node_vectors(1, 100, &[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0])
            .unwrap();
        store
            .upsert_schema_node_vectors(1, 200, &[0.0, 1.0, 0.0], &[1.0, 0.0, 0.0])
            .unwrap();
        // Query matches node 100's name axis and node 200's description axis equally;
        // a name-weighted search should favor node 100.
        let ranked = store.search_schema_nodes(1, &[1.0, 0.0, 0.0], 2, 0.8, 0.2);
        assert_eq!(ranked[0].0, 100);
    }

    #[test]
    fn delete_sql_schema_vectors_clears_both_axes() {
        let store = VectorStore::new(enabled_config());
        store.upsert_schema_node_vectors(1, 100, &[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]).unwrap();
        store.delete_sql_schema_vectors(1);
        assert!(store.search_schema_nodes(1, &[1.0, 0.0, 0.0], 5, 0.5, 0.5).is_empty());
    }
}
