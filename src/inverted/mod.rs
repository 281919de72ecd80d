//! Inverted (hybrid text + vector) index backend (C3)
//!
//! One `knowledge_base` document store, partitioned by `knowledge_id`
//! (equal to the owning KB id). Every parent document is split into
//! overlapping child chunks (see [`chunking`]); each child carries its own
//! title/content vectors plus a bag-of-words posting used for lexical
//! search. Hybrid search fuses the lexical ranking with the two vector
//! rankings by Reciprocal Rank Fusion.

mod chunking;

pub use chunking::{split_into_child_spans, TextSpan};

use crate::catalog::models::Visibility;
use crate::config::InvertedConfig;
use crate::vector::{HnswConfig, HnswIndex};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocType {
    Parent,
    Child,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentDoc {
    pub id: i64,
    pub knowledge_id: i64,
    pub file_id: i64,
    pub owner_id: i64,
    pub visibility: Visibility,
    pub title: String,
    pub summary: String,
    pub full_content_length: usize,
    pub total_chunks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildDoc {
    pub id: i64,
    pub knowledge_id: i64,
    pub file_id: i64,
    pub owner_id: i64,
    pub visibility: Visibility,
    pub parent_id: i64,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildInsert {
    pub content: String,
    pub title_vector: Vec<f32>,
    pub content_vector: Vec<f32>,
}

/// One hit from [`InvertedIndex::hybrid_search`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_id: i64,
    pub is_parent_doc: bool,
    pub content: String,
    pub score: f64,
    pub parent_title: Option<String>,
    pub parent_summary: Option<String>,
    pub full_content_length: Option<usize>,
}

struct Partition {
    parents: HashMap<i64, ParentDoc>,
    children: HashMap<i64, ChildDoc>,
    postings: HashMap<String, HashMap<i64, u32>>,
    doc_lengths: HashMap<i64, usize>,
    title_vectors: HnswIndex,
    content_vectors: HnswIndex,
}

impl Partition {
    fn new(hnsw_config: HnswConfig) -> Self {
        Partition {
            parents: HashMap::new(),
            children: HashMap::new(),
            postings: HashMap::new(),
            doc_lengths: HashMap::new(),
            title_vectors: HnswIndex::new(hnsw_config),
            content_vectors: HnswIndex::new(hnsw_config),
        }
    }
}

pub struct InvertedIndex {
    config: InvertedConfig,
    partitions: DashMap<i64, RwLock<Partition>>,
    next_id: AtomicI64,
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

impl InvertedIndex {
    pub fn new(config: InvertedConfig) -> Self {
        InvertedIndex { config, partitions: DashMap::new(), next_id: AtomicI64::new(1) }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn child_chunk_size(&self) -> usize {
        self.config.child_chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.config.chunk_overlap
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn hnsw_config(&self) -> HnswConfig {
        HnswConfig {
            m: 16,
            ef_construction: 200,
            ef_search: 100,
            metric: crate::vector::DistanceMetric::Cosine,
        }
    }

    /// Inserts a parent document and its pre-chunked, pre-embedded children
    /// atomically within this index. The caller is responsible for
    /// deleting the parent if an upstream bulk insert into a sibling store
    /// (e.g. the catalog) fails after this call.
    pub fn insert_document(
        &self,
        knowledge_id: i64,
        file_id: i64,
        owner_id: i64,
        visibility: Visibility,
        title: &str,
        summary: &str,
        full_content_length: usize,
        children: Vec<ChildInsert>,
    ) -> i64 {
        let parent_id = self.next_id();
        let total_chunks = children.len();
        let parent = ParentDoc {
            id: parent_id,
            knowledge_id,
            file_id,
            owner_id,
            visibility,
            title: title.to_string(),
            summary: summary.to_string(),
            full_content_length,
            total_chunks,
        };

        let partition = self
            .partitions
            .entry(knowledge_id)
            .or_insert_with(|| RwLock::new(Partition::new(self.hnsw_config())));
        let mut partition = partition.write();
        partition.parents.insert(parent_id, parent);

        for (idx, child) in children.into_iter().enumerate() {
            let child_id = self.next_id();
            let doc = ChildDoc {
                id: child_id,
                knowledge_id,
                file_id,
                owner_id,
                visibility,
                parent_id,
                chunk_index: idx,
                total_chunks,
                content: child.content.clone(),
            };
            for token in tokenize(&format!("{title} {} {}", child.content, summary)) {
                *partition.postings.entry(token).or_default().entry(child_id).or_insert(0) += 1;
            }
            partition.doc_lengths.insert(child_id, child.content.len());
            let _ = partition.title_vectors.insert(child_id as u64, &child.title_vector);
            let _ = partition.content_vectors.insert(child_id as u64, &child.content_vector);
            partition.children.insert(child_id, doc);
        }

        parent_id
    }

    pub fn delete_by_file_id(&self, knowledge_id: i64, file_id: i64) {
        if let Some(partition) = self.partitions.get(&knowledge_id) {
            let mut partition = partition.write();
            let parent_ids: Vec<i64> = partition
                .parents
                .values()
                .filter(|p| p.file_id == file_id)
                .map(|p| p.id)
                .collect();
            let child_ids: Vec<i64> = partition
                .children
                .values()
                .filter(|c| c.file_id == file_id)
                .map(|c| c.id)
                .collect();
            for id in &child_ids {
                partition.children.remove(id);
                partition.doc_lengths.remove(id);
                partition.title_vectors.delete(*id as u64);
                partition.content_vectors.delete(*id as u64);
            }
            for postings in partition.postings.values_mut() {
                for id in &child_ids {
                    postings.remove(id);
                }
            }
            for id in &parent_ids {
                partition.parents.remove(id);
            }
        }
    }

    pub fn delete_by_knowledge_id(&self, knowledge_id: i64) {
        self.partitions.remove(&knowledge_id);
    }

    fn text_ranking(&self, partition: &Partition, query: &str, limit: usize, is_owner: bool) -> Vec<(i64, f64)> {
        let tokens = tokenize(query);
        let mut scores: HashMap<i64, f64> = HashMap::new();
        for token in &tokens {
            if let Some(postings) = partition.postings.get(token) {
                for (&doc_id, &count) in postings {
                    if Self::passes_filter(partition, doc_id, is_owner) {
                        *scores.entry(doc_id).or_insert(0.0) += count as f64;
                    }
                }
            }
        }
        let mut ranked: Vec<(i64, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);
        ranked
    }

    fn passes_filter(partition: &Partition, doc_id: i64, is_owner: bool) -> bool {
        partition
            .children
            .get(&doc_id)
            .map(|child| is_owner || child.visibility == Visibility::Public)
            .unwrap_or(false)
    }

    /// Lexical ranking plus two vector rankings (title, content), fused by
    /// Reciprocal Rank Fusion. `is_owner` controls whether private children
    /// are eligible.
    pub fn hybrid_search(
        &self,
        knowledge_id: i64,
        query_text: &str,
        query_vector: &[f32],
        size: usize,
        is_owner: bool,
    ) -> Vec<SearchHit> {
        if !self.enabled() {
            return Vec::new();
        }
        let Some(partition) = self.partitions.get(&knowledge_id) else {
            return Vec::new();
        };
        let partition = partition.read();

        let knn_k = 2 * size;
        let candidate_pool = knn_k.max(1) * 2;

        let text_ranked = self.text_ranking(&partition, query_text, candidate_pool, is_owner);
        let title_ranked: Vec<(i64, f64)> = partition
            .title_vectors
            .search(query_vector, knn_k, None)
            .into_iter()
            .map(|(id, dist)| (id as i64, dist))
            .filter(|(id, _)| Self::passes_filter(&partition, *id, is_owner))
            .collect();
        let content_ranked: Vec<(i64, f64)> = partition
            .content_vectors
            .search(query_vector, knn_k, None)
            .into_iter()
            .map(|(id, dist)| (id as i64, dist))
            .filter(|(id, _)| Self::passes_filter(&partition, *id, is_owner))
            .collect();

        let k = self.config.rrf_k as f64;
        let mut fused: HashMap<i64, f64> = HashMap::new();
        for ranking in [&text_ranked, &title_ranked, &content_ranked] {
            for (rank, (doc_id, _)) in ranking.iter().enumerate() {
                *fused.entry(*doc_id).or_insert(0.0) += 1.0 / (k + (rank + 1) as f64);
            }
        }

        let mut ranked: Vec<(i64, f64)> = fused.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(size);

        let mut hits: Vec<SearchHit> = ranked
            .into_iter()
            .filter_map(|(doc_id, score)| {
                let child = partition.children.get(&doc_id)?;
                let parent = partition.parents.get(&child.parent_id);
                Some(SearchHit {
                    doc_id,
                    is_parent_doc: false,
                    content: child.content.clone(),
                    score,
                    parent_title: parent.map(|p| p.title.clone()),
                    parent_summary: parent.map(|p| p.summary.clone()),
                    full_content_length: parent.map(|p| p.full_content_length),
                })
            })
            .collect();

        if hits.len() < size {
            let have: std::collections::HashSet<i64> = hits.iter().map(|h| h.doc_id).collect();
            let need = size - hits.len();
            let mut parent_fill: Vec<&ParentDoc> = partition
                .parents
                .values()
                .filter(|p| (is_owner || p.visibility == Visibility::Public) && !have.contains(&p.id))
                .collect();
            parent_fill.sort_by_key(|p| p.id);
            for parent in parent_fill.into_iter().take(need) {
                hits.push(SearchHit {
                    doc_id: parent.id,
                    is_parent_doc: true,
                    content: parent.summary.clone(),
                    score: 0.0,
                    parent_title: Some(parent.title.clone()),
                    parent_summary: Some(parent.summary.clone()),
                    full_content_length: Some(parent.full_content_length),
                });
            }
        }

        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> InvertedConfig {
        InvertedConfig { enabled: true, child_chunk_size: 1024, chunk_overlap: 128, rrf_k: 60 }
    }

    fn child(content: &str, title_vec: [f32; 3], content_vec: [f32; 3]) -> ChildInsert {
        ChildInsert {
            content: content.to_string(),
            title_vector: title_vec.to_vec(),
            content_vector: content_vec.to_vec(),
        }
    }

    #[test]
    fn insert_and_text_search_finds_lexical_match() {
        let index = InvertedIndex::new(config());
        index.insert_document(
            1,
            10,
            100,
            Visibility::Public,
            "Quarterly Report",
            "summary",
            200,
            vec![child("revenue grew substantially", [1.0, 0.0, 0.0], [1.0, 0.0, 0.0])],
        );
        let hits = index.hybrid_search(1, "revenue", &[1.0, 0.0, 0.0], 5, true);
        assert!(!hits.is_empty());
        assert!(hits[0].content.contains("revenue"));
    }

    #[test]
    fn private_docs_hidden_from_non_owner() {
        let index = InvertedIndex::new(config());
        index.insert_document(
            1,
            10,
            100,
            Visibility::Private,
            "Secret",
            "summary",
            50,
            vec![child("classified content", [1.0, 0.0, 0.0], [1.0, 0.0, 0.0])],
        );
        let hits = index.hybrid_search(1, "classified", &[1.0, 0.0, 0.0], 5, false);
        assert!(hits.is_empty());
    }

    #[test]
    fn delete_by_file_id_removes_parent_and_children() {
        let index = InvertedIndex::new(config());
        index.insert_document(
            1,
            10,
            100,
            Visibility::Public,
            "Doc",
            "summary",
            50,
            vec![child("alpha beta gamma", [1.0, 0.0, 0.0], [1.0, 0.0, 0.0])],
        );
        index.delete_by_file_id(1, 10);
        let hits = index.hybrid_search(1, "alpha", &[1.0, 0.0, 0.0], 5, true);
        assert!(hits.is_empty());
    }

    #[test]
    fn tops_up_with_parent_docs_when_children_are_scarce() {
        let index = InvertedIndex::new(config());
        index.insert_document(1, 10, 100, Visibility::Public, "Only Doc", "summary text", 50, vec![]);
        let hits = index.hybrid_search(1, "nonexistent query", &[1.0, 0.0, 0.0], 3, true);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].is_parent_doc);
    }

    #[test]
    fn disabled_index_returns_empty() {
        let index = InvertedIndex::new(InvertedConfig { enabled: false, ..config() });
        index.insert_document(1, 10, 100, Visibility::Public, "Doc", "s", 10, vec![]);
        assert!(index.hybrid_search(1, "doc", &[1.0, 0.0, 0.0], 5, true).is_empty());
    }
}
