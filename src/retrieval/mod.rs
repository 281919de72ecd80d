//! Unified search surface (C5).
//!
//! Fans a single query out across C2 (document vectors), C3 (hybrid text +
//! vector) and C4 (graph) without merging ranks across engines — each
//! engine's results come back as their own list with a uniform item shape,
//! tagged by `search_engine` so a caller can tell them apart.

use crate::catalog::models::Visibility;
use crate::catalog::Catalog;
use crate::error::AppResult;
use crate::graph::GraphStore;
use crate::inverted::InvertedIndex;
use crate::llm::{ChatMessage, LlmClient};
use crate::vector::VectorStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEngine {
    Vector,
    Hybrid,
    Graph,
}

impl SearchEngine {
    fn as_str(self) -> &'static str {
        match self {
            SearchEngine::Vector => "vector",
            SearchEngine::Hybrid => "elasticsearch",
            SearchEngine::Graph => "graph_data",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedItem {
    pub title: String,
    pub content: String,
    pub score: f64,
    pub source: String,
    pub search_engine: &'static str,
    pub metadata: serde_json::Value,
    pub file_detail: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub query_text: &'a str,
    pub kb_id: i64,
    pub caller_id: i64,
    pub top_k: usize,
}

#[derive(Default)]
pub struct SearchResults {
    pub vector: Vec<RetrievedItem>,
    pub hybrid: Vec<RetrievedItem>,
    pub graph: Vec<RetrievedItem>,
}

pub struct RetrievalOrchestrator {
    catalog: Arc<Catalog>,
    vector_store: Arc<VectorStore>,
    inverted_index: Arc<InvertedIndex>,
    graph_store: Arc<GraphStore>,
    llm: Arc<dyn LlmClient>,
}

impl RetrievalOrchestrator {
    pub fn new(
        catalog: Arc<Catalog>,
        vector_store: Arc<VectorStore>,
        inverted_index: Arc<InvertedIndex>,
        graph_store: Arc<GraphStore>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        RetrievalOrchestrator { catalog, vector_store, inverted_index, graph_store, llm }
    }

    /// Step 1: owner of the KB sees private + public content; anyone else
    /// sees only public content.
    fn is_owner(&self, kb_id: i64, caller_id: i64) -> AppResult<bool> {
        let kb = self.catalog.get_knowledge_base(kb_id)?;
        Ok(kb.owner_id == caller_id)
    }

    pub async fn search(&self, request: SearchRequest<'_>) -> AppResult<SearchResults> {
        let is_owner = self.is_owner(request.kb_id, request.caller_id)?;
        let embedding = self.llm.embed(request.query_text).await?;

        let vector_fut = async { self.search_vector(request.kb_id, &embedding, request.top_k) };
        let hybrid_fut = async {
            self.search_hybrid(request.kb_id, request.query_text, &embedding, request.top_k, is_owner)
        };
        let graph_fut = self.search_graph(request, is_owner);

        let (vector, hybrid, graph) = tokio::join!(vector_fut, hybrid_fut, graph_fut);

        Ok(SearchResults { vector, hybrid, graph: graph? })
    }

    fn search_vector(&self, kb_id: i64, embedding: &[f32], top_k: usize) -> Vec<RetrievedItem> {
        self.vector_store
            .search_knowledge_base(kb_id, embedding, top_k)
            .into_iter()
            .map(|(file_id, chunk_id, score)| RetrievedItem {
                title: format!("file {file_id}"),
                content: String::new(),
                score,
                source: format!("file:{file_id}"),
                search_engine: SearchEngine::Vector.as_str(),
                metadata: serde_json::json!({ "kb_id": kb_id, "file_id": file_id, "chunk_id": chunk_id }),
                file_detail: None,
            })
            .collect()
    }

    fn search_hybrid(
        &self,
        kb_id: i64,
        query_text: &str,
        embedding: &[f32],
        top_k: usize,
        is_owner: bool,
    ) -> Vec<RetrievedItem> {
        self.inverted_index
            .hybrid_search(kb_id, query_text, embedding, top_k, is_owner)
            .into_iter()
            .map(|hit| RetrievedItem {
                title: hit.parent_title.clone().unwrap_or_default(),
                content: hit.content,
                score: hit.score,
                source: format!("doc:{}", hit.doc_id),
                search_engine: SearchEngine::Hybrid.as_str(),
                metadata: serde_json::json!({
                    "doc_id": hit.doc_id,
                    "is_parent_doc": hit.is_parent_doc,
                    "full_content_length": hit.full_content_length,
                }),
                file_detail: hit.parent_summary.map(|s| serde_json::json!({ "summary": s })),
            })
            .collect()
    }

    /// Step 5: extract entities/keywords via an LLM agent, match by name
    /// against graph nodes, then do a 1-hop neighbourhood expansion per
    /// match with a visibility filter, scored by term overlap with the
    /// query.
    async fn search_graph(
        &self,
        request: SearchRequest<'_>,
        is_owner: bool,
    ) -> AppResult<Vec<RetrievedItem>> {
        if !self.graph_store.enabled() {
            return Ok(Vec::new());
        }
        let terms = self.extract_entities(request.query_text).await?;
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let matches = self.graph_store.find_nodes_by_name(Some(request.kb_id), &terms);

        let mut items = Vec::new();
        for matched in matches {
            let neighbours = self.graph_store.neighbourhood(&matched.node_id, is_owner);
            for neighbour in neighbours {
                let score = term_overlap_score(&terms, &neighbour.name, neighbour.description.as_deref());
                items.push(RetrievedItem {
                    title: neighbour.name.clone(),
                    content: neighbour.description.clone().unwrap_or_default(),
                    score,
                    source: neighbour.source_id.clone().unwrap_or_else(|| neighbour.node_id.clone()),
                    search_engine: SearchEngine::Graph.as_str(),
                    metadata: serde_json::json!({
                        "node_id": neighbour.node_id,
                        "matched_from": matched.node_id,
                        "label": format!("{:?}", neighbour.label),
                        "file_id": neighbour.file_id,
                    }),
                    file_detail: None,
                });
            }
        }
        items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        items.truncate(request.top_k);
        Ok(items)
    }

    async fn extract_entities(&self, query_text: &str) -> AppResult<Vec<String>> {
        let prompt = format!(
            "Extract the key entities and keywords from this query as a comma-separated list, nothing else:\n{query_text}"
        );
        let reply = self.llm.chat(&[ChatMessage::user(prompt)]).await?;
        Ok(reply
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }
}

fn term_overlap_score(terms: &[String], name: &str, description: Option<&str>) -> f64 {
    let haystack = format!("{name} {}", description.unwrap_or_default()).to_lowercase();
    let hits = terms.iter().filter(|t| haystack.contains(&t.to_lowercase())).count();
    if terms.is_empty() {
        0.0
    } else {
        hits as f64 / terms.len() as f64
    }
}

#[allow(dead_code)]
fn visibility_allows(visibility: Option<Visibility>, is_owner: bool) -> bool {
    is_owner || !matches!(visibility, Some(Visibility::Private))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::{InvertedConfig, VectorConfig};
    use crate::graph::{GraphNode, NodeLabel};
    use crate::llm::MockLlmClient;

    fn test_catalog() -> Catalog {
        Catalog::open_in_memory().unwrap()
    }

    fn orchestrator(catalog: Catalog) -> RetrievalOrchestrator {
        let vector_store = VectorStore::new(VectorConfig {
            enabled: true,
            embedding_dim: 8,
            hnsw_max_neighbors: 8,
            hnsw_ef_construction: 100,
        });
        let inverted_index = InvertedIndex::new(InvertedConfig {
            enabled: true,
            child_chunk_size: 1024,
            chunk_overlap: 128,
            rrf_k: 60,
        });
        let graph_store = GraphStore::new(true);
        RetrievalOrchestrator::new(
            Arc::new(catalog),
            Arc::new(vector_store),
            Arc::new(inverted_index),
            Arc::new(graph_store),
            Arc::new(MockLlmClient::new(8)),
        )
    }

    #[tokio::test]
    async fn search_returns_per_engine_lists() {
        let catalog = test_catalog();
        let uid = catalog.register_user("alice", "pw").unwrap();
        let kb_id = catalog.create_knowledge_base(uid, "kb", None).unwrap();
        let orchestrator = orchestrator(catalog);

        orchestrator.graph_store.create_node(GraphNode {
            node_id: "n1".into(),
            label: NodeLabel::Entity,
            name: "revenue".into(),
            description: Some("total revenue".into()),
            sql_id: None,
            table_id: None,
            table_name: None,
            column_name: None,
            source_id: None,
            kb_id: Some(kb_id),
            file_id: None,
            owner_id: Some(uid),
            visibility: None,
        });

        let results = orchestrator
            .search(SearchRequest { query_text: "revenue", kb_id, caller_id: uid, top_k: 5 })
            .await
            .unwrap();
        assert!(results.vector.is_empty());
        assert!(results.hybrid.is_empty());
    }

    #[test]
    fn term_overlap_rewards_matching_terms() {
        let terms = vec!["revenue".to_string(), "region".to_string()];
        let high = term_overlap_score(&terms, "revenue by region", None);
        let low = term_overlap_score(&terms, "unrelated", None);
        assert!(high > low);
    }

    #[test]
    fn visibility_allows_public_for_non_owner() {
        assert!(visibility_allows(Some(Visibility::Public), false));
        assert!(!visibility_allows(Some(Visibility::Private), false));
        assert!(visibility_allows(Some(Visibility::Private), true));
    }
}
