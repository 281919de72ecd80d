//! Property graph store (C4)
//!
//! Node creation is idempotent on `node_id`. Two graph "shapes" share this
//! store: document graphs (chunks referencing each other via `source_id`)
//! and schema graphs (one per SQL database, built by
//! [`build_schema_graph`]). There is no external graph database dependency
//! here — the store is an in-memory labeled property graph behind a
//! [`DashMap`], in the same spirit as the vector index's per-partition
//! `HnswIndex` maps.

use crate::catalog::models::{AnaType, ColSql, RelSql, SchemaAnalysisResult, SchemaElement, TableSql, Visibility};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeLabel {
    Entity,
    Attribute,
    UniqueIdentifier,
    Metric,
    DocumentChunk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationLabel {
    HasAttribute,
    HasIdentifier,
    HasMetric,
    References,
    ReferencedBy,
    Mentions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub node_id: String,
    pub label: NodeLabel,
    pub name: String,
    pub description: Option<String>,
    /// `Some` for schema-graph nodes.
    pub sql_id: Option<i64>,
    pub table_id: Option<i64>,
    pub table_name: Option<String>,
    pub column_name: Option<String>,
    /// `Some` for document-graph nodes; lets `drop_by_source_id` find every
    /// node whose provenance mentions a given chunk id.
    pub source_id: Option<String>,
    pub kb_id: Option<i64>,
    pub file_id: Option<i64>,
    pub owner_id: Option<i64>,
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphRelation {
    pub from: String,
    pub to: String,
    pub label: RelationLabel,
    pub from_column: Option<String>,
    pub to_column: Option<String>,
    pub from_table_id: Option<i64>,
    pub to_table_id: Option<i64>,
}

pub struct GraphStore {
    enabled: bool,
    nodes: DashMap<String, GraphNode>,
    relations: RwLock<Vec<GraphRelation>>,
}

impl GraphStore {
    pub fn new(enabled: bool) -> Self {
        GraphStore { enabled, nodes: DashMap::new(), relations: RwLock::new(Vec::new()) }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Idempotent on `node_id`: re-creating an existing node overwrites its
    /// fields rather than duplicating it.
    pub fn create_node(&self, node: GraphNode) {
        if !self.enabled {
            return;
        }
        self.nodes.insert(node.node_id.clone(), node);
    }

    pub fn create_relation(&self, relation: GraphRelation) {
        if !self.enabled {
            return;
        }
        let mut relations = self.relations.write();
        let exists = relations.iter().any(|r| {
            r.from == relation.from && r.to == relation.to && r.label == relation.label
        });
        if !exists {
            relations.push(relation);
        }
    }

    pub fn get_node(&self, node_id: &str) -> Option<GraphNode> {
        self.nodes.get(node_id).map(|n| n.clone())
    }

    /// Nodes reachable from `node_id` by an outgoing relation with the
    /// given label, or by any label if `None`. A minimal stand-in for a
    /// one-hop Cypher `MATCH (a)-[r]->(b)` query.
    pub fn traverse_out(&self, node_id: &str, label: Option<RelationLabel>) -> Vec<GraphNode> {
        if !self.enabled {
            return Vec::new();
        }
        self.relations
            .read()
            .iter()
            .filter(|r| r.from == node_id && label.map(|l| l == r.label).unwrap_or(true))
            .filter_map(|r| self.get_node(&r.to))
            .collect()
    }

    pub fn traverse_in(&self, node_id: &str, label: Option<RelationLabel>) -> Vec<GraphNode> {
        if !self.enabled {
            return Vec::new();
        }
        self.relations
            .read()
            .iter()
            .filter(|r| r.to == node_id && label.map(|l| l == r.label).unwrap_or(true))
            .filter_map(|r| self.get_node(&r.from))
            .collect()
    }

    pub fn nodes_by_sql_id(&self, sql_id: i64) -> Vec<GraphNode> {
        self.nodes.iter().filter(|n| n.sql_id == Some(sql_id)).map(|n| n.clone()).collect()
    }

    /// Case-insensitive substring match of `terms` against node names,
    /// optionally scoped to one knowledge base. Used by the retrieval
    /// orchestrator's entity-resolution step.
    pub fn find_nodes_by_name(&self, kb_id: Option<i64>, terms: &[String]) -> Vec<GraphNode> {
        if !self.enabled || terms.is_empty() {
            return Vec::new();
        }
        let lowered: Vec<String> = terms.iter().map(|t| t.to_lowercase()).collect();
        self.nodes
            .iter()
            .filter(|n| kb_id.map(|id| n.kb_id == Some(id)).unwrap_or(true))
            .filter(|n| {
                let name = n.name.to_lowercase();
                lowered.iter().any(|t| name.contains(t.as_str()))
            })
            .map(|n| n.clone())
            .collect()
    }

    /// One-hop neighbourhood of `node_id` (both directions), filtered so a
    /// non-owner only sees public nodes. Nodes with no visibility recorded
    /// (schema-graph nodes) are always visible.
    pub fn neighbourhood(&self, node_id: &str, is_owner: bool) -> Vec<GraphNode> {
        if !self.enabled {
            return Vec::new();
        }
        let mut neighbours = self.traverse_out(node_id, None);
        neighbours.extend(self.traverse_in(node_id, None));
        neighbours.retain(|n| is_owner || !matches!(n.visibility, Some(Visibility::Private)));
        neighbours
    }

    /// Drops every node and incident relation whose `source_id` contains
    /// `chunk_id` — used by the document-file delete cascade.
    pub fn drop_by_source_id_containing(&self, chunk_id: &str) {
        let to_drop: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| n.source_id.as_deref().map(|s| s.contains(chunk_id)).unwrap_or(false))
            .map(|n| n.node_id.clone())
            .collect();
        for node_id in &to_drop {
            self.nodes.remove(node_id);
        }
        self.relations
            .write()
            .retain(|r| !to_drop.contains(&r.from) && !to_drop.contains(&r.to));
    }

    /// Drops every schema node for `sql_id` and all relations incident on
    /// them — used when a SQL connection is removed.
    pub fn drop_by_sql_id(&self, sql_id: i64) {
        let to_drop: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| n.sql_id == Some(sql_id))
            .map(|n| n.node_id.clone())
            .collect();
        for node_id in &to_drop {
            self.nodes.remove(node_id);
        }
        self.relations
            .write()
            .retain(|r| !to_drop.contains(&r.from) && !to_drop.contains(&r.to));
    }
}

fn entity_node_id(table_id: i64, entity_name: &str) -> String {
    format!("{table_id}_{entity_name}")
}

fn attribute_node_id(table_id: i64, col_name: &str) -> String {
    format!("{table_id}_{col_name}")
}

/// Per-column role assigned during schema analysis, resolved from a
/// table's [`SchemaAnalysisResult`] (falling back to `ana_type` for columns
/// no analysis pass has covered yet).
fn column_role(
    analysis: Option<&SchemaAnalysisResult>,
    col: &ColSql,
) -> (NodeLabel, RelationLabel, Option<String>) {
    let from_elements = analysis.and_then(|a| {
        a.elements.iter().find_map(|e| match e {
            SchemaElement::UniqueIdentifier { column, description, .. } if column == &col.column_name => {
                Some((NodeLabel::UniqueIdentifier, RelationLabel::HasIdentifier, Some(description.clone())))
            }
            SchemaElement::Metric { column, description, .. } if column == &col.column_name => {
                Some((NodeLabel::Metric, RelationLabel::HasMetric, Some(description.clone())))
            }
            SchemaElement::Attribute { column, description, .. } if column == &col.column_name => {
                Some((NodeLabel::Attribute, RelationLabel::HasAttribute, Some(description.clone())))
            }
            _ => None,
        })
    });
    from_elements.unwrap_or_else(|| match col.ana_type {
        AnaType::Numeric => (NodeLabel::Metric, RelationLabel::HasMetric, col.comment.clone()),
        _ => (NodeLabel::Attribute, RelationLabel::HasAttribute, col.comment.clone()),
    })
}

/// Builds (or rebuilds) the schema graph for one SQL database, per the
/// four-step construction algorithm: entity + attribute/identifier/metric
/// nodes, `HAS_*` edges from entity to child, then `REFERENCES` /
/// `REFERENCED_BY` edges for every foreign key whose both endpoints exist.
/// Node roles come from `analyses` (the schema-analysis pass's
/// [`SchemaElement`] classification) where available; a column with no
/// matching analysis entry falls back to its `ana_type`.
pub fn build_schema_graph(
    store: &GraphStore,
    sql_id: i64,
    tables: &[(TableSql, Vec<ColSql>)],
    analyses: &[SchemaAnalysisResult],
    relations: &[RelSql],
) {
    if !store.enabled() {
        return;
    }
    store.drop_by_sql_id(sql_id);

    for (table, columns) in tables {
        let analysis = analyses.iter().find(|a| a.table_id == table.id);
        let entity_description = analysis
            .and_then(|a| {
                a.elements.iter().find_map(|e| match e {
                    SchemaElement::Entity { description, .. } => Some(description.clone()),
                    _ => None,
                })
            })
            .or_else(|| table.description.clone());

        let entity_id = entity_node_id(table.id, &table.table_name);
        store.create_node(GraphNode {
            node_id: entity_id.clone(),
            label: NodeLabel::Entity,
            name: table.table_name.clone(),
            description: entity_description,
            sql_id: Some(sql_id),
            table_id: Some(table.id),
            table_name: Some(table.table_name.clone()),
            column_name: None,
            source_id: None,
            kb_id: None,
            file_id: None,
            owner_id: None,
            visibility: None,
        });

        for col in columns {
            let attr_id = attribute_node_id(table.id, &col.column_name);
            let (label, relation_label, description) = column_role(analysis, col);
            store.create_node(GraphNode {
                node_id: attr_id.clone(),
                label,
                name: col.column_name.clone(),
                description,
                sql_id: Some(sql_id),
                table_id: Some(table.id),
                table_name: Some(table.table_name.clone()),
                column_name: Some(col.column_name.clone()),
                source_id: None,
                kb_id: None,
                file_id: None,
                owner_id: None,
                visibility: None,
            });
            store.create_relation(GraphRelation {
                from: entity_id.clone(),
                to: attr_id.clone(),
                label: relation_label,
                from_column: None,
                to_column: Some(col.column_name.clone()),
                from_table_id: Some(table.id),
                to_table_id: Some(table.id),
            });
        }
    }

    for rel in relations {
        let Some(from_table) = tables.iter().find(|(t, _)| t.table_name == rel.from_table) else { continue };
        let Some(to_table) = tables.iter().find(|(t, _)| t.table_name == rel.to_table) else { continue };
        let from_attr = attribute_node_id(from_table.0.id, &rel.from_column);
        let to_attr = attribute_node_id(to_table.0.id, &rel.to_column);
        if store.get_node(&from_attr).is_none() || store.get_node(&to_attr).is_none() {
            continue;
        }
        let from_entity = entity_node_id(from_table.0.id, &from_table.0.table_name);
        let to_entity = entity_node_id(to_table.0.id, &to_table.0.table_name);
        store.create_relation(GraphRelation {
            from: from_entity,
            to: to_entity,
            label: RelationLabel::References,
            from_column: Some(rel.from_column.clone()),
            to_column: Some(rel.to_column.clone()),
            from_table_id: Some(from_table.0.id),
            to_table_id: Some(to_table.0.id),
        });
        store.create_relation(GraphRelation {
            from: from_attr,
            to: to_attr,
            label: RelationLabel::ReferencedBy,
            from_column: Some(rel.from_column.clone()),
            to_column: Some(rel.to_column.clone()),
            from_table_id: Some(from_table.0.id),
            to_table_id: Some(to_table.0.id),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(id: i64, name: &str) -> TableSql {
        TableSql { id, sql_id: 1, table_name: name.to_string(), description: None }
    }

    fn col(id: i64, table_id: i64, name: &str, ana_type: AnaType) -> ColSql {
        ColSql { id, table_id, column_name: name.to_string(), column_type: "text".into(), comment: None, ana_type }
    }

    #[test]
    fn create_node_is_idempotent() {
        let store = GraphStore::new(true);
        let node = GraphNode {
            node_id: "1_orders".into(),
            label: NodeLabel::Entity,
            name: "orders".into(),
            description: None,
            sql_id: Some(1),
            table_id: Some(1),
            table_name: Some("orders".into()),
            column_name: None,
            source_id: None,
            kb_id: None,
            file_id: None,
            owner_id: None,
            visibility: None,
        };
        store.create_node(node.clone());
        store.create_node(node);
        assert_eq!(store.nodes_by_sql_id(1).len(), 1);
    }

    fn identifier_analysis(sql_id: i64, table_id: i64, column: &str) -> SchemaAnalysisResult {
        SchemaAnalysisResult {
            sql_id,
            table_id,
            elements: vec![SchemaElement::UniqueIdentifier {
                name: column.to_string(),
                description: "row identifier".into(),
                column: column.to_string(),
            }],
        }
    }

    #[test]
    fn build_schema_graph_wires_attributes_and_references() {
        let store = GraphStore::new(true);
        let orders = (table(1, "orders"), vec![col(1, 1, "customer_id", AnaType::Attribute)]);
        let customers = (table(2, "customers"), vec![col(2, 2, "id", AnaType::Attribute)]);
        let rel = RelSql { id: 1, sql_id: 1, from_table: "orders".into(), from_column: "customer_id".into(), to_table: "customers".into(), to_column: "id".into() };
        let analyses = [identifier_analysis(1, 2, "id")];

        build_schema_graph(&store, 1, &[orders, customers], &analyses, &[rel]);

        let orders_entity = store.get_node("1_orders").unwrap();
        assert_eq!(orders_entity.label, NodeLabel::Entity);
        let attrs = store.traverse_out("1_orders", Some(RelationLabel::HasAttribute));
        assert_eq!(attrs.len(), 1);
        let refs = store.traverse_out("1_orders", Some(RelationLabel::References));
        assert_eq!(refs[0].node_id, "2_customers");

        let identifiers = store.traverse_out("2_customers", Some(RelationLabel::HasIdentifier));
        assert_eq!(identifiers.len(), 1);
        assert_eq!(identifiers[0].label, NodeLabel::UniqueIdentifier);
    }

    #[test]
    fn drop_by_sql_id_removes_nodes_and_relations() {
        let store = GraphStore::new(true);
        let orders = (table(1, "orders"), vec![col(1, 1, "id", AnaType::Attribute)]);
        let analyses = [identifier_analysis(1, 1, "id")];
        build_schema_graph(&store, 1, &[orders], &analyses, &[]);
        store.drop_by_sql_id(1);
        assert!(store.nodes_by_sql_id(1).is_empty());
        assert!(store.traverse_out("1_orders", None).is_empty());
    }

    #[test]
    fn drop_by_source_id_matches_substring() {
        let store = GraphStore::new(true);
        store.create_node(GraphNode {
            node_id: "chunk_node".into(),
            label: NodeLabel::DocumentChunk,
            name: "chunk".into(),
            description: None,
            sql_id: None,
            table_id: None,
            table_name: None,
            column_name: None,
            source_id: Some("file_7_chunk_42".into()),
            kb_id: Some(1),
            file_id: Some(7),
            owner_id: None,
            visibility: None,
        });
        store.drop_by_source_id_containing("chunk_42");
        assert!(store.get_node("chunk_node").is_none());
    }

    #[test]
    fn disabled_store_ignores_writes() {
        let store = GraphStore::new(false);
        store.create_node(GraphNode {
            node_id: "x".into(),
            label: NodeLabel::Entity,
            name: "x".into(),
            description: None,
            sql_id: Some(1),
            table_id: None,
            table_name: None,
            column_name: None,
            source_id: None,
            kb_id: None,
            file_id: None,
            owner_id: None,
            visibility: None,
        });
        assert!(store.get_node("x").is_none());
    }

    #[test]
    fn find_nodes_by_name_matches_case_insensitively() {
        let store = GraphStore::new(true);
        let orders = (table(1, "Orders"), vec![]);
        build_schema_graph(&store, 1, &[orders], &[], &[]);
        let hits = store.find_nodes_by_name(None, &["order".to_string()]);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node_id, "1_Orders");
    }

    #[test]
    fn neighbourhood_hides_private_nodes_from_non_owner() {
        let store = GraphStore::new(true);
        store.create_node(GraphNode {
            node_id: "doc_a".into(),
            label: NodeLabel::DocumentChunk,
            name: "a".into(),
            description: None,
            sql_id: None,
            table_id: None,
            table_name: None,
            column_name: None,
            source_id: None,
            kb_id: Some(1),
            file_id: Some(1),
            owner_id: Some(1),
            visibility: None,
        });
        store.create_node(GraphNode {
            node_id: "doc_b".into(),
            label: NodeLabel::DocumentChunk,
            name: "b".into(),
            description: None,
            sql_id: None,
            table_id: None,
            table_name: None,
            column_name: None,
            source_id: None,
            kb_id: Some(1),
            file_id: Some(2),
            owner_id: Some(1),
            visibility: Some(Visibility::Private),
        });
        store.create_relation(GraphRelation {
            from: "doc_a".into(),
            to: "doc_b".into(),
            label: RelationLabel::Mentions,
            from_column: None,
            to_column: None,
            from_table_id: None,
            to_table_id: None,
        });
        assert!(store.neighbourhood("doc_a", false).is_empty());
        assert_eq!(store.neighbourhood("doc_a", true).len(), 1);
    }
}
