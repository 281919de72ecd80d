//! Direct, single-engine retrieval probes and one-shot SQL execution.
//!
//! `query_milvus` and `query_graph_neo4j` bypass the hybrid orchestrator
//! (C5) and surface exactly one of its engines, named after the backend the
//! teaching deployment historically used for that engine.

use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::protocol::rest::dto::{
    Envelope, ExecuteQueryRequest, RetrievalQueryRequest, RetrievalQueryResponse,
};
use crate::protocol::rest::error::RestError;
use crate::retrieval::SearchRequest;
use crate::Handler;

pub async fn query_milvus(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<RetrievalQueryRequest>,
) -> Result<Json<Envelope<RetrievalQueryResponse>>, RestError> {
    let identity = handler.authenticate(&req.user_name, &req.password)?;
    let results = handler
        .retrieval
        .search(SearchRequest { query_text: &req.query, kb_id: req.kb_id, caller_id: identity.user_id, top_k: req.top_k })
        .await?;
    Ok(Envelope::ok("ok", RetrievalQueryResponse { items: results.vector }))
}

pub async fn query_graph_neo4j(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<RetrievalQueryRequest>,
) -> Result<Json<Envelope<RetrievalQueryResponse>>, RestError> {
    let identity = handler.authenticate(&req.user_name, &req.password)?;
    let results = handler
        .retrieval
        .search(SearchRequest { query_text: &req.query, kb_id: req.kb_id, caller_id: identity.user_id, top_k: req.top_k })
        .await?;
    Ok(Envelope::ok("ok", RetrievalQueryResponse { items: results.graph }))
}

/// Runs the agentic SQL pipeline (C7) to completion without streaming,
/// discarding intermediate chunks and returning only the final outcome.
pub async fn execute_query(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<ExecuteQueryRequest>,
) -> Result<Json<Envelope<crate::pipelines::sql::SqlPipelineOutcome>>, RestError> {
    handler.authenticate(&req.user_name, &req.password)?;
    let pipeline = handler.build_sql_pipeline(req.sql_id).await?;
    let mut sink = |_chunk: crate::streaming::Chunk| {};
    let outcome = pipeline.run(req.sql_id, &req.query, &mut sink).await?;
    Ok(Envelope::ok("ok", outcome))
}
