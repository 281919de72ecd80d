//! Knowledge base create/delete/list.

use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::catalog::models::KnowledgeBase;
use crate::error::AppResult;
use crate::protocol::rest::dto::{
    CreateKnowledgeBaseRequest, CreateKnowledgeBaseResponse, DeleteKnowledgeBaseRequest,
    DeleteKnowledgeBaseResponse, Envelope, GetKnowledgeBaseRequest, GetKnowledgeBaseResponse,
};
use crate::protocol::rest::error::RestError;
use crate::Handler;

/// Drops every non-catalog trace of `file_id` — the vector partition, the
/// inverted index's parent/child documents, and any graph nodes whose
/// provenance mentions the chunk. Shared by the single-file delete path and
/// the knowledge-base cascade.
pub(crate) fn cascade_delete_file(handler: &Handler, kb_id: i64, file_id: i64) {
    handler.vector_store.delete_file_partition(kb_id, file_id);
    handler.inverted_index.delete_by_file_id(kb_id, file_id);
    handler.graph_store.drop_by_source_id_containing(&file_id.to_string());
}

/// Deletes a knowledge base and every file it owns, cascading into the
/// retrieval backends for each file. Returns the deleted file ids.
pub(crate) fn cascade_delete_knowledge_base(handler: &Handler, owner_id: i64, kb_id: i64) -> AppResult<Vec<i64>> {
    let deleted_file_ids = handler.catalog.delete_knowledge_base(owner_id, kb_id)?;
    for file_id in &deleted_file_ids {
        cascade_delete_file(handler, kb_id, *file_id);
    }
    handler.inverted_index.delete_by_knowledge_id(kb_id);
    Ok(deleted_file_ids)
}

pub async fn create_knowledge_base(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<CreateKnowledgeBaseRequest>,
) -> Result<Json<Envelope<CreateKnowledgeBaseResponse>>, RestError> {
    let identity = handler.authenticate(&req.user_name, &req.password)?;
    let kb_id =
        handler.catalog.create_knowledge_base(identity.user_id, &req.name, req.description.as_deref())?;
    Ok(Envelope::ok("knowledge base created", CreateKnowledgeBaseResponse { knowledge_base_id: kb_id }))
}

pub async fn delete_knowledge_base(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<DeleteKnowledgeBaseRequest>,
) -> Result<Json<Envelope<DeleteKnowledgeBaseResponse>>, RestError> {
    let identity = handler.authenticate(&req.user_name, &req.password)?;
    let deleted_file_ids = cascade_delete_knowledge_base(&handler, identity.user_id, req.kb_id)?;
    Ok(Envelope::ok("knowledge base deleted", DeleteKnowledgeBaseResponse { deleted_file_ids }))
}

pub async fn get_knowledge_base(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<GetKnowledgeBaseRequest>,
) -> Result<Json<Envelope<GetKnowledgeBaseResponse>>, RestError> {
    let identity = handler.authenticate(&req.user_name, &req.password)?;
    let response = if let Some(kb_id) = req.kb_id {
        let kb: KnowledgeBase = handler.catalog.get_knowledge_base(kb_id)?;
        GetKnowledgeBaseResponse { knowledge_base: Some(kb), knowledge_bases: Vec::new() }
    } else {
        let kbs = handler.catalog.list_knowledge_bases_for_user(identity.user_id)?;
        GetKnowledgeBaseResponse { knowledge_base: None, knowledge_bases: kbs }
    };
    Ok(Envelope::ok("ok", response))
}
