//! Account-scoped bulk wipe and liveness probe.

use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::protocol::rest::dto::{CredentialsRequest, DeleteAllDataResponse, Envelope, HealthResponse};
use crate::protocol::rest::error::RestError;
use crate::protocol::rest::handlers::knowledge_base::cascade_delete_knowledge_base;
use crate::Handler;

/// Wipes every knowledge base and SQL connection the caller owns, but keeps
/// the account row itself — the destructive twin of [`super::auth::delete_user`]
/// minus the final `catalog.delete_user` call.
pub async fn delete_all_data(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<Envelope<DeleteAllDataResponse>>, RestError> {
    let identity = handler.authenticate(&req.user_name, &req.password)?;

    let kb_ids: Vec<i64> =
        handler.catalog.list_knowledge_bases_for_user(identity.user_id)?.into_iter().map(|kb| kb.id).collect();
    let mut deleted_knowledge_base_ids = Vec::with_capacity(kb_ids.len());
    for kb_id in kb_ids {
        cascade_delete_knowledge_base(&handler, identity.user_id, kb_id)?;
        deleted_knowledge_base_ids.push(kb_id);
    }

    let sql_infos = handler.catalog.get_sql_info_list(identity.user_id)?;
    let mut deleted_sql_ids = Vec::with_capacity(sql_infos.len());
    for sql_info in sql_infos {
        handler.vector_store.delete_sql_schema_vectors(sql_info.id);
        handler.graph_store.drop_by_sql_id(sql_info.id);
        handler.catalog.delete_sql_info(identity.user_id, sql_info.id)?;
        deleted_sql_ids.push(sql_info.id);
    }

    Ok(Envelope::ok("all data deleted", DeleteAllDataResponse { deleted_knowledge_base_ids, deleted_sql_ids }))
}

pub async fn health() -> Json<Envelope<HealthResponse>> {
    Envelope::ok("ok", HealthResponse { status: "up", version: env!("CARGO_PKG_VERSION") })
}
