//! Registration, login, logout, account deletion.

use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::protocol::rest::dto::{
    CredentialsRequest, DeleteUserResponse, Envelope, LoginResponse, RegisterResponse, SimpleEnvelope,
};
use crate::protocol::rest::error::RestError;
use crate::protocol::rest::handlers::knowledge_base::cascade_delete_knowledge_base;
use crate::Handler;

pub async fn register(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<Envelope<RegisterResponse>>, RestError> {
    let user_id = handler.catalog.register_user(&req.user_name, &req.password)?;
    Ok(Envelope::ok("user registered", RegisterResponse { user_id }))
}

pub async fn login(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<Envelope<LoginResponse>>, RestError> {
    let identity = handler.authenticate(&req.user_name, &req.password)?;
    Ok(Envelope::ok(
        "login successful",
        LoginResponse { user_id: identity.user_id, user_name: identity.user_name },
    ))
}

/// A no-op beyond re-verifying the credential — there is no session token
/// to invalidate (see [`crate::auth`]).
pub async fn logout(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<SimpleEnvelope>, RestError> {
    handler.authenticate(&req.user_name, &req.password)?;
    Ok(SimpleEnvelope::ok("logged out"))
}

/// Cascades into every knowledge base and SQL connection the user owns
/// before dropping the account row itself, so the retrieval backends never
/// hold a dangling partition for a user that no longer exists.
pub async fn delete_user(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<Envelope<DeleteUserResponse>>, RestError> {
    let identity = handler.authenticate(&req.user_name, &req.password)?;

    let kb_ids: Vec<i64> =
        handler.catalog.list_knowledge_bases_for_user(identity.user_id)?.into_iter().map(|kb| kb.id).collect();
    let mut deleted_knowledge_base_ids = Vec::with_capacity(kb_ids.len());
    for kb_id in kb_ids {
        cascade_delete_knowledge_base(&handler, identity.user_id, kb_id)?;
        deleted_knowledge_base_ids.push(kb_id);
    }

    for sql_info in handler.catalog.get_sql_info_list(identity.user_id)? {
        handler.vector_store.delete_sql_schema_vectors(sql_info.id);
        handler.graph_store.drop_by_sql_id(sql_info.id);
    }

    handler.catalog.delete_user(identity.user_id)?;
    Ok(Envelope::ok("user deleted", DeleteUserResponse { deleted_knowledge_base_ids }))
}
