//! Session lifecycle and transcript retrieval (C10).

use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::protocol::rest::dto::{
    CreateSessionRequest, CreateSessionResponse, Envelope, SessionIdRequest, SessionMessagesResponse,
    SimpleEnvelope, UserSessionsRequest, UserSessionsResponse,
};
use crate::protocol::rest::error::RestError;
use crate::Handler;

pub async fn create_session(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<Envelope<CreateSessionResponse>>, RestError> {
    let identity = handler.authenticate(&req.user_name, &req.password)?;
    let session_id = handler.conversation.create_session(identity.user_id, &req.name, req.kb_name.as_deref())?;
    Ok(Envelope::ok("session created", CreateSessionResponse { session_id }))
}

pub async fn get_user_session_messages(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<UserSessionsRequest>,
) -> Result<Json<Envelope<UserSessionsResponse>>, RestError> {
    let identity = handler.authenticate(&req.user_name, &req.password)?;
    let sessions = handler.conversation.list_sessions(identity.user_id)?;
    Ok(Envelope::ok("ok", UserSessionsResponse { sessions }))
}

pub async fn get_sessions_by_id(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<SessionIdRequest>,
) -> Result<Json<Envelope<SessionMessagesResponse>>, RestError> {
    handler.authenticate(&req.user_name, &req.password)?;
    let turns = handler.conversation.get_messages(&req.session_id)?;
    Ok(Envelope::ok("ok", SessionMessagesResponse { turns }))
}

pub async fn delete_sessions_by_session_id(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<SessionIdRequest>,
) -> Result<Json<SimpleEnvelope>, RestError> {
    let identity = handler.authenticate(&req.user_name, &req.password)?;
    handler.conversation.delete_session(identity.user_id, &req.session_id)?;
    Ok(SimpleEnvelope::ok("session deleted"))
}

pub async fn clear_chat_history(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<SessionIdRequest>,
) -> Result<Json<SimpleEnvelope>, RestError> {
    handler.authenticate(&req.user_name, &req.password)?;
    handler.conversation.clear_history(&req.session_id)?;
    Ok(SimpleEnvelope::ok("history cleared"))
}
