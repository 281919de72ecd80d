//! SQL connection and schema metadata management (backs C7).

use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::error::AppError;
use crate::protocol::rest::dto::{
    DeleteSqlRelRequest, Envelope, InsertSqlInfoRequest, InsertSqlInfoResponse, InsertSqlRelRequest,
    InsertSqlRelResponse, SimpleEnvelope, SqlIdRequest, SqlInfoListResponse, TableInfo, TableInfoResponse,
    UpdateSqlInfoRequest,
};
use crate::protocol::rest::error::RestError;
use crate::Handler;

/// Registers the connection, then introspects its live schema to fill
/// `table_sql`/`col_sql` and the schema graph/vectors. Introspection
/// failure (target unreachable at registration time) doesn't roll back
/// the registration — it's logged and the connection stays usable for
/// manual `insert_sql_rel`/`get_table_info` calls; `SqlPipeline::run`
/// fails loudly on its own S0 stage if tables never get registered.
pub async fn insert_sql_info(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<InsertSqlInfoRequest>,
) -> Result<Json<Envelope<InsertSqlInfoResponse>>, RestError> {
    let identity = handler.authenticate(&req.user_name, &req.password)?;
    let sql_id = handler.catalog.insert_sql_info(
        identity.user_id,
        &req.host,
        req.port,
        &req.dialect,
        &req.database_name,
        &req.credentials,
        req.description.as_deref(),
    )?;

    if let Err(err) = handler.introspect_and_index_sql(sql_id, &req.dialect).await {
        tracing::warn!(sql_id, error = %err, "sql_schema_introspection_failed");
    }

    Ok(Envelope::ok("sql connection registered", InsertSqlInfoResponse { sql_id }))
}

/// `catalog.update_sql_info` doesn't check ownership itself (unlike
/// `delete_sql_info`), so the check lives here.
pub async fn update_sql_info(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<UpdateSqlInfoRequest>,
) -> Result<Json<SimpleEnvelope>, RestError> {
    let identity = handler.authenticate(&req.user_name, &req.password)?;
    let existing = handler.catalog.get_sql_info(req.sql_id)?;
    if existing.owner_id != identity.user_id {
        return Err(AppError::authorization("caller does not own this sql connection").into());
    }
    handler.catalog.update_sql_info(
        req.sql_id,
        &req.host,
        req.port,
        &req.dialect,
        &req.database_name,
        &req.credentials,
        req.description.as_deref(),
    )?;
    Ok(SimpleEnvelope::ok("sql connection updated"))
}

/// `catalog.delete_sql_info` only clears catalog rows; the schema's vector
/// and graph shadows in C2/C4 have to be dropped here as well.
pub async fn delete_sql_info(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<SqlIdRequest>,
) -> Result<Json<SimpleEnvelope>, RestError> {
    let identity = handler.authenticate(&req.user_name, &req.password)?;
    handler.catalog.delete_sql_info(identity.user_id, req.sql_id)?;
    handler.vector_store.delete_sql_schema_vectors(req.sql_id);
    handler.graph_store.drop_by_sql_id(req.sql_id);
    Ok(SimpleEnvelope::ok("sql connection deleted"))
}

pub async fn get_sql_info_list(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<crate::protocol::rest::dto::CredentialsRequest>,
) -> Result<Json<Envelope<SqlInfoListResponse>>, RestError> {
    let identity = handler.authenticate(&req.user_name, &req.password)?;
    let connections = handler.catalog.get_sql_info_list(identity.user_id)?.into_iter().map(Into::into).collect();
    Ok(Envelope::ok("ok", SqlInfoListResponse { connections }))
}

pub async fn get_table_info(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<SqlIdRequest>,
) -> Result<Json<Envelope<TableInfoResponse>>, RestError> {
    handler.authenticate(&req.user_name, &req.password)?;
    let tables = handler
        .catalog
        .get_table_info(req.sql_id)?
        .into_iter()
        .map(|(table, columns)| TableInfo { table, columns })
        .collect();
    Ok(Envelope::ok("ok", TableInfoResponse { tables }))
}

pub async fn insert_sql_rel(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<InsertSqlRelRequest>,
) -> Result<Json<Envelope<InsertSqlRelResponse>>, RestError> {
    handler.authenticate(&req.user_name, &req.password)?;
    let rel_id =
        handler.catalog.insert_sql_rel(req.sql_id, &req.from_table, &req.from_column, &req.to_table, &req.to_column)?;
    handler.rebuild_schema_graph(req.sql_id)?;
    Ok(Envelope::ok("relation inserted", InsertSqlRelResponse { rel_id }))
}

pub async fn delete_sql_rel(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<DeleteSqlRelRequest>,
) -> Result<Json<SimpleEnvelope>, RestError> {
    handler.authenticate(&req.user_name, &req.password)?;
    let rel = handler.catalog.get_sql_rel(req.rel_id)?;
    handler.catalog.delete_sql_rel(req.rel_id)?;
    handler.rebuild_schema_graph(rel.sql_id)?;
    Ok(SimpleEnvelope::ok("relation deleted"))
}
