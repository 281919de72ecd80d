//! Request/response shapes for the REST surface.
//!
//! Every response is a flat JSON object: `{success, message, ...fields}`,
//! never the nested `{data, error: {code, message}}` shape. [`Envelope`]
//! flattens its payload alongside `success`/`message`; endpoints with
//! nothing to report beyond the verdict use [`SimpleEnvelope`].

use crate::catalog::models::{
    BaseSql, ColSql, DiscussionTaskRecord, FileBasicInfo, KnowledgeBase, RelSql, SessionRecord, TableSql,
    Visibility,
};
use crate::conversation::Turn;
use crate::retrieval::RetrievedItem;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct SimpleEnvelope {
    pub success: bool,
    pub message: String,
}

impl SimpleEnvelope {
    pub fn ok(message: impl Into<String>) -> Json<Self> {
        Json(SimpleEnvelope { success: true, message: message.into() })
    }
}

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Envelope { success: true, message: message.into(), data })
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

// ---- Auth ----

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub user_name: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub user_name: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteUserResponse {
    pub deleted_knowledge_base_ids: Vec<i64>,
}

// ---- Knowledge bases ----

#[derive(Debug, Deserialize)]
pub struct CreateKnowledgeBaseRequest {
    pub user_name: String,
    pub password: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateKnowledgeBaseResponse {
    pub knowledge_base_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct DeleteKnowledgeBaseRequest {
    pub user_name: String,
    pub password: String,
    pub kb_id: i64,
}

#[derive(Debug, Serialize)]
pub struct DeleteKnowledgeBaseResponse {
    pub deleted_file_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct GetKnowledgeBaseRequest {
    pub user_name: String,
    pub password: String,
    #[serde(default)]
    pub kb_id: Option<i64>,
}

#[derive(Debug, Default, Serialize)]
pub struct GetKnowledgeBaseResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_base: Option<KnowledgeBase>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub knowledge_bases: Vec<KnowledgeBase>,
}

// ---- Files ----

#[derive(Debug, Deserialize)]
pub struct AddFileRequest {
    pub user_name: String,
    pub password: String,
    pub kb_id: i64,
    #[serde(default)]
    pub visibility: Option<String>,
    pub source: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AddFileResponse {
    pub file_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct DeleteFileRequest {
    pub user_name: String,
    pub password: String,
    pub file_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct FileListRequest {
    pub user_name: String,
    pub password: String,
    pub kb_id: i64,
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<FileBasicInfo>,
}

#[derive(Debug, Deserialize)]
pub struct FileContentQuery {
    pub user_name: String,
    pub password: String,
    pub file_id: i64,
}

#[derive(Debug, Serialize)]
pub struct FileContentResponse {
    pub file_id: i64,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct LocalFileContentQuery {
    pub user_name: String,
    pub password: String,
    pub path: String,
}

// ---- Retrieval ----

#[derive(Debug, Deserialize)]
pub struct RetrievalQueryRequest {
    pub user_name: String,
    pub password: String,
    pub kb_id: i64,
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct RetrievalQueryResponse {
    pub items: Vec<RetrievedItem>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteQueryRequest {
    pub user_name: String,
    pub password: String,
    pub sql_id: i64,
    pub query: String,
}

// ---- Chat / streaming ----

#[derive(Debug, Deserialize)]
pub struct StreamChatRequest {
    pub user_name: String,
    pub password: String,
    pub session_id: String,
    pub sql_id: i64,
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_name: String,
    pub password: String,
    pub session_id: String,
    pub query: String,
    #[serde(default)]
    pub kb_id: Option<i64>,
    #[serde(default)]
    pub sql_id: Option<i64>,
    #[serde(default)]
    pub file_id: Option<i64>,
}

// ---- Sessions ----

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub user_name: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub kb_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UserSessionsRequest {
    pub user_name: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserSessionsResponse {
    pub sessions: Vec<SessionRecord>,
}

#[derive(Debug, Deserialize)]
pub struct SessionIdRequest {
    pub user_name: String,
    pub password: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionMessagesResponse {
    pub turns: Vec<Turn>,
}

#[derive(Debug, Serialize)]
pub struct DiscussionTasksResponse {
    pub tasks: Vec<DiscussionTaskRecord>,
}

// ---- SQL metadata ----

#[derive(Debug, Deserialize)]
pub struct InsertSqlInfoRequest {
    pub user_name: String,
    pub password: String,
    pub host: String,
    pub port: i64,
    pub dialect: String,
    pub database_name: String,
    pub credentials: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InsertSqlInfoResponse {
    pub sql_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSqlInfoRequest {
    pub user_name: String,
    pub password: String,
    pub sql_id: i64,
    pub host: String,
    pub port: i64,
    pub dialect: String,
    pub database_name: String,
    pub credentials: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SqlIdRequest {
    pub user_name: String,
    pub password: String,
    pub sql_id: i64,
}

/// `BaseSql` with `credentials` redacted — the raw connection secret must
/// never leave the process in a list response.
#[derive(Debug, Serialize)]
pub struct RedactedBaseSql {
    pub id: i64,
    pub owner_id: i64,
    pub host: String,
    pub port: i64,
    pub dialect: String,
    pub database_name: String,
    pub description: Option<String>,
}

impl From<BaseSql> for RedactedBaseSql {
    fn from(sql: BaseSql) -> Self {
        RedactedBaseSql {
            id: sql.id,
            owner_id: sql.owner_id,
            host: sql.host,
            port: sql.port,
            dialect: sql.dialect,
            database_name: sql.database_name,
            description: sql.description,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SqlInfoListResponse {
    pub connections: Vec<RedactedBaseSql>,
}

#[derive(Debug, Serialize)]
pub struct TableInfo {
    pub table: TableSql,
    pub columns: Vec<ColSql>,
}

#[derive(Debug, Serialize)]
pub struct TableInfoResponse {
    pub tables: Vec<TableInfo>,
}

#[derive(Debug, Deserialize)]
pub struct InsertSqlRelRequest {
    pub user_name: String,
    pub password: String,
    pub sql_id: i64,
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

#[derive(Debug, Serialize)]
pub struct InsertSqlRelResponse {
    pub rel_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct DeleteSqlRelRequest {
    pub user_name: String,
    pub password: String,
    pub rel_id: i64,
}

#[derive(Debug, Serialize)]
pub struct SqlRelListResponse {
    pub relations: Vec<RelSql>,
}

pub(crate) fn parse_visibility(raw: Option<&str>) -> Visibility {
    raw.map(Visibility::parse).unwrap_or(Visibility::Private)
}

// ---- Admin ----

#[derive(Debug, Serialize)]
pub struct DeleteAllDataResponse {
    pub deleted_knowledge_base_ids: Vec<i64>,
    pub deleted_sql_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_flattens_payload_alongside_success_and_message() {
        let json = serde_json::to_value(Envelope {
            success: true,
            message: "ok".into(),
            data: RegisterResponse { user_id: 7 },
        })
        .unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "ok");
        assert_eq!(json["user_id"], 7);
    }

    #[test]
    fn redacted_base_sql_drops_credentials_field() {
        let sql = BaseSql {
            id: 1,
            owner_id: 1,
            host: "h".into(),
            port: 1,
            dialect: "mysql".into(),
            database_name: "db".into(),
            credentials: "user:secret".into(),
            description: None,
        };
        let value = serde_json::to_value(RedactedBaseSql::from(sql)).unwrap();
        assert!(value.get("credentials").is_none());
    }
}
