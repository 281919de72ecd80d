//! File upload, content access, and knowledge-base listing.
//!
//! `add_file` accepts either a JSON body (`source` names a path already
//! reachable on disk, or `content` carries the text inline) or a
//! `multipart/form-data` upload, dispatched on the request's `Content-Type`
//! since axum's extractors can't branch on it themselves.

use axum::body::Bytes;
use axum::extract::{Multipart, Query, State};
use axum::http::header;
use axum::Json;
use std::path::PathBuf;
use std::sync::Arc;

use crate::catalog::models::Visibility;
use crate::error::{AppError, AppResult};
use crate::inverted::{split_into_child_spans, ChildInsert};
use crate::protocol::rest::dto::{
    parse_visibility, AddFileResponse, DeleteFileRequest, Envelope, FileContentQuery, FileContentResponse,
    FileListRequest, FileListResponse, LocalFileContentQuery, SimpleEnvelope,
};
use crate::protocol::rest::error::RestError;
use crate::protocol::rest::handlers::knowledge_base::cascade_delete_file;
use crate::vector::VectorId;
use crate::Handler;

pub async fn add_file(
    State(handler): State<Arc<Handler>>,
    request: axum::extract::Request,
) -> Result<Json<Envelope<AddFileResponse>>, RestError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("multipart/form-data"))
        .unwrap_or(false);

    if is_multipart {
        let multipart = Multipart::from_request(request, &handler)
            .await
            .map_err(|e| RestError::bad_request(e.to_string()))?;
        add_file_multipart(handler, multipart).await
    } else {
        let bytes = axum::body::to_bytes(request.into_body(), 64 * 1024 * 1024)
            .await
            .map_err(|e| RestError::bad_request(e.to_string()))?;
        let req: crate::protocol::rest::dto::AddFileRequest =
            serde_json::from_slice(&bytes).map_err(|e| RestError::bad_request(e.to_string()))?;
        add_file_json(handler, req).await
    }
}

async fn add_file_json(
    handler: Arc<Handler>,
    req: crate::protocol::rest::dto::AddFileRequest,
) -> Result<Json<Envelope<AddFileResponse>>, RestError> {
    let identity = handler.authenticate(&req.user_name, &req.password)?;
    let visibility = parse_visibility(req.visibility.as_deref());

    let content = match &req.content {
        Some(inline) => inline.clone(),
        None => std::fs::read_to_string(&req.source)
            .map_err(|e| RestError::bad_request(format!("cannot read '{}': {e}", req.source)))?,
    };

    let file_id = handler.catalog.add_file(req.kb_id, identity.user_id, visibility, &req.source, content.len() as i64)?;
    ingest_document(&handler, req.kb_id, file_id, identity.user_id, visibility, &req.source, &content).await?;
    Ok(Envelope::ok("file added", AddFileResponse { file_id }))
}

async fn add_file_multipart(
    handler: Arc<Handler>,
    mut multipart: Multipart,
) -> Result<Json<Envelope<AddFileResponse>>, RestError> {
    let mut user_name = None;
    let mut password = None;
    let mut kb_id: Option<i64> = None;
    let mut visibility_raw: Option<String> = None;
    let mut file_name: Option<String> = None;
    let mut file_bytes: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| RestError::bad_request(e.to_string()))? {
        match field.name().unwrap_or_default() {
            "user_name" => user_name = Some(field.text().await.map_err(|e| RestError::bad_request(e.to_string()))?),
            "password" => password = Some(field.text().await.map_err(|e| RestError::bad_request(e.to_string()))?),
            "kb_id" => {
                let text = field.text().await.map_err(|e| RestError::bad_request(e.to_string()))?;
                kb_id = Some(text.parse().map_err(|_| RestError::bad_request("kb_id must be an integer"))?);
            }
            "visibility" => {
                visibility_raw = Some(field.text().await.map_err(|e| RestError::bad_request(e.to_string()))?)
            }
            "file" => {
                file_name = field.file_name().map(str::to_string);
                file_bytes = Some(field.bytes().await.map_err(|e| RestError::bad_request(e.to_string()))?);
            }
            _ => {}
        }
    }

    let user_name = user_name.ok_or_else(|| RestError::bad_request("missing user_name"))?;
    let password = password.ok_or_else(|| RestError::bad_request("missing password"))?;
    let kb_id = kb_id.ok_or_else(|| RestError::bad_request("missing kb_id"))?;
    let file_name = file_name.unwrap_or_else(|| "upload.bin".to_string());
    let bytes = file_bytes.ok_or_else(|| RestError::bad_request("missing file field"))?;

    let identity = handler.authenticate(&user_name, &password)?;
    let visibility = parse_visibility(visibility_raw.as_deref());

    let dest_dir = handler.config.catalog.file_dir.join(kb_id.to_string());
    std::fs::create_dir_all(&dest_dir)
        .map_err(|e| RestError::internal(format!("cannot create upload directory: {e}")))?;
    let dest_path = dest_dir.join(&file_name);
    std::fs::write(&dest_path, &bytes).map_err(|e| RestError::internal(format!("cannot store upload: {e}")))?;

    let content = String::from_utf8_lossy(&bytes).into_owned();
    let file_id = handler.catalog.add_file(
        kb_id,
        identity.user_id,
        visibility,
        &dest_path.to_string_lossy(),
        bytes.len() as i64,
    )?;
    ingest_document(&handler, kb_id, file_id, identity.user_id, visibility, &file_name, &content).await?;
    Ok(Envelope::ok("file added", AddFileResponse { file_id }))
}

/// Chunks `content`, embeds each chunk and the title, and indexes the
/// result in both the inverted index (C3, for hybrid/lexical search) and
/// the dense vector store (C2, for pure similarity search). Chunk vector
/// ids are assigned positionally within the file's own partition, so they
/// never need to match the inverted index's internally assigned child ids.
async fn ingest_document(
    handler: &Handler,
    kb_id: i64,
    file_id: i64,
    owner_id: i64,
    visibility: Visibility,
    title: &str,
    content: &str,
) -> AppResult<()> {
    let spans =
        split_into_child_spans(content, handler.inverted_index.child_chunk_size(), handler.inverted_index.chunk_overlap());
    let title_vector = handler.llm.embed(title).await?;

    let mut children = Vec::with_capacity(spans.len());
    let mut content_vectors = Vec::with_capacity(spans.len());
    for span in &spans {
        let chunk_text = &content[span.start..span.end];
        let content_vector = handler.llm.embed(chunk_text).await?;
        content_vectors.push(content_vector.clone());
        children.push(ChildInsert {
            content: chunk_text.to_string(),
            title_vector: title_vector.clone(),
            content_vector,
        });
    }

    let summary: String = content.chars().take(280).collect();
    let chunk_count = children.len();
    handler
        .inverted_index
        .insert_document(kb_id, file_id, owner_id, visibility, title, &summary, content.len(), children);

    for (idx, vector) in content_vectors.into_iter().enumerate() {
        let _ = handler.vector_store.upsert_chunk_vector(kb_id, file_id, idx as VectorId, &vector);
    }
    tracing::info!(kb_id, file_id, chunk_count, "file_ingested");
    Ok(())
}

pub async fn delete_file(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<DeleteFileRequest>,
) -> Result<Json<SimpleEnvelope>, RestError> {
    let identity = handler.authenticate(&req.user_name, &req.password)?;
    let file = handler.catalog.get_file(req.file_id)?;
    handler.catalog.delete_file(identity.user_id, req.file_id)?;
    cascade_delete_file(&handler, file.kb_id, req.file_id);
    Ok(SimpleEnvelope::ok("file deleted"))
}

pub async fn get_knowledge_base_file_list(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<FileListRequest>,
) -> Result<Json<Envelope<FileListResponse>>, RestError> {
    handler.authenticate(&req.user_name, &req.password)?;
    let files = handler.catalog.list_files_for_kb(req.kb_id)?;
    Ok(Envelope::ok("ok", FileListResponse { files }))
}

pub async fn get_file_content(
    State(handler): State<Arc<Handler>>,
    Query(query): Query<FileContentQuery>,
) -> Result<Json<Envelope<FileContentResponse>>, RestError> {
    handler.authenticate(&query.user_name, &query.password)?;
    let file = handler.catalog.get_file(query.file_id)?;
    let content = std::fs::read_to_string(&file.source)
        .map_err(|e| RestError::not_found(format!("cannot read file {}: {e}", query.file_id)))?;
    Ok(Envelope::ok("ok", FileContentResponse { file_id: query.file_id, content }))
}

/// Reads a file from the sandbox directory by relative path. Guards
/// against path traversal: the resolved path must stay inside
/// `config.catalog.sandbox_dir`.
fn read_sandboxed(handler: &Handler, relative_path: &str) -> AppResult<String> {
    let sandbox_dir = &handler.config.catalog.sandbox_dir;
    let candidate: PathBuf = sandbox_dir.join(relative_path);
    let resolved = candidate
        .canonicalize()
        .map_err(|e| AppError::not_found(format!("no such sandbox file '{relative_path}': {e}")))?;
    let sandbox_root = sandbox_dir
        .canonicalize()
        .unwrap_or_else(|_| sandbox_dir.clone());
    if !resolved.starts_with(&sandbox_root) {
        return Err(AppError::authorization("path escapes the sandbox directory"));
    }
    std::fs::read_to_string(&resolved)
        .map_err(|e| AppError::not_found(format!("cannot read '{relative_path}': {e}")))
}

pub async fn get_local_file_content(
    State(handler): State<Arc<Handler>>,
    Query(query): Query<LocalFileContentQuery>,
) -> Result<Json<Envelope<FileContentResponse>>, RestError> {
    handler.authenticate(&query.user_name, &query.password)?;
    let content = read_sandboxed(&handler, &query.path)?;
    Ok(Envelope::ok("ok", FileContentResponse { file_id: 0, content }))
}

pub async fn post_local_file_content(
    State(handler): State<Arc<Handler>>,
    Json(query): Json<LocalFileContentQuery>,
) -> Result<Json<Envelope<FileContentResponse>>, RestError> {
    handler.authenticate(&query.user_name, &query.password)?;
    let content = read_sandboxed(&handler, &query.path)?;
    Ok(Envelope::ok("ok", FileContentResponse { file_id: 0, content }))
}
