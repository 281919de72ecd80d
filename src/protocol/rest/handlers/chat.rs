//! Streaming chat endpoints (C6 transport over C7/C8/C5).
//!
//! Both handlers start a turn, spawn the producing pipeline on its own
//! task, and hand the consuming half of the channel to
//! [`crate::protocol::rest::stream::sse_response`] immediately — the HTTP
//! response begins streaming before the pipeline has produced its first
//! chunk.

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

use crate::pipelines::table_file::FileSource;
use crate::protocol::rest::dto::{ChatRequest, StreamChatRequest};
use crate::protocol::rest::error::RestError;
use crate::protocol::rest::stream::{chunk_sink, sse_response};
use crate::retrieval::SearchRequest;
use crate::streaming::{Chunk, Delta, DeltaType};
use crate::util::unix_timestamp;
use crate::Handler;

const MODEL_NAME: &str = "ragweave";

/// Runs the SQL pipeline (C7) against `sql_id`, streaming its chunks back
/// over SSE.
pub async fn execute_stream_chat(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<StreamChatRequest>,
) -> Result<Response, RestError> {
    handler.authenticate(&req.user_name, &req.password)?;
    handler.catalog.get_session(&req.session_id)?;
    let turn_index = handler.conversation.start_turn(&req.session_id, &req.query)?;

    let pipeline = handler.build_sql_pipeline(req.sql_id).await?;
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Chunk>();
    let mut sink = chunk_sink(handler.conversation.clone(), req.session_id.clone(), turn_index, tx);
    let sql_id = req.sql_id;
    let query = req.query.clone();
    tokio::spawn(async move {
        if let Err(err) = pipeline.run(sql_id, &query, &mut sink).await {
            tracing::warn!(sql_id, error = %err, "execute_stream_chat_failed");
            sink(Chunk::text("error", MODEL_NAME, unix_timestamp(), err.to_string()));
        }
    });

    Ok(sse_response(rx, MODEL_NAME.to_string(), Uuid::new_v4().to_string()))
}

/// Central chat dispatch: picks the backing pipeline by which of
/// `sql_id`/`file_id`/`kb_id` the request carries.
pub async fn chat(
    State(handler): State<Arc<Handler>>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, RestError> {
    handler.authenticate(&req.user_name, &req.password)?;
    handler.catalog.get_session(&req.session_id)?;
    let turn_index = handler.conversation.start_turn(&req.session_id, &req.query)?;
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Chunk>();
    let sink = chunk_sink(handler.conversation.clone(), req.session_id.clone(), turn_index, tx);

    if let Some(sql_id) = req.sql_id {
        let pipeline = handler.build_sql_pipeline(sql_id).await?;
        let query = req.query.clone();
        let mut sink = sink;
        tokio::spawn(async move {
            if let Err(err) = pipeline.run(sql_id, &query, &mut sink).await {
                tracing::warn!(sql_id, error = %err, "chat_sql_path_failed");
                sink(Chunk::text("error", MODEL_NAME, unix_timestamp(), err.to_string()));
            }
        });
    } else if let Some(file_id) = req.file_id {
        let file = handler.catalog.get_file(file_id)?;
        let source = file_source_for(&file.source);
        let query = req.query.clone();
        let pipeline = handler.table_file_pipeline.clone();
        let mut sink = sink;
        tokio::spawn(async move {
            if let Err(err) = pipeline.run(source, Some(&query), &mut sink).await {
                tracing::warn!(file_id, error = %err, "chat_file_path_failed");
                sink(Chunk::text("error", MODEL_NAME, unix_timestamp(), err.to_string()));
            }
        });
    } else {
        let kb_id = req.kb_id.ok_or_else(|| RestError::bad_request("one of sql_id, file_id, kb_id is required"))?;
        let handler = handler.clone();
        let query = req.query.clone();
        let mut sink = sink;
        tokio::spawn(async move {
            if let Err(err) = run_knowledge_base_chat(&handler, kb_id, &query, &mut sink).await {
                tracing::warn!(kb_id, error = %err, "chat_knowledge_base_path_failed");
                sink(Chunk::text("error", MODEL_NAME, unix_timestamp(), err.to_string()));
            }
        });
    }

    Ok(sse_response(rx, MODEL_NAME.to_string(), Uuid::new_v4().to_string()))
}

async fn run_knowledge_base_chat(
    handler: &Handler,
    kb_id: i64,
    query: &str,
    sink: &mut (dyn FnMut(Chunk) + Send),
) -> crate::error::AppResult<()> {
    let kb = handler.catalog.get_knowledge_base(kb_id)?;
    let results = handler
        .retrieval
        .search(SearchRequest { query_text: query, kb_id, caller_id: kb.owner_id, top_k: 8 })
        .await?;

    let context: String = results
        .hybrid
        .iter()
        .chain(results.vector.iter())
        .take(8)
        .map(|item| format!("- {}: {}", item.title, item.content))
        .collect::<Vec<_>>()
        .join("\n");

    let messages = [
        crate::llm::ChatMessage::system(format!(
            "Answer the user's question using only the following retrieved context:\n{context}"
        )),
        crate::llm::ChatMessage::user(query),
    ];

    handler
        .llm
        .chat_stream(&messages, &mut |delta| {
            sink(Chunk::new("answer", MODEL_NAME, unix_timestamp(), Delta { content: delta.content, delta_type: DeltaType::Text }));
        })
        .await
}

fn file_source_for(path: &str) -> FileSource {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".csv") {
        FileSource::Csv(path.into())
    } else {
        FileSource::Workbook(path.into())
    }
}
