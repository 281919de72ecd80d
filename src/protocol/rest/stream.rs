//! Bridges a pipeline's synchronous chunk sink onto the SSE transport.
//!
//! Both pipelines call their `sink: &mut (dyn FnMut(Chunk) + Send)` directly
//! from synchronous code embedded in an `async fn`, so the sink itself can
//! never `.await`. [`chunk_sink`] forwards each chunk into an unbounded
//! channel (an infallible, non-blocking `send`); a small forwarding task
//! immediately re-sends it into the bounded channel that actually feeds
//! [`with_heartbeat`], so a slow client backpressures that forwarder without
//! ever requiring the pipeline's sink to block.

use crate::conversation::ConversationService;
use crate::streaming::{frame, with_heartbeat, AccumulatedTurn, Chunk, DONE_FRAME};
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue};
use axum::response::Response;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const FORWARDER_CAPACITY: usize = 16;

/// Builds a chunk sink that forwards every chunk to `tx` and then rewrites
/// the session's persisted turn, in that order — a reader of the catalog
/// can only ever observe a prefix of what the client has already received.
pub fn chunk_sink(
    conversation: Arc<ConversationService>,
    session_id: String,
    turn_index: usize,
    tx: mpsc::UnboundedSender<Chunk>,
) -> impl FnMut(Chunk) + Send + 'static {
    let mut accumulated = AccumulatedTurn::default();
    move |chunk: Chunk| {
        let delta = chunk.choices[0].delta.clone();
        let _ = tx.send(chunk);
        accumulated.push(&delta);
        let _ = conversation.update_turn(&session_id, turn_index, accumulated.clone());
    }
}

/// Turns the unbounded producer side of [`chunk_sink`] into a
/// `text/event-stream` response, heartbeating idle gaps and always closing
/// with `[DONE]`, even when the producer task finished on an error (the
/// error itself was already streamed as a text chunk by the caller).
pub fn sse_response(mut sink_rx: mpsc::UnboundedReceiver<Chunk>, model: String, stream_id: String) -> Response {
    let (bounded_tx, bounded_rx) = mpsc::channel::<Chunk>(FORWARDER_CAPACITY);
    tokio::spawn(async move {
        while let Some(chunk) = sink_rx.recv().await {
            if bounded_tx.send(chunk).await.is_err() {
                break;
            }
        }
    });

    let chunk_stream = with_heartbeat(bounded_rx, HEARTBEAT_INTERVAL, stream_id, model);
    let byte_stream = chunk_stream
        .map(|chunk| Ok::<_, std::convert::Infallible>(Bytes::from(frame(&chunk))))
        .chain(futures_util::stream::once(async {
            Ok::<_, std::convert::Infallible>(Bytes::from(DONE_FRAME))
        }));

    let mut response = Response::new(Body::from_stream(byte_stream));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}
