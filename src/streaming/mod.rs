//! Streaming transport (C6).
//!
//! Every core pipeline produces output as a sequence of OpenAI-shaped
//! chunks. This module owns the chunk envelope, SSE wire framing, the
//! heartbeat combinator, and the turn-accumulation logic the conversation
//! service uses for write-after-emit persistence. It knows nothing about
//! HTTP; the REST layer drives a [`tokio::sync::mpsc::Receiver`] through
//! [`with_heartbeat`] and writes the framed bytes to the response body.

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaType {
    Text,
    Echarts,
    HtmlTable,
    File,
    Heartbeat,
    ToolDirectAnswer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    pub content: String,
    #[serde(rename = "type")]
    pub delta_type: DeltaType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
}

impl Chunk {
    pub fn new(id: impl Into<String>, model: impl Into<String>, created: i64, delta: Delta) -> Self {
        Chunk {
            id: id.into(),
            object: "chat.completion.chunk".to_string(),
            created,
            model: model.into(),
            choices: vec![Choice { index: 0, delta, finish_reason: None }],
        }
    }

    pub fn text(id: impl Into<String>, model: impl Into<String>, created: i64, content: impl Into<String>) -> Self {
        Chunk::new(id, model, created, Delta { content: content.into(), delta_type: DeltaType::Text })
    }

    pub fn heartbeat(id: impl Into<String>, model: impl Into<String>, created: i64) -> Self {
        Chunk::new(id, model, created, Delta { content: String::new(), delta_type: DeltaType::Heartbeat })
    }

    pub fn stop(id: impl Into<String>, model: impl Into<String>, created: i64) -> Self {
        let mut chunk = Chunk::new(id, model, created, Delta { content: String::new(), delta_type: DeltaType::Text });
        chunk.choices[0].finish_reason = Some("stop".to_string());
        chunk
    }

    pub fn is_heartbeat(&self) -> bool {
        self.choices.first().map(|c| c.delta.delta_type == DeltaType::Heartbeat).unwrap_or(false)
    }
}

/// Frames one chunk as an SSE event: `data: <json>\n\n`.
pub fn frame(chunk: &Chunk) -> String {
    format!("data: {}\n\n", serde_json::to_string(chunk).expect("Chunk always serializes"))
}

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Wraps a chunk-producing channel so that if no chunk arrives within
/// `interval`, a heartbeat chunk is emitted instead. Heartbeats never reach
/// persistence (see [`AccumulatedTurn::push`]).
pub fn with_heartbeat(
    receiver: mpsc::Receiver<Chunk>,
    interval: Duration,
    heartbeat_id: impl Into<String> + Clone + Send + 'static,
    model: impl Into<String> + Clone + Send + 'static,
) -> impl Stream<Item = Chunk> {
    futures_util::stream::unfold((receiver, interval, heartbeat_id, model), |(mut rx, interval, id, model)| async move {
        match tokio::time::timeout(interval, rx.recv()).await {
            Ok(Some(chunk)) => Some((chunk, (rx, interval, id, model))),
            Ok(None) => None,
            Err(_elapsed) => {
                let now = crate::util::unix_timestamp();
                let chunk = Chunk::heartbeat(id.clone().into(), model.clone().into(), now);
                Some((chunk, (rx, interval, id, model)))
            }
        }
    })
}

/// One item in a persisted turn's accumulated assistant reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AccumulatedItem {
    #[serde(rename = "text")]
    Text { content: String },
    #[serde(rename = "echarts")]
    Echarts { content: String },
    #[serde(rename = "html_table")]
    HtmlTable { content: String },
    #[serde(rename = "file")]
    File { content: String },
    #[serde(rename = "tool_direct_answer")]
    ToolDirectAnswer { content: String },
}

/// Builds the structured list a conversation turn's assistant content is
/// rewritten to after every chunk. Adjacent text chunks are concatenated
/// into one item; every other type starts a new item. Heartbeats are
/// dropped before they ever reach this accumulator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccumulatedTurn {
    pub items: Vec<AccumulatedItem>,
}

impl AccumulatedTurn {
    pub fn push(&mut self, delta: &Delta) {
        if delta.delta_type == DeltaType::Heartbeat {
            return;
        }
        if delta.delta_type == DeltaType::Text {
            if let Some(AccumulatedItem::Text { content }) = self.items.last_mut() {
                content.push_str(&delta.content);
                return;
            }
        }
        let item = match delta.delta_type {
            DeltaType::Text => AccumulatedItem::Text { content: delta.content.clone() },
            DeltaType::Echarts => AccumulatedItem::Echarts { content: delta.content.clone() },
            DeltaType::HtmlTable => AccumulatedItem::HtmlTable { content: delta.content.clone() },
            DeltaType::File => AccumulatedItem::File { content: delta.content.clone() },
            DeltaType::ToolDirectAnswer => AccumulatedItem::ToolDirectAnswer { content: delta.content.clone() },
            DeltaType::Heartbeat => unreachable!("filtered above"),
        };
        self.items.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn frame_wraps_json_in_sse_event() {
        let chunk = Chunk::text("abc", "ragweave", 0, "hi");
        let framed = frame(&chunk);
        assert!(framed.starts_with("data: "));
        assert!(framed.ends_with("\n\n"));
        assert!(framed.contains("\"type\":\"text\""));
    }

    #[test]
    fn accumulator_merges_adjacent_text_chunks() {
        let mut turn = AccumulatedTurn::default();
        turn.push(&Delta { content: "hello ".into(), delta_type: DeltaType::Text });
        turn.push(&Delta { content: "world".into(), delta_type: DeltaType::Text });
        assert_eq!(turn.items.len(), 1);
        match &turn.items[0] {
            AccumulatedItem::Text { content } => assert_eq!(content, "hello world"),
            other => panic!("expected text item, got {other:?}"),
        }
    }

    #[test]
    fn accumulator_starts_new_item_for_non_text() {
        let mut turn = AccumulatedTurn::default();
        turn.push(&Delta { content: "hello".into(), delta_type: DeltaType::Text });
        turn.push(&Delta { content: "option={}".into(), delta_type: DeltaType::Echarts });
        turn.push(&Delta { content: " more".into(), delta_type: DeltaType::Text });
        assert_eq!(turn.items.len(), 3);
    }

    #[test]
    fn accumulator_drops_heartbeats() {
        let mut turn = AccumulatedTurn::default();
        turn.push(&Delta { content: String::new(), delta_type: DeltaType::Heartbeat });
        assert!(turn.items.is_empty());
    }

    #[tokio::test]
    async fn heartbeat_fires_when_channel_is_idle() {
        let (tx, rx) = mpsc::channel(8);
        let mut stream = Box::pin(with_heartbeat(rx, Duration::from_millis(20), "hb", "model"));
        tokio::time::sleep(Duration::from_millis(40)).await;
        let chunk = stream.next().await.unwrap();
        assert!(chunk.is_heartbeat());
        drop(tx);
    }

    #[tokio::test]
    async fn real_chunks_pass_through_without_heartbeat() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Chunk::text("id", "model", 0, "hi")).await.unwrap();
        drop(tx);
        let mut stream = Box::pin(with_heartbeat(rx, Duration::from_secs(5), "hb", "model"));
        let chunk = stream.next().await.unwrap();
        assert!(!chunk.is_heartbeat());
        assert!(stream.next().await.is_none());
    }
}
