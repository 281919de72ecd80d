//! Chat/embedding model client (external collaborator).
//!
//! `LlmClient` is the seam every pipeline calls through. The only concrete
//! implementation is an OpenAI-compatible HTTP client; tests and the mock
//! server use [`MockLlmClient`] instead of standing up a real endpoint.

pub mod openai;

use crate::error::AppResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage { role: "user".into(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage { role: "assistant".into(), content: content.into() }
    }
}

/// One incremental piece of a streamed chat completion.
#[derive(Debug, Clone)]
pub struct ChatDelta {
    pub content: String,
    pub finished: bool,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Non-streaming chat completion; used by pipeline stages that need a
    /// single structured answer (entity resolution, SQL drafting, ...).
    async fn chat(&self, messages: &[ChatMessage]) -> AppResult<String>;

    /// Streaming chat completion. Deltas are handed to `on_delta` as they
    /// arrive; the final call has `finished: true` and empty content.
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        on_delta: &mut (dyn FnMut(ChatDelta) + Send),
    ) -> AppResult<()>;

    async fn embed(&self, text: &str) -> AppResult<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn embedding_dim(&self) -> usize;
}

/// Deterministic client for tests and offline operation: `chat` echoes the
/// last user message, `embed` hashes the text into a fixed-dimension unit
/// vector. Never calls out over the network.
pub struct MockLlmClient {
    dim: usize,
}

impl MockLlmClient {
    pub fn new(dim: usize) -> Self {
        MockLlmClient { dim }
    }

    fn hash_embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % self.dim] += f32::from(byte);
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 1e-10 {
            for x in &mut vector {
                *x /= norm;
            }
        } else {
            vector[0] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat(&self, messages: &[ChatMessage]) -> AppResult<String> {
        Ok(messages.last().map(|m| m.content.clone()).unwrap_or_default())
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        on_delta: &mut (dyn FnMut(ChatDelta) + Send),
    ) -> AppResult<()> {
        let reply = self.chat(messages).await?;
        for word in reply.split_whitespace() {
            on_delta(ChatDelta { content: format!("{word} "), finished: false });
        }
        on_delta(ChatDelta { content: String::new(), finished: true });
        Ok(())
    }

    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        Ok(self.hash_embed(text))
    }

    fn embedding_dim(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_chat_echoes_last_message() {
        let client = MockLlmClient::new(8);
        let reply = client
            .chat(&[ChatMessage::system("sys"), ChatMessage::user("hello")])
            .await
            .unwrap();
        assert_eq!(reply, "hello");
    }

    #[tokio::test]
    async fn mock_embed_is_deterministic_and_unit_norm() {
        let client = MockLlmClient::new(16);
        let a = client.embed("revenue by region").await.unwrap();
        let b = client.embed("revenue by region").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn mock_chat_stream_emits_a_terminal_delta() {
        let client = MockLlmClient::new(8);
        let mut deltas = Vec::new();
        client
            .chat_stream(&[ChatMessage::user("a b c")], &mut |d| deltas.push(d))
            .await
            .unwrap();
        assert!(deltas.last().unwrap().finished);
    }
}
