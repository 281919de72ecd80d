//! OpenAI-compatible chat/embedding client.
//!
//! Talks to any endpoint implementing the `/chat/completions` and
//! `/embeddings` surface (OpenAI itself, or a self-hosted compatible
//! gateway) via [`reqwest`]. Retries transient failures up to
//! [`crate::config::LlmConfig::max_retries`] times with linear backoff.

use crate::config::LlmConfig;
use crate::error::{AppError, AppResult};
use crate::llm::{ChatDelta, ChatMessage, LlmClient};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    config: LlmConfig,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, config: LlmConfig) -> Self {
        OpenAiClient {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            config,
        }
    }

    async fn retrying<F, Fut, T>(&self, mut attempt: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = AppResult<T>>,
    {
        let mut last_error = None;
        for attempt_number in 0..=self.config.max_retries {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    last_error = Some(err);
                    if attempt_number < self.config.max_retries {
                        tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt_number + 1)))
                            .await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            AppError::upstream_unavailable("llm", "exhausted retries with no recorded error")
        }))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, messages: &[ChatMessage]) -> AppResult<String> {
        self.retrying(|| async {
            let request = ChatRequest { model: &self.config.chat_model, messages, stream: false };
            let response = self
                .http
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| AppError::upstream_unavailable("llm", e.to_string()))?;
            let parsed: ChatResponse = response
                .error_for_status()
                .map_err(|e| AppError::upstream_unavailable("llm", e.to_string()))?
                .json()
                .await
                .map_err(|e| AppError::upstream_unavailable("llm", e.to_string()))?;
            parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| AppError::upstream_unavailable("llm", "empty choices array"))
        })
        .await
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        on_delta: &mut (dyn FnMut(ChatDelta) + Send),
    ) -> AppResult<()> {
        let request = ChatRequest { model: &self.config.chat_model, messages, stream: true };
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::upstream_unavailable("llm", e.to_string()))?
            .error_for_status()
            .map_err(|e| AppError::upstream_unavailable("llm", e.to_string()))?;

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AppError::upstream_unavailable("llm", e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buffer.find("\n\n") {
                let event = buffer[..pos].trim().to_string();
                buffer.drain(..pos + 2);
                let Some(payload) = event.strip_prefix("data: ") else { continue };
                if payload == "[DONE]" {
                    on_delta(ChatDelta { content: String::new(), finished: true });
                    return Ok(());
                }
                let Ok(parsed) = serde_json::from_str::<StreamChunk>(payload) else { continue };
                for choice in parsed.choices {
                    if let Some(content) = choice.delta.content {
                        on_delta(ChatDelta { content, finished: false });
                    }
                    if choice.finish_reason.is_some() {
                        on_delta(ChatDelta { content: String::new(), finished: true });
                        return Ok(());
                    }
                }
            }
        }
        on_delta(ChatDelta { content: String::new(), finished: true });
        Ok(())
    }

    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let embeddings = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::upstream_unavailable("llm", "empty embedding response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        self.retrying(|| async {
            let request = EmbeddingRequest { model: &self.config.embedding_model, input: texts };
            let response = self
                .http
                .post(format!("{}/embeddings", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| AppError::upstream_unavailable("llm", e.to_string()))?;
            let parsed: EmbeddingResponse = response
                .error_for_status()
                .map_err(|e| AppError::upstream_unavailable("llm", e.to_string()))?
                .json()
                .await
                .map_err(|e| AppError::upstream_unavailable("llm", e.to_string()))?;
            Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
        })
        .await
    }

    fn embedding_dim(&self) -> usize {
        // The embedding model name determines dimension server-side; callers
        // that need it before the first call should read it from VectorConfig.
        1536
    }
}
