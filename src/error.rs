//! Core error taxonomy shared by every component.
//!
//! Mirrors the propagation policy from the design: validation/authorization
//! are handled at the request adapter, `NotFound` at the catalog boundary,
//! `UpstreamUnavailable` is swallowed inside the component that owns the
//! backend, `PipelineStepFailed` is handled by each pipeline stage guard, and
//! `PipelineFatal` bubbles up to the streaming transport which frames it as a
//! terminal chunk.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum AppError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("authorization error: {message}")]
    Authorization { message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    /// A backend (vector/inverted/graph/LLM) is disabled or unreachable.
    /// Components that can, swallow this and return empty results instead
    /// of propagating it; it is exposed here for the cases where a caller
    /// explicitly needs to know evidence was skipped.
    #[error("upstream unavailable: {backend}: {message}")]
    UpstreamUnavailable { backend: String, message: String },

    /// A pipeline stage failed but the pipeline may continue with reduced
    /// evidence. Carried forward as a step chunk; downstream stages that
    /// require the failed stage's output skip themselves.
    #[error("pipeline step '{step}' failed: {message}")]
    PipelineStepFailed { step: String, message: String },

    /// Unrecoverable: the pipeline emits a final error chunk and closes.
    #[error("pipeline fatal: {message}")]
    PipelineFatal { message: String },

    /// The SQL correction loop exceeded `max_retries`. Treated as
    /// `PipelineFatal` with the last reported errors attached.
    #[error("retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization { message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    pub fn upstream_unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable { backend: backend.into(), message: message.into() }
    }

    pub fn pipeline_step_failed(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PipelineStepFailed { step: step.into(), message: message.into() }
    }

    pub fn pipeline_fatal(message: impl Into<String>) -> Self {
        Self::PipelineFatal { message: message.into() }
    }

    /// True for the error kinds that should terminate a streaming response
    /// with a terminal error chunk rather than letting the pipeline continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PipelineFatal { .. } | Self::RetryExhausted { .. })
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => {
                Self::not_found("requested row does not exist")
            }
            other => Self::pipeline_fatal(format!("catalog error: {other}")),
        }
    }
}

impl From<r2d2::Error> for AppError {
    fn from(e: r2d2::Error) -> Self {
        Self::pipeline_fatal(format!("catalog pool error: {e}"))
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(AppError::pipeline_fatal("x").is_fatal());
        assert!(AppError::RetryExhausted { attempts: 3, last_error: "x".into() }.is_fatal());
        assert!(!AppError::not_found("x").is_fatal());
        assert!(!AppError::pipeline_step_failed("s", "x").is_fatal());
    }

    #[test]
    fn display_messages_carry_context() {
        let e = AppError::upstream_unavailable("milvus", "disabled");
        assert!(e.to_string().contains("milvus"));
        assert!(e.to_string().contains("disabled"));
    }
}
