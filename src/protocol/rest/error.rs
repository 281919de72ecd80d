//! HTTP error mapping.
//!
//! Flat `{success:false, message}` envelope, not a nested `{error:{code,
//! message}}` wrapper — see `DESIGN.md`'s REST error envelope decision.

use crate::error::AppError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

#[derive(Debug)]
pub struct RestError {
    pub status: StatusCode,
    pub message: String,
}

impl RestError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        RestError { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "success": false,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

/// Maps the crate-wide error taxonomy onto HTTP status codes per the
/// propagation table: Validation->400, Authorization->401, NotFound->404,
/// UpstreamUnavailable->503, PipelineFatal/RetryExhausted->500.
/// `PipelineStepFailed` never reaches this boundary — it is always carried
/// inside a streamed 200 OK response instead of a rejected request.
impl From<AppError> for RestError {
    fn from(err: AppError) -> Self {
        let status = match &err {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Authorization { .. } => StatusCode::UNAUTHORIZED,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::PipelineStepFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::PipelineFatal { .. } | AppError::RetryExhausted { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        RestError { status, message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let err: RestError = AppError::validation("missing field").into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn authorization_maps_to_unauthorized() {
        let err: RestError = AppError::authorization("bad credentials").into();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn not_found_maps_to_404() {
        let err: RestError = AppError::not_found("no such kb").into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn upstream_unavailable_maps_to_503() {
        let err: RestError = AppError::upstream_unavailable("llm", "disabled").into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn pipeline_fatal_maps_to_500() {
        let err: RestError = AppError::pipeline_fatal("no candidate tables").into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn retry_exhausted_maps_to_500() {
        let err: RestError =
            AppError::RetryExhausted { attempts: 3, last_error: "bad column".into() }.into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn response_body_is_flat() {
        let err = RestError::bad_request("nope");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
