use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::services::{CompileError, CompilerBackendError};
use serde::Serialize;
use thiserror::Error;

use crate::services::GenerationError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        details: Vec<ValidationDetail>,
    },

    #[error("Invalid request: {message}")]
    InvalidRequest { code: String, message: String },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Generation failed: {message}")]
    GenerationFailed { code: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<ValidationDetail>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationDetail {
    pub field: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message, code, details) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None, None),
            ApiError::Validation { message, details } => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                message,
                None,
                (!details.is_empty()).then_some(details),
            ),
            ApiError::InvalidRequest { code, message } => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                message,
                Some(code),
                None,
            ),
            ApiError::RateLimited(msg) => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                msg,
                Some("MAX_CONCURRENT_GENERATIONS_EXCEEDED".to_string()),
                None,
            ),
            ApiError::GenerationFailed { code, message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "generation_failed",
                message,
                Some(code),
                None,
            ),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                    None,
                )
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg,
                None,
                None,
            ),
        };

        let body = ErrorBody {
            error: error.to_string(),
            message,
            code,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::InvalidRequest { code, message } => ApiError::InvalidRequest {
                code: code.to_string(),
                message,
            },
            GenerationError::MaxConcurrentGenerationsExceeded { .. } => {
                ApiError::RateLimited(err.to_string())
            }
            GenerationError::Compile(CompileError::Backend(
                CompilerBackendError::Timeout(_)
                | CompilerBackendError::Unavailable(_)
                | CompilerBackendError::CircuitOpen,
            ))
            | GenerationError::Cancelled => ApiError::ServiceUnavailable(err.to_string()),
            other => ApiError::GenerationFailed {
                code: other.code().to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| ValidationDetail {
                    field: field.to_string(),
                    message: e
                        .message
                        .clone()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string()),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));

        let message = if details.len() == 1 {
            details[0].message.clone()
        } else {
            format!("{} validation errors", details.len())
        };

        ApiError::Validation { message, details }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use validator::Validate;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[derive(Validate)]
    struct Payload {
        #[validate(length(min = 1, message = "html must not be empty"))]
        html: String,
    }

    #[tokio::test]
    async fn test_invalid_request_keeps_code() {
        let error: ApiError = GenerationError::InvalidRequest {
            code: "MISSING_SUBJECT",
            message: "Email subject is required".to_string(),
        }
        .into();
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "validation_error");
        assert_eq!(body["code"], "MISSING_SUBJECT");
        assert_eq!(body["message"], "Email subject is required");
    }

    #[test]
    fn test_ceiling_maps_to_429() {
        let error: ApiError = GenerationError::MaxConcurrentGenerationsExceeded { limit: 5 }.into();
        assert_eq!(error.into_response().status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_backend_outages_map_to_503() {
        for backend in [
            CompilerBackendError::Timeout(100),
            CompilerBackendError::Unavailable("down".into()),
            CompilerBackendError::CircuitOpen,
        ] {
            let error: ApiError =
                GenerationError::Compile(CompileError::Backend(backend)).into();
            assert_eq!(
                error.into_response().status(),
                StatusCode::SERVICE_UNAVAILABLE
            );
        }
        let error: ApiError = GenerationError::Cancelled.into();
        assert!(matches!(error, ApiError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_workflow_failure_maps_to_500_with_message() {
        let error: ApiError = GenerationError::Workflow("compiler exploded".into()).into();
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["code"], "WORKFLOW_FAILED");
        assert_eq!(body["message"], "MJML generation workflow failed: compiler exploded");
    }

    #[tokio::test]
    async fn test_internal_error_hides_message() {
        let response = ApiError::Internal("secret detail".into()).into_response();
        let body = body_json(response).await;
        assert_eq!(body["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn test_from_validation_errors() {
        let errors = Payload {
            html: String::new(),
        }
        .validate()
        .unwrap_err();
        let response = ApiError::from(errors).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["message"], "html must not be empty");
        assert_eq!(body["details"][0]["field"], "html");
    }

    #[test]
    fn test_api_error_display() {
        assert_eq!(
            ApiError::NotFound("test".to_string()).to_string(),
            "Not found: test"
        );
        assert_eq!(
            ApiError::ServiceUnavailable("test".to_string()).to_string(),
            "Service unavailable: test"
        );
    }
}
