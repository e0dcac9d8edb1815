//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use campused_core::BillingError;
use campused_store::StoreError;

use crate::documents::DocumentError;
use crate::llm::LlmError;

/// Message shown when a caller has no tokens left.
pub const INSUFFICIENT_TOKENS_MESSAGE: &str = "Insufficient tokens. Please upgrade your plan.";

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but insufficient permissions.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists or invalid state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller has no tokens left.
    #[error("insufficient tokens: remaining={remaining_tokens}")]
    InsufficientTokens {
        /// Tokens remaining on the caller's balance.
        remaining_tokens: i64,
    },

    /// The feature is not configured on this deployment.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

/// Flat body of the insufficient-tokens rejection.
#[derive(Debug, Serialize)]
struct InsufficientTokensResponse {
    error: &'static str,
    remaining_tokens: i64,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::InsufficientTokens { remaining_tokens } => {
                return (
                    StatusCode::PAYMENT_REQUIRED,
                    Json(InsufficientTokensResponse {
                        error: INSUFFICIENT_TOKENS_MESSAGE,
                        remaining_tokens: *remaining_tokens,
                    }),
                )
                    .into_response();
            }
            Self::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                msg.clone(),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::InsufficientBalance { remaining, .. } => Self::InsufficientTokens {
                remaining_tokens: remaining,
            },
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::InvalidAmount(msg) => Self::BadRequest(msg),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InsufficientBalance { remaining, .. } => Self::InsufficientTokens {
                remaining_tokens: remaining,
            },
            BillingError::Validation { field, message } => {
                Self::BadRequest(format!("{field}: {message}"))
            }
            BillingError::InvalidId(e) => Self::BadRequest(e.to_string()),
            BillingError::InvalidAmount(msg) => Self::BadRequest(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::NotConfigured => Self::Unavailable("Language model is not configured".into()),
            other => {
                tracing::error!(error = %other, "Language model call failed");
                Self::ExternalService("Language model request failed".into())
            }
        }
    }
}

impl From<DocumentError> for ApiError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::Task(msg) => Self::Internal(msg),
            other => Self::BadRequest(other.to_string()),
        }
    }
}
