//! # API Error Type
//!
//! Unified error type for HTTP handlers.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Error Flow in the Storefront API                      │
//! │                                                                         │
//! │  Handler                                                                │
//! │  Result<Json<T>, ApiError>                                              │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  FulfillmentError::Lifecycle(CoreError) ── validation ──► 400          │
//! │                                          ── invariant ──► 409          │
//! │  FulfillmentError::OrderNotFound ────────────────────────► 404          │
//! │  FulfillmentError::Database(DbError) ────────────────────► 500 / 503    │
//! │  FulfillmentError::Gateway* ─────────────────────────────► 502 / 503    │
//! │                                                                         │
//! │  Body: { "code": "CONFLICT", "reason": "ORDER_NOT_CANCELLABLE",        │
//! │          "message": "Order ATK-2024-001 is shipped and can ..." }      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `code` picks the HTTP status; `reason`, when present, is the stable
//! lifecycle error code the storefront UI switches on.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use pustakam_core::{CoreError, ErrorCategory, ValidationError};
use pustakam_db::DbError;
use pustakam_fulfillment::FulfillmentError;

/// API error returned from handlers.
///
/// ## Serialization
/// ```json
/// {
///   "code": "NOT_FOUND",
///   "message": "Order not found: ATK-2024-042"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error class
    pub code: ErrorCode,

    /// Lifecycle error code, when the failure came from an order rule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,

    /// Human-readable error message for display
    pub message: String,
}

/// Error classes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Order not found (404)
    NotFound,

    /// Input validation failed (400)
    ValidationError,

    /// Order state forbids the operation (409)
    Conflict,

    /// Database operation failed (500)
    DatabaseError,

    /// Payment gateway or courier answered with an error (502)
    GatewayError,

    /// Temporarily unavailable, retry later (503)
    Unavailable,

    /// Internal server error (500)
    Internal,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::DatabaseError | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::GatewayError => StatusCode::BAD_GATEWAY,
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            reason: None,
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => ApiError::new(
                ErrorCode::Conflict,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                ApiError::validation("Invalid reference")
            }
            DbError::Busy(_) | DbError::PoolExhausted => {
                ApiError::new(ErrorCode::Unavailable, "Database busy, retry shortly")
            }
            DbError::ConnectionFailed(_) => {
                ApiError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            e => {
                // Log the actual error but return a generic message
                tracing::error!("Database operation failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts lifecycle errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let code = match err.category() {
            ErrorCategory::Validation => ErrorCode::ValidationError,
            ErrorCategory::InvariantViolation => ErrorCode::Conflict,
        };
        ApiError {
            code,
            reason: Some(err.code()),
            message: err.to_string(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::from(CoreError::from(err))
    }
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        match err {
            FulfillmentError::Lifecycle(e) => e.into(),
            FulfillmentError::OrderNotFound(id) => ApiError::not_found("Order", &id),
            FulfillmentError::Database(e) => e.into(),
            FulfillmentError::GatewayUnavailable(msg) => ApiError::new(ErrorCode::Unavailable, msg),
            FulfillmentError::ShuttingDown => {
                ApiError::new(ErrorCode::Unavailable, "Server is shutting down")
            }
            FulfillmentError::GatewayRejected { .. } | FulfillmentError::InvalidResponse(_) => {
                ApiError::new(ErrorCode::GatewayError, err.to_string())
            }
            e => {
                tracing::error!("Internal error: {}", e);
                ApiError::internal("Internal error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}
