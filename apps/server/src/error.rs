//! # API Error Type
//!
//! Unified error type for HTTP handlers.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Barback                                │
//! │                                                                         │
//! │  Handler: Result<Json<T>, ApiError>                                     │
//! │         │                                                               │
//! │         ├── ValidationError ──────────┐                                 │
//! │         ├── CoreError ────────────────┤                                 │
//! │         ├── DbError ──────────────────┼──► ApiError ──► IntoResponse    │
//! │         ├── bad JSON / query string ──┤        │                        │
//! │         └── Stripe / scrape failure ──┘        ▼                        │
//! │                                         status + JSON body              │
//! │                                                                         │
//! │  { "error": { "code": "NOT_FOUND", "message": "...", "details": null } }│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Details in Production
//! Internal errors carry their cause in `details`. The response is tagged
//! with the error, and [`hide_internal_details`] strips that cause when the
//! server is not running in development.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use barback_core::{CoreError, ValidationError};
use barback_db::DbError;

use crate::AppState;

/// Result type for handlers and services.
pub type ApiResult<T> = Result<T, ApiError>;

/// API error returned from handlers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,

    /// Structured context: the offending field, stock figures, or the
    /// underlying cause of an internal error.
    pub details: Option<Value>,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input validation failed (400)
    ValidationError,

    /// Missing or invalid credentials (401)
    Unauthorized,

    /// Authenticated but not allowed (403)
    Forbidden,

    /// Resource not found (404)
    NotFound,

    /// Duplicate, insufficient stock, or wrong state (409)
    Conflict,

    /// Stripe or scrape target failed (502)
    Upstream,

    /// Internal server error (500)
    Internal,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::Upstream => StatusCode::BAD_GATEWAY,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Creates a not found error.
    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Unauthorized, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Conflict, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Upstream, message)
    }

    /// Creates an internal error. The cause is logged and kept in `details`.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        let cause = cause.to_string();
        tracing::error!(%cause, "Internal error");
        ApiError::new(ErrorCode::Internal, "Internal server error").with_details(json!({ "cause": cause }))
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": &self }));
        let mut response = (self.code.status(), body).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// Re-renders internal errors without their cause outside development.
pub async fn hide_internal_details(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if state.config.is_development() {
        return response;
    }

    match response.extensions().get::<ApiError>() {
        Some(err) if err.code == ErrorCode::Internal && err.details.is_some() => {
            let mut redacted = err.clone();
            redacted.details = None;
            redacted.into_response()
        }
        _ => response,
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => {
                ApiError::conflict(format!("{} '{}' already exists", field, value)).with_details(json!({ "field": field }))
            }
            DbError::ForeignKeyViolation { message } => {
                tracing::warn!("Foreign key violation: {}", message);
                ApiError::validation("Invalid reference")
            }
            DbError::InvalidState { entity, id, status } => {
                ApiError::conflict(format!("{} {} is {}", entity, id, status)).with_details(json!({ "status": status }))
            }
            DbError::InsufficientStock {
                product_id,
                name,
                available,
                required,
            } => ApiError::conflict(format!(
                "Insufficient stock for {}: {} available, {} required",
                name, available, required
            ))
            .with_details(json!({
                "productId": product_id,
                "available": available,
                "required": required,
            })),
            other => ApiError::internal(other),
        }
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductNotFound(id) => ApiError::not_found("Product", &id),
            CoreError::RecipeNotFound(id) => ApiError::not_found("Recipe", &id),
            CoreError::InsufficientStock { .. } | CoreError::InvalidSaleStatus { .. } | CoreError::TabNotOpen { .. } => {
                ApiError::conflict(err.to_string())
            }
            CoreError::Validation(e) => e.into(),
            CoreError::CartTooLarge { .. }
            | CoreError::EmptyCart
            | CoreError::QuantityTooLarge { .. }
            | CoreError::InvalidPaymentAmount { .. }
            | CoreError::Csv(_) => ApiError::validation(err.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string()).with_details(json!({ "field": err.field() }))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let stock: ApiError = DbError::InsufficientStock {
            product_id: "p1".to_string(),
            name: "Gin".to_string(),
            available: 0.5,
            required: 1.0,
        }
        .into();
        assert_eq!(stock.code.status(), StatusCode::CONFLICT);
        assert_eq!(stock.details.unwrap()["productId"], "p1");

        let dup: ApiError = DbError::duplicate("users.username", "sam").into();
        assert_eq!(dup.code, ErrorCode::Conflict);

        let closed: ApiError = DbError::invalid_state("Tab", "t1", "closed").into();
        assert_eq!(closed.code, ErrorCode::Conflict);

        let missing: ApiError = CoreError::RecipeNotFound("r1".to_string()).into();
        assert_eq!(missing.code.status(), StatusCode::NOT_FOUND);

        let empty: ApiError = CoreError::EmptyCart.into();
        assert_eq!(empty.code.status(), StatusCode::BAD_REQUEST);

        let broken: ApiError = DbError::QueryFailed("disk I/O error".to_string()).into();
        assert_eq!(broken.code.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(broken.message, "Internal server error");
    }

    #[test]
    fn test_validation_error_names_field() {
        let err: ApiError = ValidationError::Required {
            field: "username".to_string(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.details.unwrap()["field"], "username");
    }

    #[test]
    fn test_error_code_serialization() {
        let body = serde_json::to_value(ApiError::upstream("Stripe is down")).unwrap();
        assert_eq!(body["code"], "UPSTREAM");
        assert_eq!(body["details"], Value::Null);
    }
}
