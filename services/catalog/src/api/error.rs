//! API error types and helpers.
//!
//! # Purpose and responsibility
//! Centralizes HTTP error construction so every endpoint answers with the
//! same `{"description": ...}` body, and maps store, validation and
//! authorization failures to status codes in one place.
//!
//! # Key invariants and assumptions
//! - Authentication and authorization failures are indistinguishable to
//!   clients: 401 with `Not Authorized`.
//! - Transient store failures are 503 and safe to retry.
//!
//! # Security considerations
//! - Internal errors are logged server-side and returned as generic messages.
use crate::api::types::ErrorResponse;
use crate::auth::AuthError;
use crate::auth::grants::GrantError;
use crate::model::ValidationError;
use crate::observability::STORE_TRANSIENT_FAILURES_TOTAL;
use crate::store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

pub const NOT_AUTHORIZED: &str = "Not Authorized";
pub const SERVICE_UNAVAILABLE: &str = "Service Unavailable";

/// Structured API error returned by handlers.
///
/// # Example
/// ```rust
/// use axum::http::StatusCode;
/// use catalog::api::error::api_not_found;
///
/// let err = api_not_found("installable 4 not found");
/// assert_eq!(err.status, StatusCode::NOT_FOUND);
/// ```
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn api_error(status: StatusCode, description: impl Into<String>) -> ApiError {
    ApiError {
        status,
        body: ErrorResponse {
            description: description.into(),
        },
    }
}

pub fn api_not_found(message: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, message)
}

pub fn api_conflict(message: &str) -> ApiError {
    api_error(StatusCode::CONFLICT, message)
}

/// 401 with the fixed body. The cause belongs in the audit log, not here.
pub fn api_unauthorized() -> ApiError {
    api_error(StatusCode::UNAUTHORIZED, NOT_AUTHORIZED)
}

pub fn api_unavailable() -> ApiError {
    metrics::counter!(STORE_TRANSIENT_FAILURES_TOTAL).increment(1);
    api_error(StatusCode::SERVICE_UNAVAILABLE, SERVICE_UNAVAILABLE)
}

pub fn api_validation_error(message: &str) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, message)
}

pub fn api_method_not_allowed(message: &str) -> ApiError {
    api_error(StatusCode::METHOD_NOT_ALLOWED, message)
}

/// Log the cause and return a generic 500.
pub fn api_internal(message: &str, err: &dyn std::fmt::Debug) -> ApiError {
    tracing::error!(error = ?err, "{message}");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, message)
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => api_not_found(&format!("{what} not found")),
            StoreError::Conflict(what) => api_conflict(&format!("conflict: {what}")),
            StoreError::Transient(detail) => {
                tracing::warn!(%detail, "transient store failure");
                api_unavailable()
            }
            StoreError::Unexpected(err) => api_internal("storage failure", &err),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        api_validation_error(&err.0)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated(_)
            | AuthError::ActorNotFound(_)
            | AuthError::NotAuthorized(_) => api_unauthorized(),
            AuthError::Store(err) => err.into(),
        }
    }
}

impl From<GrantError> for ApiError {
    fn from(err: GrantError) -> Self {
        match err {
            GrantError::Invalid(err) => err.into(),
            GrantError::Store(err) => err.into(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        api_validation_error(&format!("invalid payload: {err}"))
    }
}
