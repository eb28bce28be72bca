//! System/health API handlers.
//!
//! # Key invariants and assumptions
//! - Health checks must be fast and side-effect free.
//! - An unhealthy store answers 503 so health checks can tell it apart from a bug.
use crate::api::error::{ApiError, api_unavailable};
use crate::api::types::{ErrorResponse, HealthStatus};
use crate::app::AppState;
use axum::Json;
use axum::extract::State;

#[utoipa::path(
    get,
    path = "/api/system/health",
    tag = "system",
    responses(
        (status = 200, description = "Catalog health", body = HealthStatus),
        (status = 503, description = "Storage unavailable", body = ErrorResponse)
    )
)]
/// Ping the backing store and report `ok` if it answers.
pub async fn system_health(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, ApiError> {
    let check = tokio::time::timeout(state.store_timeout, state.store.health_check()).await;
    match check {
        Ok(Ok(())) => Ok(Json(HealthStatus {
            status: "ok".to_string(),
            storage: state.store.backend_name().to_string(),
        })),
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "storage health check failed");
            Err(api_unavailable())
        }
        Err(_) => {
            tracing::warn!("storage health check timed out");
            Err(api_unavailable())
        }
    }
}
