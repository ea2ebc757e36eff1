//! `GET /health` (§6): liveness plus a database round-trip check. The Cache is
//! fail-open by design (§4.3) so it never reports unhealthy; its entry exists to
//! make the response shape self-documenting rather than to gate readiness.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::error;

use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy or degraded", body = Object),
        (status = 503, description = "Database is unreachable", body = Object),
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database_healthy = match state.store.check_health().await {
        Ok(()) => true,
        Err(err) => {
            error!(error = %err, "database health check failed");
            false
        }
    };

    let status = if database_healthy { "healthy" } else { "unhealthy" };
    let status_code = if database_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status_code,
        Json(json!({
            "status": status,
            "checks": {
                "database": database_healthy,
                "cache": true,
            },
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now(),
        })),
    )
}
