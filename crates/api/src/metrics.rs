//! `GET {metrics.path}` (§2 Observability, ambient): Prometheus text exposition
//! of collection metrics, gated by `MetricsConfig.enabled` rather than by a
//! route that's conditionally registered — disabling metrics in config still
//! serves a 200 with a one-line placeholder body, matching `MetricsService`'s
//! own fail-open posture.

use axum::{extract::State, http::header, response::IntoResponse};

use crate::state::AppState;

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics.get_metrics();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
