//! `/api/stats*` (§6): the cached aggregate snapshot, the timeline, and recent
//! collection history.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::{error::ApiError, state::AppState};

#[utoipa::path(
    get,
    path = "/api/stats",
    responses((status = 200, description = "Aggregate stats snapshot", body = Object)),
    tag = "stats"
)]
pub async fn overview(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.query.stats().await?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    pub days: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/stats/timeline",
    responses((status = 200, description = "Per-day counts grouped by source", body = Object)),
    tag = "stats"
)]
pub async fn timeline(
    State(state): State<AppState>,
    Query(params): Query<TimelineQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let points = state.query.timeline(params.days.unwrap_or(30)).await?;
    Ok(Json(points))
}

#[derive(Debug, Deserialize)]
pub struct CollectionHistoryQuery {
    pub service: Option<String>,
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/stats/collection",
    responses((status = 200, description = "Recent collection history", body = Object)),
    tag = "stats"
)]
pub async fn collection_history(
    State(state): State<AppState>,
    Query(params): Query<CollectionHistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let history = state
        .query
        .collection_history(params.service.as_deref(), params.limit.unwrap_or(50))
        .await?;
    Ok(Json(history))
}
