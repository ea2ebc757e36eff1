//! `/api/blacklist/*` (§6): the paginated list, single-IP lookup, and substring
//! search routes. All reads go through `AppState::query` (§4.9's cache-fronted
//! Query Service) rather than the Store directly.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use ipwatch_core::BlacklistFilter;
use serde::Deserialize;
use std::str::FromStr;

use crate::{error::ApiError, state::AppState};

use super::validate_pagination;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub source: Option<String>,
    pub category: Option<String>,
    pub country: Option<String>,
    pub active: Option<bool>,
    pub ip_prefix: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/blacklist/list",
    responses((status = 200, description = "Paginated blacklist records", body = Object)),
    tag = "blacklist"
)]
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let pagination = validate_pagination(params.page, params.limit)?;
    let filter = BlacklistFilter {
        source: params.source,
        category: params.category,
        country: params.country,
        active: params.active,
        ip_prefix: params.ip_prefix,
    };

    let result = state.query.list(filter, pagination).await?;
    Ok(Json(result))
}

#[utoipa::path(
    get,
    path = "/api/blacklist/{ip}",
    responses(
        (status = 200, description = "All records for the IP", body = Object),
        (status = 400, description = "Malformed IP address", body = Object),
    ),
    tag = "blacklist"
)]
pub async fn get_by_ip(
    State(state): State<AppState>,
    Path(ip): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = parse_ip(&ip)?;
    let records = state.query.get_by_ip(ip).await?;
    Ok(Json(records))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/blacklist/search",
    responses((status = 200, description = "Matching blacklist records", body = Object)),
    tag = "blacklist"
)]
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state.query.search(&params.q, params.limit.unwrap_or(50)).await?;
    Ok(Json(records))
}

pub(crate) fn parse_ip(raw: &str) -> Result<ipnetwork::IpNetwork, ApiError> {
    std::net::IpAddr::from_str(raw)
        .map(ipnetwork::IpNetwork::from)
        .map_err(|_| {
            ipwatch_core::Error::new(ipwatch_core::ErrorCode::ValidationFailed, format!("invalid IP address: {raw}"))
                .into()
        })
}
