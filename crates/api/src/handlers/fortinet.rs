//! `/api/fortinet/*` (§6): firewall-consumable renderings of the active-IP feed.
//! Both routes share the same best-effort `FirewallPullLog` write (§4.9) keyed off
//! whatever device identity headers the caller sent.

use axum::{extract::State, http::HeaderMap, response::IntoResponse};
use serde::Serialize;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Serialize)]
struct ThreatFeedCommand {
    entries: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ThreatFeedResponse {
    commands: Vec<ThreatFeedCommand>,
}

#[utoipa::path(
    get,
    path = "/api/fortinet/threat-feed",
    responses((status = 200, description = "Active IPs as a Fortinet threat-feed command block", body = Object)),
    tag = "fortinet"
)]
pub async fn threat_feed(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let started = std::time::Instant::now();
    let ips = state.query.firewall_feed().await?;
    let entries: Vec<String> = ips.iter().map(|ip| ip.ip().to_string()).collect();
    let count = entries.len();

    record_pull(&state, &headers, "/api/fortinet/threat-feed", count as i32, started).await;

    Ok(axum::Json(ThreatFeedResponse {
        commands: vec![ThreatFeedCommand { entries }],
    }))
}

#[utoipa::path(
    get,
    path = "/api/fortinet/blocklist",
    responses((status = 200, description = "Active IPs, one per line", body = String)),
    tag = "fortinet"
)]
pub async fn blocklist(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let started = std::time::Instant::now();
    let ips = state.query.firewall_feed().await?;
    let lines: Vec<String> = ips.iter().map(|ip| ip.ip().to_string()).collect();
    let count = lines.len();
    let body = lines.join("\n");

    record_pull(&state, &headers, "/api/fortinet/blocklist", count as i32, started).await;

    Ok(([("content-type", "text/plain; charset=utf-8")], body))
}

async fn record_pull(
    state: &AppState,
    headers: &HeaderMap,
    path: &str,
    entry_count: i32,
    started: std::time::Instant,
) {
    let device_ip = headers.get("x-device-ip").and_then(|v| v.to_str().ok());
    let user_agent = headers.get("user-agent").and_then(|v| v.to_str().ok());
    state
        .query
        .record_firewall_pull(device_ip, user_agent, path, entry_count, started.elapsed().as_millis() as i64)
        .await;
}
