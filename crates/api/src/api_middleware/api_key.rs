//! API-key admission for `/api/collection/*` write routes (§4.9, §9's "global
//! service factory" replacement and the Non-goals line "end-user auth/authz
//! beyond API-key admission for privileged endpoints"). There is no session or
//! user concept anywhere in this service — a single shared key either matches
//! or the request is rejected.

use axum::{extract::Request, extract::State, middleware::Next, response::Response};
use ipwatch_core::{Error, ErrorCode};

use crate::{error::ApiError, state::AppState};

pub const API_KEY_HEADER: &str = "x-api-key";

pub async fn api_key_middleware(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, ApiError> {
    if !state.ingest_enabled() {
        return Err(Error::new(
            ErrorCode::ServiceUnavailable,
            "privileged collection endpoints are disabled (no INGEST_API_KEY configured)",
        )
        .into());
    }

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if !state.ingest_key_matches(provided) {
        return Err(Error::new(ErrorCode::AuthenticationFailed, "missing or invalid X-API-Key").into());
    }

    Ok(next.run(request).await)
}
