//! `/api/collection/*` (§6): the write surface. Trigger/credentials/status are
//! scoped to the API-key middleware (`api_middleware::api_key`); ingest additionally
//! requires the key to be non-empty in configuration at all (§4.9).

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use ipwatch_core::{CollectionCredential, Error, ErrorCode, ServiceState, TriggerType};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize, Default)]
pub struct TriggerRequest {
    #[serde(default)]
    pub force: bool,
}

#[utoipa::path(
    post,
    path = "/api/collection/trigger/{service}",
    responses(
        (status = 200, description = "Run queued", body = Object),
        (status = 400, description = "Service is disabled", body = Object),
        (status = 404, description = "Unknown service", body = Object),
        (status = 409, description = "Collection already running", body = Object),
    ),
    tag = "collection"
)]
pub async fn trigger(
    State(state): State<AppState>,
    Path(service): Path<String>,
    body: Option<Json<TriggerRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let force = body.map(|Json(b)| b.force).unwrap_or(false);

    let credential = state
        .store
        .get_credential(&service)
        .await?
        .ok_or_else(|| Error::new(ErrorCode::ResourceNotFound, format!("unknown service {service}")))?;

    if !credential.enabled && !force {
        return Err(Error::new(ErrorCode::ValidationFailed, format!("{service} collection is disabled")).into());
    }

    if let Some(status) = state.store.get_status(&service).await? {
        if status.status == ServiceState::Running {
            return Err(Error::new(ErrorCode::JobAlreadyRunning, "Collection already running").into());
        }
    }

    state.scheduler.trigger(&service, TriggerType::Api).await?;

    Ok(Json(json!({ "queued": true })))
}

#[utoipa::path(
    post,
    path = "/api/collection/cancel/{service}",
    responses(
        (status = 200, description = "Cancellation signal delivered", body = Object),
        (status = 404, description = "No run currently in progress for this service", body = Object),
    ),
    tag = "collection"
)]
pub async fn cancel(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let cancelled = state.scheduler.cancel(&service).await;
    if !cancelled {
        return Err(Error::new(
            ErrorCode::ResourceNotFound,
            format!("no collection currently running for {service}"),
        )
        .into());
    }
    Ok(Json(json!({ "service": service, "cancelled": true })))
}

#[derive(Debug, Deserialize)]
pub struct CredentialRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub config: serde_json::Value,
    pub collection_interval_seconds: Option<i64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct CredentialView {
    pub service: String,
    pub username: String,
    pub enabled: bool,
    pub is_active: bool,
    pub collection_interval_seconds: i64,
}

#[utoipa::path(
    put,
    path = "/api/collection/credentials/{service}",
    responses(
        (status = 200, description = "Credential stored", body = Object),
        (status = 400, description = "Validation failed", body = Object),
        (status = 404, description = "Unknown service", body = Object),
    ),
    tag = "collection"
)]
pub async fn put_credentials(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Json(request): Json<CredentialRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.is_known_service(&service) {
        return Err(Error::new(ErrorCode::ResourceNotFound, format!("no collector registered for {service}")).into());
    }
    if request.username.trim().is_empty() || request.password.is_empty() {
        return Err(Error::new(ErrorCode::ValidationFailed, "username and password are required").into());
    }

    let ciphertext = state
        .vault
        .encrypt(&request.password)
        .map_err(|err| Error::new(ErrorCode::EncryptionError, err.to_string()))?;

    let credential = CollectionCredential {
        id: uuid::Uuid::new_v4(),
        service: service.clone(),
        username: request.username,
        password: ciphertext,
        encrypted: true,
        config: request.config,
        is_active: request.is_active,
        enabled: request.enabled,
        collection_interval_seconds: request.collection_interval_seconds.unwrap_or(21_600),
        last_collection_at: None,
        last_test_result: None,
        last_test_message: None,
        last_test_at: None,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };

    let stored = state.store.upsert_credential(&credential).await?;

    Ok(Json(CredentialView {
        service: stored.service,
        username: stored.username,
        enabled: stored.enabled,
        is_active: stored.is_active,
        collection_interval_seconds: stored.collection_interval_seconds,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub enabled: bool,
}

#[utoipa::path(
    put,
    path = "/api/collection/status/{service}",
    responses(
        (status = 200, description = "Enabled flag updated", body = Object),
        (status = 404, description = "Unknown service", body = Object),
    ),
    tag = "collection"
)]
pub async fn put_status(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state.store.set_credential_enabled(&service, request.enabled).await?;
    if !updated {
        return Err(Error::new(ErrorCode::ResourceNotFound, format!("unknown service {service}")).into());
    }
    Ok(Json(json!({ "service": service, "enabled": request.enabled })))
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub service: String,
    pub records: Vec<ipwatch_collector::RawRow>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub inserted: u64,
    pub updated: u64,
    pub errors: u64,
    pub total: u64,
}

#[utoipa::path(
    post,
    path = "/api/collection/ingest",
    responses(
        (status = 200, description = "Batch upserted", body = Object),
        (status = 401, description = "Missing or invalid X-API-Key", body = Object),
    ),
    tag = "collection"
)]
pub async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let total = request.records.len() as u64;
    let outcome = state.collector.ingest_rows(&request.service, &request.records).await?;

    Ok(Json(IngestResponse {
        inserted: outcome.inserted,
        updated: outcome.updated,
        errors: outcome.failed,
        total,
    }))
}
