use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ipwatch_core::Error;
use serde_json::json;
use std::env;
use tracing::{error, warn};

/// API error wrapper: renders the core `Error` type as an RFC 7807
/// `{type, title, status, detail, instance}` envelope (§4.10), while keeping the
/// core's environment-aware sanitization and security-relevant logging intact.
///
/// The envelope shape deliberately differs from the core error framework's own
/// `to_api_response_with_environment` (`{error:{code,...}}`) — RFC 7807 is the
/// spec's external contract; the richer internal shape stays available for
/// non-HTTP callers and logs.
#[derive(Debug)]
pub struct ApiError {
    error: Error,
    request_id: Option<String>,
    instance: Option<String>,
    environment: String,
}

impl ApiError {
    pub fn new(error: Error) -> Self {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        Self { error, request_id: None, instance: None, environment }
    }

    pub fn new_with_environment(error: Error, environment: String) -> Self {
        Self { error, request_id: None, instance: None, environment }
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_instance(mut self, instance: String) -> Self {
        self.instance = Some(instance);
        self
    }

    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self.error.code,
            ipwatch_core::error::ErrorCode::AuthenticationFailed
                | ipwatch_core::error::ErrorCode::AuthorizationFailed
                | ipwatch_core::error::ErrorCode::PermissionDenied
                | ipwatch_core::error::ErrorCode::SecurityPolicyViolation
                | ipwatch_core::error::ErrorCode::RateLimitExceeded
                | ipwatch_core::error::ErrorCode::TooManyRequests
                | ipwatch_core::error::ErrorCode::InvalidCredentials
        )
    }

    fn log_error(&self) {
        let status_code =
            StatusCode::from_u16(self.error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match status_code.as_u16() {
            500..=599 => {
                error!(
                    error_code = %self.error.code,
                    error_id = %self.error.context.error_id,
                    request_id = ?self.request_id,
                    severity = ?self.error.severity,
                    "internal server error: {}",
                    self.error
                );

                if self.environment == "production" {
                    error!(target: "security_audit",
                        error_details = %serde_json::to_string(&self.error.to_debug_json()).unwrap_or_default(),
                        "production server error - full details"
                    );
                }
            }
            400..=499 => {
                if self.is_security_relevant() {
                    warn!(target: "security_audit",
                        error_code = %self.error.code,
                        error_id = %self.error.context.error_id,
                        request_id = ?self.request_id,
                        client_ip = ?self.error.context.metadata.get("client_ip"),
                        user_agent = ?self.error.context.metadata.get("user_agent"),
                        "security-relevant client error: {}",
                        self.error
                    );
                } else {
                    tracing::debug!(
                        error_code = %self.error.code,
                        request_id = ?self.request_id,
                        "client error: {}",
                        self.error
                    );
                }
            }
            _ => {
                tracing::info!(error_code = %self.error.code, request_id = ?self.request_id, "informational response: {}", self.error);
            }
        }
    }

    /// RFC 7807 body. Detail is sanitized in production the same way the core
    /// error framework sanitizes its own shape — never the raw message for a
    /// 5xx, never credential plaintext regardless of environment (§8 invariant 6).
    fn problem_json(&self) -> serde_json::Value {
        let status = self.error.http_status();
        let is_production = self.environment == "production";

        let detail = if is_production && (500..600).contains(&status) {
            "An internal error occurred. Please try again later.".to_string()
        } else {
            self.error.to_api_response_with_environment(&self.environment)["error"]["message"]
                .as_str()
                .unwrap_or(&self.error.message)
                .to_string()
        };

        json!({
            "type": format!("https://ipwatch.dev/errors/{}", self.error.code),
            "title": self.error.category().to_string(),
            "status": status,
            "detail": detail,
            "instance": self.instance,
            "error_id": self.error.context.error_id,
            "request_id": self.request_id,
        })
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self::new(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        self.log_error();
        let body = self.problem_json();

        (status_code, [("content-type", "application/problem+json")], Json(body)).into_response()
    }
}
