//! # IPWatch API Server
//!
//! HTTP front door for the threat-intelligence ingestion platform, built on Axum.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐    ┌──────────────┐    ┌─────────────────┐
//! │  Firewall / │    │ API Server   │    │ Store / Vault / │
//! │  Dashboard  │────│              │────│ Cache / Sched.  │
//! │  Client     │    │ - Axum HTTP  │    │ - Collector     │
//! │             │    │ - Middleware │    │ - QueryService  │
//! └─────────────┘    └──────────────┘    └─────────────────┘
//! ```
//!
//! ## Middleware Stack
//!
//! Requests flow through middleware in this order (§4.10):
//! 1. **Request ID**: correlation id generation/propagation
//! 2. **Security headers**: HSTS, CSP, X-Frame-Options
//! 3. **Rate limiting**: per-IP counter backed by the in-process Cache
//! 4. **Tracing**: structured request/response logging
//! 5. **Compression**: gzip/deflate response compression
//! 6. **CORS**: cross-origin resource sharing policy
//!
//! `/api/collection/*` write routes additionally require an `X-API-Key` match
//! (§4.9), layered narrowly rather than globally.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin ipwatch-server
//! ```
//!
//! - **API**: http://localhost:8080/api/
//! - **Health**: http://localhost:8080/health
//! - **Metrics**: http://localhost:8080/metrics
//! - **Docs**: http://localhost:8080/swagger-ui

use axum::{
    http::{HeaderName, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use ipwatch_collector::{Collector, LifecycleEngine, QueryCacheTtls, QueryService, RegtechSource, Source};
use ipwatch_core::{Cache, Config, CorsConfig, Scheduler, SchedulerConfig, Store, Vault};
use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api_middleware;
mod error;
mod handlers;
mod health;
mod metrics;
mod state;

use crate::state::AppState;

const REGTECH_SERVICE: &str = "REGTECH";

/// Builds a CORS layer from configuration settings (§4.10).
fn build_cors_layer(cors_config: &CorsConfig) -> Result<CorsLayer, Box<dyn std::error::Error>> {
    let mut cors = CorsLayer::new();

    if cors_config.allowed_origins.contains(&"*".to_string()) {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Result<Vec<HeaderValue>, _> =
            cors_config.allowed_origins.iter().map(|origin| origin.parse()).collect();
        cors = cors.allow_origin(origins?);
    }

    if cors_config.allowed_methods.contains(&"*".to_string()) {
        cors = cors.allow_methods(Any);
    } else {
        let methods: Result<Vec<Method>, _> =
            cors_config.allowed_methods.iter().map(|method| method.parse()).collect();
        cors = cors.allow_methods(methods?);
    }

    if cors_config.allowed_headers.contains(&"*".to_string()) {
        cors = cors.allow_headers(Any);
    } else {
        let headers: Result<Vec<HeaderName>, _> =
            cors_config.allowed_headers.iter().map(|header| header.parse()).collect();
        cors = cors.allow_headers(headers?);
    }

    if !cors_config.expose_headers.is_empty() {
        let expose_headers: Result<Vec<HeaderName>, _> =
            cors_config.expose_headers.iter().map(|header| header.parse()).collect();
        cors = cors.expose_headers(expose_headers?);
    }

    cors = cors.allow_credentials(cors_config.allow_credentials);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    info!("starting ipwatch server");

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };
    info!(environment = %config.app.environment, "configuration loaded");

    let store = match Store::connect(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await
    {
        Ok(store) => Arc::new(store),
        Err(err) => {
            eprintln!("database connection failed: {err}");
            std::process::exit(2);
        }
    };
    info!("database pool initialized");

    let vault = match Vault::new(
        &config.vault.master_key,
        &config.vault.pbkdf2_salt,
        config.vault.pbkdf2_iterations,
        Duration::from_secs(config.vault.test_cache_ttl_seconds),
    ) {
        Ok(vault) => Arc::new(vault),
        Err(err) => {
            eprintln!("credential vault initialization failed: {err}");
            std::process::exit(3);
        }
    };
    info!("credential vault initialized");

    let cache = Arc::new(Cache::new());

    let mut sources: HashMap<String, Arc<dyn Source>> = HashMap::new();
    sources.insert(
        REGTECH_SERVICE.to_string(),
        Arc::new(RegtechSource::new(config.collection.regtech_base_url.clone())),
    );
    let known_services: Arc<Vec<String>> = Arc::new(sources.keys().cloned().collect());

    let collector = Arc::new(Collector::new(store.clone(), vault.clone(), cache.clone(), sources));
    let lifecycle = Arc::new(LifecycleEngine::new(store.clone(), cache.clone(), Some(config.collection.retention_days)));

    let scheduler_config = SchedulerConfig {
        default_interval: Duration::from_secs(config.collection.collection_interval_seconds),
        run_timeout: Duration::from_secs(config.collection.collection_timeout_seconds),
        max_retries: config.collection.retry_count,
        requeue_delay: Duration::from_secs(config.collection.requeue_delay_seconds),
        requeue_max_attempts: config.collection.requeue_max_attempts,
        backoff_base: Duration::from_secs(config.collection.backoff_base_seconds),
        backoff_factor: config.collection.backoff_factor,
        backoff_cap: Duration::from_secs(config.collection.backoff_cap_seconds),
        worker_count: config.collection.worker_count,
        ..SchedulerConfig::default()
    };

    let scheduler = Arc::new(Scheduler::new(store.clone(), collector.clone(), lifecycle.clone(), scheduler_config));
    scheduler.set_auto_collection_disabled(config.collection.disable_auto_collection);

    let scheduler_handle = scheduler.clone();
    tokio::spawn(async move {
        scheduler_handle.run().await;
    });
    info!("scheduler started");

    let query = QueryService::new(
        store.clone(),
        cache.clone(),
        QueryCacheTtls {
            list_page: Duration::from_secs(config.cache.list_page_ttl_seconds),
            stats: Duration::from_secs(config.cache.stats_ttl_seconds),
            source_list: Duration::from_secs(config.cache.source_list_ttl_seconds),
            status: Duration::from_secs(config.cache.status_ttl_seconds),
        },
    );

    let metrics_registry = ipwatch_core::MetricsRegistry::new(config.metrics.clone());
    let metrics = Arc::new(ipwatch_core::MetricsService::new(metrics_registry));

    let state = AppState {
        config: config.clone(),
        store,
        vault,
        cache,
        scheduler,
        collector,
        query,
        metrics,
        known_services,
    };

    let app = create_app(state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("server shutdown complete");
    Ok(())
}

fn create_app(state: AppState) -> Result<Router, Box<dyn std::error::Error>> {
    #[derive(OpenApi)]
    #[openapi(
        paths(
            health::health_check,
            handlers::blacklist::list,
            handlers::blacklist::get_by_ip,
            handlers::blacklist::search,
            handlers::collection::trigger,
            handlers::collection::cancel,
            handlers::collection::put_credentials,
            handlers::collection::put_status,
            handlers::collection::ingest,
            handlers::fortinet::threat_feed,
            handlers::fortinet::blocklist,
            handlers::stats::overview,
            handlers::stats::timeline,
            handlers::stats::collection_history,
        ),
        components(schemas()),
        tags(
            (name = "health", description = "Health check endpoint"),
            (name = "blacklist", description = "Blacklist read endpoints"),
            (name = "collection", description = "Collection control and ingest"),
            (name = "fortinet", description = "Firewall-consumable feed renderings"),
            (name = "stats", description = "Aggregate statistics and history"),
        )
    )]
    struct ApiDoc;

    let cors_layer = build_cors_layer(&state.config.cors)?;

    let collection_routes = Router::new()
        .route("/trigger/:service", post(handlers::collection::trigger))
        .route("/cancel/:service", post(handlers::collection::cancel))
        .route("/credentials/:service", put(handlers::collection::put_credentials))
        .route("/status/:service", put(handlers::collection::put_status))
        .route("/ingest", post(handlers::collection::ingest))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), api_middleware::api_key_middleware));

    let api_routes = Router::new()
        .route("/blacklist/list", get(handlers::blacklist::list))
        .route("/blacklist/:ip", get(handlers::blacklist::get_by_ip))
        .route("/blacklist/search", get(handlers::blacklist::search))
        .route("/stats", get(handlers::stats::overview))
        .route("/stats/timeline", get(handlers::stats::timeline))
        .route("/stats/collection", get(handlers::stats::collection_history))
        .route("/fortinet/threat-feed", get(handlers::fortinet::threat_feed))
        .route("/fortinet/blocklist", get(handlers::fortinet::blocklist))
        .nest("/collection", collection_routes);

    let router = Router::new()
        .nest("/api", api_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::metrics))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(api_middleware::request_id::request_id_middleware))
                .layer(axum::middleware::from_fn(
                    api_middleware::security_headers::security_headers_middleware,
                ))
                .layer(axum::middleware::from_fn_with_state(state.clone(), api_middleware::rate_limit_middleware))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CompressionLayer::new())
                .layer(cors_layer),
        )
        .with_state(state)
        .fallback(handler_404);

    Ok(router)
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "resource not found" })))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ipwatch_api=info,ipwatch_collector=info,ipwatch_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received terminate signal"),
    }
}
