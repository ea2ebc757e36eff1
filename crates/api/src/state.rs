//! Composition root: `AppState` holds every shared component the handlers need,
//! assembled once in `main` and cheaply cloned per request (§2's "composition
//! root" ambient concern — everything here is an `Arc` or already `Clone`).

use ipwatch_collector::{Collector, QueryService};
use ipwatch_core::{Cache, Config, MetricsService, Scheduler, Store, Vault};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<Store>,
    pub vault: Arc<Vault>,
    pub cache: Arc<Cache>,
    pub scheduler: Arc<Scheduler>,
    pub collector: Arc<Collector>,
    pub query: QueryService,
    pub metrics: Arc<MetricsService>,
    /// Service names with a registered `Source` (§4.6) — distinct from
    /// `CollectionCredential` rows, since a credential can be configured for a
    /// service the running binary has no scraper for.
    pub known_services: Arc<Vec<String>>,
}

impl AppState {
    /// Whether `POST /api/collection/ingest` is enabled at all (§4.9: an empty
    /// key disables the route rather than accepting an empty `X-API-Key`).
    pub fn ingest_enabled(&self) -> bool {
        !self.config.server.ingest_api_key.is_empty()
    }

    pub fn ingest_key_matches(&self, candidate: &str) -> bool {
        self.ingest_enabled() && candidate == self.config.server.ingest_api_key
    }

    pub fn is_known_service(&self, service: &str) -> bool {
        self.known_services.iter().any(|s| s == service)
    }
}
