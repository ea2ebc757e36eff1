//! Orchestrates a single collection run (§4.6). CAS/history/status-transition are
//! the Scheduler's job (`ipwatch_core::jobs::scheduler::run_one`); this module owns
//! steps 2-4: credential resolution, Scraper → Normalizer → Store, cache
//! invalidation.

use crate::normalize::{NormalizeOutcome, Normalizer};
use crate::source::{DateWindow, Source};
use async_trait::async_trait;
use ipwatch_core::jobs::{CollectionOutcome, CollectionRunner};
use ipwatch_core::{Cache, CollectionCredential, Error, ErrorCode, Result, Store, Vault};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct Collector {
    store: Arc<Store>,
    vault: Arc<Vault>,
    cache: Arc<Cache>,
    sources: HashMap<String, Arc<dyn Source>>,
}

impl Collector {
    pub fn new(store: Arc<Store>, vault: Arc<Vault>, cache: Arc<Cache>, sources: HashMap<String, Arc<dyn Source>>) -> Self {
        Self { store, vault, cache, sources }
    }

    /// `POST /api/collection/ingest` (§4.9): pushed-payload path, bypasses the
    /// Scraper entirely. Shares the Normalizer default confidence with the service's
    /// registered `Source` when one exists, else the Normalizer's own default.
    pub async fn ingest_rows(&self, service: &str, rows: &[crate::source::RawRow]) -> Result<ipwatch_core::UpsertOutcome> {
        let default_confidence = self.sources.get(service).and_then(|source| source.default_confidence());
        let normalizer = Normalizer::new(service, default_confidence);
        let (accepted, _rejected) = partition(normalizer.normalize_batch(rows));

        let outcome = self.store.upsert_blacklist(&accepted).await?;
        self.invalidate_read_caches().await;
        Ok(outcome)
    }

    async fn invalidate_read_caches(&self) {
        self.cache.delete_by_prefix("stats:");
        self.cache.delete_by_prefix("blacklist:list:");
    }

    fn resolve_plaintext_password(&self, credential: &CollectionCredential) -> Result<String> {
        if !credential.encrypted {
            return Ok(credential.password.clone());
        }
        self.vault.decrypt(&credential.password).map_err(|err| {
            Error::new(ErrorCode::DecryptionError, format!("failed to decrypt credential for {}: {err}", credential.service))
        })
    }
}

#[async_trait]
impl CollectionRunner for Collector {
    async fn collect(&self, credential: &CollectionCredential) -> Result<CollectionOutcome> {
        let source = self
            .sources
            .get(&credential.service)
            .cloned()
            .ok_or_else(|| Error::new(ErrorCode::ResourceNotFound, format!("no source registered for {}", credential.service)))?;

        // Decrypted only to hand to the Scraper's Authenticate call; never logged,
        // never persisted (§5 "Credential plaintext").
        let mut plaintext_credential = credential.clone();
        plaintext_credential.password = self.resolve_plaintext_password(credential)?;

        let auth_started = Instant::now();
        let session = source
            .authenticate(&plaintext_credential)
            .await
            .map_err(|err| Error::new(ErrorCode::AuthenticationFailed, err.to_string()))?;
        info!(service = %credential.service, elapsed_ms = auth_started.elapsed().as_millis(), "authenticated with source");

        let window = DateWindow::last_months(chrono::Utc::now().date_naive(), 3);
        let fetch_started = Instant::now();
        let artifact = source
            .fetch(&session, window)
            .await
            .map_err(|err| Error::new(ErrorCode::NetworkTimeout, err.to_string()))?;
        info!(service = %credential.service, elapsed_ms = fetch_started.elapsed().as_millis(), bytes = artifact.bytes.len(), "fetched artifact");

        let rows = source.parse(&artifact).map_err(|err| Error::new(ErrorCode::ValidationFailed, err.to_string()))?;

        let normalizer = Normalizer::new(&credential.service, source.default_confidence());
        let (accepted, rejected) = partition(normalizer.normalize_batch(&rows));
        if !rejected.is_empty() {
            warn!(service = %credential.service, rejected = rejected.len(), "rows rejected by normalizer");
        }

        let store_started = Instant::now();
        let upsert_outcome = self.store.upsert_blacklist(&accepted).await?;
        info!(
            service = %credential.service,
            elapsed_ms = store_started.elapsed().as_millis(),
            inserted = upsert_outcome.inserted,
            updated = upsert_outcome.updated,
            failed = upsert_outcome.failed,
            "upserted batch"
        );

        self.invalidate_read_caches().await;
        self.store.record_last_collection(&credential.service).await?;

        Ok(CollectionOutcome {
            items_collected: (upsert_outcome.inserted + upsert_outcome.updated) as i32,
            details: serde_json::json!({
                "inserted": upsert_outcome.inserted,
                "updated": upsert_outcome.updated,
                "failed": upsert_outcome.failed,
                "rejected_rows": rejected.len(),
            }),
        })
    }
}

fn partition(outcomes: Vec<NormalizeOutcome>) -> (Vec<ipwatch_core::NormalizedRecord>, Vec<(Option<String>, String)>) {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for outcome in outcomes {
        match outcome {
            NormalizeOutcome::Accepted(record) => accepted.push(record),
            NormalizeOutcome::Rejected { ip, reason } => rejected.push((ip, reason)),
        }
    }
    (accepted, rejected)
}
