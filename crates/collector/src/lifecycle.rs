//! The Lifecycle Engine (§4.8): date-driven active/inactive transitions and the
//! whitelist-over-blacklist resolution view. The daily sweep is driven through the
//! Scheduler as an internal `CollectionJob` (`LIFECYCLE_SWEEP_SERVICE`) rather than
//! its own loop, so it shares the same cancellation/timeout machinery (§9).

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use ipwatch_core::jobs::{CollectionOutcome, LifecycleSweeper};
use ipwatch_core::{Cache, Resolution, Result, Store};
use std::sync::Arc;
use tracing::info;

const DEFAULT_RETENTION_DAYS: i64 = 30;

pub struct LifecycleEngine {
    store: Arc<Store>,
    cache: Arc<Cache>,
    retention_days: i64,
}

impl LifecycleEngine {
    pub fn new(store: Arc<Store>, cache: Arc<Cache>, retention_days: Option<i64>) -> Self {
        Self { store, cache, retention_days: retention_days.unwrap_or(DEFAULT_RETENTION_DAYS) }
    }

    /// Applied on every ingest write, in addition to the daily sweep — the Store's
    /// upsert already recomputes `active` from `removal_date` inline (§4.1), so this
    /// only needs to catch the retention-window half of the rule.
    pub async fn on_write(&self) -> Result<u64> {
        let deactivated = self.store.deactivate_stale(self.retention_days).await?;
        if deactivated > 0 {
            self.cache.delete_by_prefix("stats:");
            self.cache.delete_by_prefix("blacklist:list:");
        }
        Ok(deactivated)
    }

    /// §4.8's resolution view: whitelist always wins; otherwise highest confidence,
    /// then most recent `last_seen`; else `unknown`.
    pub async fn resolve(&self, ip: IpNetwork) -> Result<Resolution> {
        Ok(self.store.resolve(ip).await?.resolution)
    }
}

#[async_trait]
impl LifecycleSweeper for LifecycleEngine {
    async fn sweep(&self) -> Result<CollectionOutcome> {
        let by_removal = self.store.deactivate_elapsed_removals().await?;
        let by_retention = self.store.deactivate_stale(self.retention_days).await?;
        let total = by_removal + by_retention;

        if total > 0 {
            self.cache.delete_by_prefix("stats:");
            self.cache.delete_by_prefix("blacklist:list:");
        }

        info!(by_removal, by_retention, "daily lifecycle sweep complete");

        Ok(CollectionOutcome {
            items_collected: total as i32,
            details: serde_json::json!({ "deactivated_by_removal_date": by_removal, "deactivated_by_retention": by_retention }),
        })
    }
}
