//! Read-side query surface (§4.9): list/search/stats/timeline/firewall-feed, all
//! consulting the Cache before the Store. `ipwatch-api`'s handlers are thin HTTP
//! adapters over this module — no SQL or cache-key knowledge lives in `ipwatch-api`.

use ipwatch_core::{
    BlacklistFilter, BlacklistRecord, Cache, CollectionHistory, CollectionStatus, Pagination,
    PaginationSummary, ResolutionDetail, Result, StatsSnapshot, Store, TimelinePoint,
};
use ipnetwork::IpNetwork;
use std::sync::Arc;
use std::time::Duration;

/// Maximum `?days=` window accepted by the timeline endpoint (§4.9).
const MAX_TIMELINE_DAYS: i64 = 730;

#[derive(Debug, Clone)]
pub struct QueryCacheTtls {
    pub list_page: Duration,
    pub stats: Duration,
    pub source_list: Duration,
    pub status: Duration,
}

impl Default for QueryCacheTtls {
    fn default() -> Self {
        Self {
            list_page: Duration::from_secs(60),
            stats: Duration::from_secs(300),
            source_list: Duration::from_secs(3600),
            status: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ListResult {
    pub records: Vec<BlacklistRecord>,
    pub pagination: PaginationSummary,
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<Store>,
    cache: Arc<Cache>,
    ttls: QueryCacheTtls,
}

impl QueryService {
    pub fn new(store: Arc<Store>, cache: Arc<Cache>, ttls: QueryCacheTtls) -> Self {
        Self { store, cache, ttls }
    }

    /// `GET /api/blacklist/list` (§4.9/§6), cached per `(filter, page, limit)` for
    /// 60s. The cache key is the filter's debug-stable serialization, not its
    /// address, so two distinct filter values with the same fields share an entry.
    pub async fn list(&self, filter: BlacklistFilter, pagination: Pagination) -> Result<ListResult> {
        let key = list_cache_key(&filter, pagination);
        let store = self.store.clone();
        let value = self
            .cache
            .get_or_set(&key, self.ttls.list_page, move || {
                let store = store.clone();
                async move {
                    let (records, total) = store.list_blacklist(&filter, pagination).await?;
                    let result = ListResult {
                        records,
                        pagination: PaginationSummary::new(pagination, total),
                    };
                    serde_json::to_value(result).map_err(ipwatch_core::Error::from)
                }
            })
            .await?;
        serde_json::from_value(value).map_err(|err| ipwatch_core::Error::from(err))
    }

    /// `GET /api/blacklist/:ip` (§6): never cached — always the freshest view of a
    /// single address's records, since a caller hitting this endpoint typically
    /// just triggered or is about to trigger a decision based on it.
    pub async fn get_by_ip(&self, ip: IpNetwork) -> Result<Vec<BlacklistRecord>> {
        self.store.get_by_ip(ip).await
    }

    /// `GET /api/blacklist/search?q=` (§6).
    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<BlacklistRecord>> {
        self.store.search_blacklist(query, limit.clamp(1, 1000)).await
    }

    /// `GET /api/stats` (§4.9/§6), cached 300s.
    pub async fn stats(&self) -> Result<StatsSnapshot> {
        let store = self.store.clone();
        let value = self
            .cache
            .get_or_set("stats:global", self.ttls.stats, move || {
                let store = store.clone();
                async move {
                    let snapshot = store.stats_snapshot().await?;
                    serde_json::to_value(snapshot).map_err(ipwatch_core::Error::from)
                }
            })
            .await?;
        serde_json::from_value(value).map_err(|err| ipwatch_core::Error::from(err))
    }

    /// `GET /api/stats/timeline?days=N` (§4.9/§6). `days` is clamped to `[1,730]`
    /// rather than rejected, matching the "pagination caps" posture applied to
    /// other bounded query parameters in §4.10.
    pub async fn timeline(&self, days: i64) -> Result<Vec<TimelinePoint>> {
        self.store.timeline(days.clamp(1, MAX_TIMELINE_DAYS)).await
    }

    /// `GET /api/stats/collection` (§6): recent `CollectionHistory` rows.
    pub async fn collection_history(&self, service: Option<&str>, limit: i64) -> Result<Vec<CollectionHistory>> {
        self.store.list_history(service, limit.clamp(1, 1000)).await
    }

    /// Distinct configured source names, cached 3600s (§4.3's "source list" TTL).
    pub async fn sources(&self) -> Result<Vec<String>> {
        let store = self.store.clone();
        let value = self
            .cache
            .get_or_set("cache:source_list", self.ttls.source_list, move || {
                let store = store.clone();
                async move {
                    let stats = store.collection_stats().await?;
                    let names: Vec<String> = stats.into_iter().map(|s| s.source).collect();
                    serde_json::to_value(names).map_err(ipwatch_core::Error::from)
                }
            })
            .await?;
        serde_json::from_value(value).map_err(|err| ipwatch_core::Error::from(err))
    }

    /// `CollectionStatus` snapshot, cached 30s (§4.3).
    pub async fn statuses(&self) -> Result<Vec<CollectionStatus>> {
        let store = self.store.clone();
        let value = self
            .cache
            .get_or_set("status:all", self.ttls.status, move || {
                let store = store.clone();
                async move {
                    let statuses = store.list_statuses().await?;
                    serde_json::to_value(statuses).map_err(ipwatch_core::Error::from)
                }
            })
            .await?;
        serde_json::from_value(value).map_err(|err| ipwatch_core::Error::from(err))
    }

    /// Active IPs for the firewall feed (§4.9/§6). Never cached — the feed must
    /// reflect the latest sweep/ingest, and callers already pay for a full table
    /// scan infrequently relative to list/stats traffic.
    pub async fn firewall_feed(&self) -> Result<Vec<IpNetwork>> {
        self.store.list_active_ips().await
    }

    /// §4.8's resolution view, uncached — callers consult it for point-in-time
    /// decisions (e.g. a firewall asking "is this IP still blocked?").
    pub async fn resolve(&self, ip: IpNetwork) -> Result<ResolutionDetail> {
        self.store.resolve(ip).await
    }

    /// Best-effort audit write for a firewall-feed pull (§4.9: "logging is
    /// best-effort and must not fail the request"). Errors are logged, not
    /// propagated.
    pub async fn record_firewall_pull(
        &self,
        device_ip: Option<&str>,
        user_agent: Option<&str>,
        path: &str,
        entry_count: i32,
        response_time_ms: i64,
    ) {
        if let Err(err) = self
            .store
            .record_firewall_pull(device_ip, user_agent, path, entry_count, response_time_ms)
            .await
        {
            tracing::warn!(error = %err, "failed to record firewall pull (best-effort)");
        }
    }
}

fn list_cache_key(filter: &BlacklistFilter, pagination: Pagination) -> String {
    format!(
        "blacklist:list:{}:{}:{}:{}:{}:{}:{}",
        filter.source.as_deref().unwrap_or(""),
        filter.category.as_deref().unwrap_or(""),
        filter.country.as_deref().unwrap_or(""),
        filter.active.map(|a| a.to_string()).unwrap_or_default(),
        filter.ip_prefix.as_deref().unwrap_or(""),
        pagination.page,
        pagination.limit,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_distinguishes_distinct_filters() {
        let pagination = Pagination { page: 1, limit: 50 };
        let a = list_cache_key(&BlacklistFilter { source: Some("REGTECH".into()), ..Default::default() }, pagination);
        let b = list_cache_key(&BlacklistFilter { source: Some("SECUDIUM".into()), ..Default::default() }, pagination);
        assert_ne!(a, b);
    }

    #[test]
    fn cache_key_is_stable_for_equal_filters() {
        let pagination = Pagination { page: 2, limit: 25 };
        let filter = BlacklistFilter { active: Some(true), ..Default::default() };
        assert_eq!(list_cache_key(&filter, pagination), list_cache_key(&filter.clone(), pagination));
    }
}
