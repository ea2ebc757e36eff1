//! Domain entities for the ingestion platform, per the semantic data model.
//!
//! These are plain structs shared between the Store, the collection pipeline, and the
//! API layer. Representation choices (e.g. `IpNetwork` for addresses) follow §3's
//! "Representation" note: Postgres `inet` via sqlx's `ipnetwork` feature, not text.

use chrono::{DateTime, NaiveDate, Utc};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `(ip, source)` is the natural key. See §3 invariants: IPv4/IPv6 syntactic validity;
/// `removal_date < today` forces `active = false`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlacklistRecord {
    pub id: Uuid,
    pub ip: IpNetwork,
    pub source: String,
    pub reason: String,
    pub category: String,
    pub confidence: i16,
    pub detection_count: i32,
    pub active: bool,
    pub country: Option<String>,
    pub detection_date: Option<NaiveDate>,
    pub removal_date: Option<NaiveDate>,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub raw_data: Option<serde_json::Value>,
}

/// `(ip, source)` unique. Whitelist entries override blacklist decisions in the
/// resolution view (§4.8) without deleting the underlying blacklist row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WhitelistRecord {
    pub id: Uuid,
    pub ip: IpNetwork,
    pub source: String,
    pub reason: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `service` unique, uppercase/underscore (e.g. `REGTECH`). `encrypted = true` means
/// `password` is ciphertext produced by the Vault and requires the process master key
/// to recover.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CollectionCredential {
    pub id: Uuid,
    pub service: String,
    pub username: String,
    pub password: String,
    pub encrypted: bool,
    pub config: serde_json::Value,
    /// Deployed / not purged (soft-delete). See DESIGN.md open-question resolution.
    pub is_active: bool,
    /// Permitted to run now.
    pub enabled: bool,
    pub collection_interval_seconds: i64,
    pub last_collection_at: Option<DateTime<Utc>>,
    pub last_test_result: Option<bool>,
    pub last_test_message: Option<String>,
    pub last_test_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Cron,
    Manual,
    Api,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerType::Cron => write!(f, "cron"),
            TriggerType::Manual => write!(f, "manual"),
            TriggerType::Api => write!(f, "api"),
        }
    }
}

/// Append-only log; exactly one row per finished job (§3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CollectionHistory {
    pub id: Uuid,
    pub service: String,
    pub started_at: DateTime<Utc>,
    pub trigger_type: TriggerType,
    pub items_collected: i32,
    pub success: bool,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Idle,
    Running,
    Error,
    Disabled,
}

/// One row per service. At most one service may be `Running` at once — enforced by
/// `Store::transition_status`'s CAS (§4.7's single-flight).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CollectionStatus {
    pub service: String,
    pub status: ServiceState,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub success_count: i64,
    pub error_count: i64,
    pub config: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Per-source aggregate, maintained on write or recomputed on read.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CollectionStats {
    pub source: String,
    pub total_ips: i64,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Append-only fact record for firewall-feed requests.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FirewallPullLog {
    pub id: Uuid,
    pub device_ip: Option<String>,
    pub user_agent: Option<String>,
    pub path: String,
    pub entry_count: i32,
    pub response_time_ms: i64,
    pub pulled_at: DateTime<Utc>,
}

/// Keys match `^[A-Z_]+$`. Used by the Scheduler for intervals/timeouts/retry counts
/// and the auto-collect flag.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub value_type: String,
    pub category: String,
    pub active: bool,
}

/// Read-side decision about an IP (§4.8's resolution view).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Whitelist,
    Blacklist,
    Unknown,
}

/// Pagination request, shared by all list endpoints.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub fn offset(&self) -> i64 {
        ((self.page.saturating_sub(1)) as i64) * (self.limit as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationSummary {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationSummary {
    pub fn new(pagination: Pagination, total: i64) -> Self {
        let total_pages = if pagination.limit == 0 {
            0
        } else {
            (total + pagination.limit as i64 - 1) / pagination.limit as i64
        };
        Self {
            page: pagination.page,
            limit: pagination.limit,
            total,
            total_pages,
            has_next: (pagination.page as i64) < total_pages,
            has_prev: pagination.page > 1,
        }
    }
}

/// Filters accepted by `ListBlacklist` (§4.1).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlacklistFilter {
    pub source: Option<String>,
    pub category: Option<String>,
    pub country: Option<String>,
    pub active: Option<bool>,
    pub ip_prefix: Option<String>,
}

/// Outcome of an `UpsertBlacklist` batch (§4.1).
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpsertOutcome {
    pub inserted: u64,
    pub updated: u64,
    pub failed: u64,
}

impl UpsertOutcome {
    pub fn merge(&mut self, other: &UpsertOutcome) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.failed += other.failed;
    }
}

/// A single raw attribute set ready for `UpsertBlacklist`, produced by the Normalizer.
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    pub ip: IpNetwork,
    pub source: String,
    pub reason: String,
    pub category: String,
    pub confidence: i16,
    pub country: Option<String>,
    pub detection_date: Option<NaiveDate>,
    pub removal_date: Option<NaiveDate>,
    pub active: bool,
    pub raw_data: Option<serde_json::Value>,
}
