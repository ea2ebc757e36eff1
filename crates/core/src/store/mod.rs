//! The Store (§4.1): durable IP records, credentials, history, status, and settings
//! behind a bounded connection pool.
//!
//! Every public method here is a semantic operation from §4.1/§3, not a thin SQL
//! passthrough — normalization of filters, pagination math, and the §3 invariants
//! (`active` recomputation, `detection_count` increment) live here so callers
//! (Collector, Lifecycle Engine, Query Service) never hand-roll SQL.
//!
//! Queries are built with `sqlx::query`/`query_as` and runtime binds rather than the
//! `query!` macro family: the macros need a live database at build time to verify
//! column types, which this deployment-agnostic crate deliberately does not assume.

mod blacklist;
mod credentials;
mod firewall_log;
mod history;
mod settings;
mod stats;
mod status;
mod whitelist;

use crate::error::{Error, ErrorCode, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::warn;

pub use history::TimelinePoint;
pub use stats::{BreakdownEntry, StatsSnapshot};
pub use whitelist::ResolutionDetail;

/// Bounded connection pool backing all Store operations (default size 10, §4.1/§5).
pub struct Store {
    pub(crate) pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32, min_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn check_health(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Retry a transient-failure-prone operation up to 3 attempts with exponential
    /// backoff (§4.1 "Failure semantics"). Only connection resets and lock timeouts
    /// are retried; integrity and schema errors surface immediately.
    pub(crate) async fn retry_transient<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        const MAX_ATTEMPTS: u32 = 3;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < MAX_ATTEMPTS && is_transient(&err) => {
                    let delay = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                    warn!(attempt, error = %err, "transient store error, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(Error::from(err)),
            }
        }
    }
}

fn is_transient(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
        || matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("40001")
            || db_err.code().as_deref() == Some("55P03"))
}

/// Raised when a caller names a service or setting the Store has no row for.
pub fn not_found(what: &str) -> Error {
    Error::new(ErrorCode::ResourceNotFound, format!("{what} not found"))
}
