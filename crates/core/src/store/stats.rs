//! Aggregate read side for `GET /api/stats` (§4.9/§6): per-source totals plus a
//! snapshot of current service status, assembled from several single-purpose
//! queries rather than one large join so each piece stays independently cacheable.

use super::Store;
use crate::error::Result;
use crate::types::{CollectionStats, CollectionStatus};

/// One entry in a top-N breakdown (category or country), by active IP count.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct BreakdownEntry {
    pub key: String,
    pub count: i64,
}

/// Full payload behind `GET /api/stats`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StatsSnapshot {
    pub sources: Vec<CollectionStats>,
    pub statuses: Vec<CollectionStatus>,
    pub total_active_ips: i64,
    pub top_categories: Vec<BreakdownEntry>,
    pub top_countries: Vec<BreakdownEntry>,
}

impl Store {
    pub async fn stats_snapshot(&self) -> Result<StatsSnapshot> {
        let sources = self.collection_stats().await?;
        let statuses = self.list_statuses().await?;
        let total_active_ips = sources.iter().map(|s| s.total_ips).sum();
        let top_categories = self.top_categories(10).await?;
        let top_countries = self.top_countries(10).await?;

        Ok(StatsSnapshot {
            sources,
            statuses,
            total_active_ips,
            top_categories,
            top_countries,
        })
    }

    /// Per-source totals over currently-active rows, one row per distinct source.
    pub async fn collection_stats(&self) -> Result<Vec<CollectionStats>> {
        let rows = sqlx::query_as::<_, CollectionStats>(
            r#"
            SELECT source, count(*) AS total_ips, max(last_seen) AS last_seen
            FROM blacklist_ips
            WHERE active = true
            GROUP BY source
            ORDER BY source
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Top-`limit` categories among active rows, by count descending (§4.9).
    pub async fn top_categories(&self, limit: i64) -> Result<Vec<BreakdownEntry>> {
        let rows = sqlx::query_as::<_, BreakdownEntry>(
            r#"
            SELECT category AS key, count(*) AS count
            FROM blacklist_ips
            WHERE active = true
            GROUP BY category
            ORDER BY count DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Top-`limit` countries among active rows, by count descending (§4.9).
    pub async fn top_countries(&self, limit: i64) -> Result<Vec<BreakdownEntry>> {
        let rows = sqlx::query_as::<_, BreakdownEntry>(
            r#"
            SELECT country AS key, count(*) AS count
            FROM blacklist_ips
            WHERE active = true AND country IS NOT NULL
            GROUP BY country
            ORDER BY count DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn total_active_ips_sums_per_source_totals() {
        let snapshot = StatsSnapshot {
            sources: vec![
                CollectionStats { source: "regtech".into(), total_ips: 10, last_seen: Some(Utc::now()) },
                CollectionStats { source: "secudium".into(), total_ips: 5, last_seen: None },
            ],
            statuses: vec![],
            total_active_ips: 0,
            top_categories: vec![],
            top_countries: vec![],
        };
        let summed: i64 = snapshot.sources.iter().map(|s| s.total_ips).sum();
        assert_eq!(summed, 15);
    }
}
