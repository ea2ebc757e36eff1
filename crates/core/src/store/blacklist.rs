//! `BlacklistRecord` persistence: the upsert conflict-resolution rules and the
//! paginated/filtered read path (§4.1).

use super::Store;
use crate::error::Result;
use crate::types::{BlacklistFilter, BlacklistRecord, NormalizedRecord, Pagination, UpsertOutcome};
use chrono::Utc;
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::error;

/// Rows are upserted in batches of this size inside one transaction per batch
/// (§4.1 "Concurrency"); a failing row aborts only its own batch.
const BATCH_SIZE: usize = 100;

impl Store {
    /// `UpsertBlacklist(batch)` (§4.1). For an existing `(ip, source)`:
    /// `detection_count += 1`, `last_seen := now()`, textual fields overwrite only
    /// when the incoming value is non-empty, `removal_date := COALESCE(new, old)`,
    /// and `active` is recomputed from the (possibly merged) removal date. A new
    /// row is inserted with `detection_count = 1` and `active` per §4.5's
    /// determination.
    pub async fn upsert_blacklist(&self, records: &[NormalizedRecord]) -> Result<UpsertOutcome> {
        let mut outcome = UpsertOutcome::default();

        for chunk in records.chunks(BATCH_SIZE) {
            match self.upsert_blacklist_batch(chunk).await {
                Ok(batch_outcome) => outcome.merge(&batch_outcome),
                Err(err) => {
                    error!(error = %err, batch_size = chunk.len(), "blacklist upsert batch failed");
                    outcome.failed += chunk.len() as u64;
                }
            }
        }

        Ok(outcome)
    }

    async fn upsert_blacklist_batch(&self, records: &[NormalizedRecord]) -> Result<UpsertOutcome> {
        let mut outcome = UpsertOutcome::default();
        let mut tx = self.pool.begin().await?;

        for record in records {
            let row = sqlx::query(
                r#"
                INSERT INTO blacklist_ips
                    (id, ip, source, reason, category, confidence, detection_count,
                     active, country, detection_date, removal_date, last_seen,
                     created_at, updated_at, raw_data)
                VALUES
                    (gen_random_uuid(), $1, $2, $3, $4, $5, 1,
                     $6, $7, $8, $9, now(),
                     now(), now(), $10)
                ON CONFLICT (ip, source) DO UPDATE SET
                    detection_count = blacklist_ips.detection_count + 1,
                    last_seen = now(),
                    reason = CASE WHEN EXCLUDED.reason <> '' THEN EXCLUDED.reason ELSE blacklist_ips.reason END,
                    category = CASE WHEN EXCLUDED.category <> '' THEN EXCLUDED.category ELSE blacklist_ips.category END,
                    confidence = EXCLUDED.confidence,
                    country = COALESCE(EXCLUDED.country, blacklist_ips.country),
                    detection_date = COALESCE(blacklist_ips.detection_date, EXCLUDED.detection_date),
                    removal_date = COALESCE(EXCLUDED.removal_date, blacklist_ips.removal_date),
                    active = CASE
                        WHEN COALESCE(EXCLUDED.removal_date, blacklist_ips.removal_date) < CURRENT_DATE THEN false
                        ELSE true
                    END,
                    updated_at = now(),
                    raw_data = COALESCE(EXCLUDED.raw_data, blacklist_ips.raw_data)
                RETURNING (xmax = 0) AS inserted
                "#,
            )
            .bind(record.ip)
            .bind(&record.source)
            .bind(&record.reason)
            .bind(&record.category)
            .bind(record.confidence)
            .bind(record.active)
            .bind(&record.country)
            .bind(record.detection_date)
            .bind(record.removal_date)
            .bind(&record.raw_data)
            .fetch_one(&mut *tx)
            .await?;

            let inserted: bool = row.try_get("inserted").unwrap_or(false);
            if inserted {
                outcome.inserted += 1;
            } else {
                outcome.updated += 1;
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    /// `DeactivateStale(retention_days)` (§4.1/§4.8): bulk-deactivate rows whose
    /// `last_seen` has fallen outside the retention window. Returns affected count.
    pub async fn deactivate_stale(&self, retention_days: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE blacklist_ips SET active = false, updated_at = now()
             WHERE active = true AND last_seen < now() - ($1 || ' days')::interval",
        )
        .bind(retention_days.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Reapply the removal-date half of the lifecycle rule (§4.8): any row whose
    /// `removal_date` has elapsed must be inactive, independent of `last_seen`.
    pub async fn deactivate_elapsed_removals(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE blacklist_ips SET active = false, updated_at = now()
             WHERE active = true AND removal_date IS NOT NULL AND removal_date < CURRENT_DATE",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// `ListBlacklist(filter, pagination)` (§4.1). Sorted `last_seen DESC,
    /// confidence DESC` unless extended with a caller override later.
    pub async fn list_blacklist(
        &self,
        filter: &BlacklistFilter,
        pagination: Pagination,
    ) -> Result<(Vec<BlacklistRecord>, i64)> {
        let mut count_query: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT count(*) FROM blacklist_ips WHERE 1=1");
        push_filter(&mut count_query, filter);
        let total: i64 = count_query.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select_query: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM blacklist_ips WHERE 1=1");
        push_filter(&mut select_query, filter);
        select_query.push(" ORDER BY last_seen DESC, confidence DESC LIMIT ");
        select_query.push_bind(pagination.limit as i64);
        select_query.push(" OFFSET ");
        select_query.push_bind(pagination.offset());

        let records = select_query
            .build_query_as::<BlacklistRecord>()
            .fetch_all(&self.pool)
            .await?;

        Ok((records, total))
    }

    /// `GetByIP(ip)` (§4.1): every row for the address, across sources.
    pub async fn get_by_ip(&self, ip: ipnetwork::IpNetwork) -> Result<Vec<BlacklistRecord>> {
        let records = sqlx::query_as::<_, BlacklistRecord>(
            "SELECT * FROM blacklist_ips WHERE ip = $1 ORDER BY last_seen DESC",
        )
        .bind(ip)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// `GET /api/blacklist/search?q=` (§6): prefix/substring match on the IP's text
    /// representation.
    pub async fn search_blacklist(&self, query: &str, limit: i64) -> Result<Vec<BlacklistRecord>> {
        let pattern = format!("%{}%", query.replace('%', "").replace('_', ""));
        let records = sqlx::query_as::<_, BlacklistRecord>(
            "SELECT * FROM blacklist_ips WHERE host(ip) LIKE $1
             ORDER BY last_seen DESC LIMIT $2",
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Active IPs only, for the firewall feed (§4.9/§6). No pagination by design.
    pub async fn list_active_ips(&self) -> Result<Vec<ipnetwork::IpNetwork>> {
        let rows = sqlx::query("SELECT DISTINCT ip FROM blacklist_ips WHERE active = true")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| row.try_get::<ipnetwork::IpNetwork, _>("ip"))
            .filter_map(|r| r.ok())
            .collect())
    }

    pub async fn count_by_source(&self, source: &str) -> Result<(i64, Option<chrono::DateTime<Utc>>)> {
        let row = sqlx::query(
            "SELECT count(*) AS total, max(last_seen) AS last_seen
             FROM blacklist_ips WHERE source = $1 AND active = true",
        )
        .bind(source)
        .fetch_one(&self.pool)
        .await?;
        Ok((row.try_get("total")?, row.try_get("last_seen")?))
    }
}

fn push_filter<'a>(builder: &mut QueryBuilder<'a, Postgres>, filter: &'a BlacklistFilter) {
    if let Some(source) = &filter.source {
        builder.push(" AND source = ").push_bind(source);
    }
    if let Some(category) = &filter.category {
        builder.push(" AND category = ").push_bind(category);
    }
    if let Some(country) = &filter.country {
        builder.push(" AND country = ").push_bind(country);
    }
    if let Some(active) = filter.active {
        builder.push(" AND active = ").push_bind(active);
    }
    if let Some(prefix) = &filter.ip_prefix {
        builder
            .push(" AND host(ip) LIKE ")
            .push_bind(format!("{}%", prefix.replace('%', "")));
    }
}
