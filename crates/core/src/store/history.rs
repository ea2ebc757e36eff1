//! `CollectionHistory` append-only log (§3/§4.1). Exactly one row is written per
//! finished job; a cancelled job writes none (§7).

use super::Store;
use crate::error::Result;
use crate::types::CollectionHistory;

impl Store {
    pub async fn record_collection_history(&self, entry: CollectionHistory) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collection_history
                (id, service, started_at, trigger_type, items_collected, success,
                 error_message, duration_ms, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.service)
        .bind(entry.started_at)
        .bind(entry.trigger_type)
        .bind(entry.items_collected)
        .bind(entry.success)
        .bind(&entry.error_message)
        .bind(entry.duration_ms)
        .bind(&entry.details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `GET /api/stats/collection` (§6): most recent history rows, newest first.
    pub async fn list_history(&self, service: Option<&str>, limit: i64) -> Result<Vec<CollectionHistory>> {
        let records = match service {
            Some(service) => {
                sqlx::query_as::<_, CollectionHistory>(
                    "SELECT * FROM collection_history WHERE service = $1
                     ORDER BY started_at DESC LIMIT $2",
                )
                .bind(service)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, CollectionHistory>(
                    "SELECT * FROM collection_history ORDER BY started_at DESC LIMIT $1",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(records)
    }

    /// `GET /api/stats/timeline?days=N` (§4.9/§6): per-day count grouped by source.
    pub async fn timeline(&self, days: i64) -> Result<Vec<TimelinePoint>> {
        let rows = sqlx::query_as::<_, TimelinePoint>(
            r#"
            SELECT date_trunc('day', last_seen)::date AS day, source, count(*) AS count
            FROM blacklist_ips
            WHERE last_seen >= now() - ($1 || ' days')::interval
            GROUP BY day, source
            ORDER BY day ASC
            "#,
        )
        .bind(days.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct TimelinePoint {
    pub day: chrono::NaiveDate,
    pub source: String,
    pub count: i64,
}
