//! `CollectionStatus` state machine (§4.7): per-service single-flight enforced by a
//! compare-and-swap `UPDATE ... WHERE status = $from`, not an in-process lock — the
//! authoritative "is this service running" fact must survive a process restart.

use super::Store;
use crate::error::Result;
use crate::types::{CollectionStatus, ServiceState};

impl Store {
    pub async fn get_status(&self, service: &str) -> Result<Option<CollectionStatus>> {
        let status = sqlx::query_as::<_, CollectionStatus>(
            "SELECT * FROM collection_status WHERE service = $1",
        )
        .bind(service)
        .fetch_optional(&self.pool)
        .await?;
        Ok(status)
    }

    pub async fn list_statuses(&self) -> Result<Vec<CollectionStatus>> {
        let statuses = sqlx::query_as::<_, CollectionStatus>("SELECT * FROM collection_status ORDER BY service")
            .fetch_all(&self.pool)
            .await?;
        Ok(statuses)
    }

    /// CAS `from -> to`. Returns `true` iff this call performed the transition —
    /// the §8 "Single-flight" property depends on exactly one caller winning this
    /// race per service. A missing row is seeded as `idle` and then retried once so
    /// first-ever collection of a service doesn't require a separate bootstrap step.
    pub async fn transition_status(
        &self,
        service: &str,
        from: ServiceState,
        to: ServiceState,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE collection_status SET status = $1, updated_at = now() WHERE service = $2 AND status = $3",
        )
        .bind(to)
        .bind(service)
        .bind(from)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Seed a first-run row (idle) only if neither CAS endpoint concerns a
        // running transition into an already-existing row; avoids racing a real
        // in-flight job's row into existence.
        if from == ServiceState::Idle {
            let inserted = sqlx::query(
                r#"
                INSERT INTO collection_status (service, status, success_count, error_count, config, updated_at)
                VALUES ($1, $2, 0, 0, '{}'::jsonb, now())
                ON CONFLICT (service) DO NOTHING
                "#,
            )
            .bind(service)
            .bind(to)
            .execute(&self.pool)
            .await?;

            if inserted.rows_affected() > 0 {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Called when a job is actually dispatched, not merely enqueued — the
    /// Scheduler's cron/interval due-check reads this back as the floor for
    /// "has this service's schedule elapsed since its last run".
    pub async fn mark_run_started(&self, service: &str) -> Result<()> {
        sqlx::query("UPDATE collection_status SET last_run_at = now(), updated_at = now() WHERE service = $1")
            .bind(service)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn increment_success_count(&self, service: &str) -> Result<()> {
        sqlx::query(
            "UPDATE collection_status SET success_count = success_count + 1, updated_at = now() WHERE service = $1",
        )
        .bind(service)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn increment_error_count(&self, service: &str) -> Result<()> {
        sqlx::query(
            "UPDATE collection_status SET error_count = error_count + 1, updated_at = now() WHERE service = $1",
        )
        .bind(service)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_next_run_at(&self, service: &str, next_run: chrono::DateTime<chrono::Utc>) -> Result<()> {
        sqlx::query("UPDATE collection_status SET next_run_at = $1, updated_at = now() WHERE service = $2")
            .bind(next_run)
            .bind(service)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_state_round_trips_through_transition_semantics() {
        // The CAS relies on ServiceState equality for the WHERE clause; guard that
        // the enum's derive hasn't regressed.
        assert_eq!(ServiceState::Idle, ServiceState::Idle);
        assert_ne!(ServiceState::Idle, ServiceState::Running);
    }
}
