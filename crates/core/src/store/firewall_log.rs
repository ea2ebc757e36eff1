//! `FirewallPullLog` (§4.9): a best-effort audit trail of who pulled the firewall
//! feed and when. Per §7 "logging is best-effort and must not fail the request",
//! callers are expected to swallow the error from `record_firewall_pull` themselves.

use super::Store;
use crate::error::Result;
use crate::types::FirewallPullLog;

impl Store {
    pub async fn record_firewall_pull(
        &self,
        device_ip: Option<&str>,
        user_agent: Option<&str>,
        path: &str,
        entry_count: i32,
        response_time_ms: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO firewall_pull_log
                (id, device_ip, user_agent, path, entry_count, response_time_ms, pulled_at)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, now())
            "#,
        )
        .bind(device_ip)
        .bind(user_agent)
        .bind(path)
        .bind(entry_count)
        .bind(response_time_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn recent_firewall_pulls(&self, limit: i64) -> Result<Vec<FirewallPullLog>> {
        let rows = sqlx::query_as::<_, FirewallPullLog>(
            "SELECT * FROM firewall_pull_log ORDER BY pulled_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
