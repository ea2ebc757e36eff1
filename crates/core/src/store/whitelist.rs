//! `WhitelistRecord` persistence and the resolution view (§4.8).

use super::Store;
use crate::error::Result;
use crate::types::{Resolution, WhitelistRecord};
use ipnetwork::IpNetwork;

/// Resolution view detail: which source/confidence won, for API responses that
/// want to explain the verdict rather than just name it.
#[derive(Debug, Clone)]
pub struct ResolutionDetail {
    pub ip: IpNetwork,
    pub resolution: Resolution,
    pub source: Option<String>,
    pub confidence: Option<i16>,
}

impl Store {
    /// `(ip, source)` unique upsert for whitelist entries (§3).
    pub async fn upsert_whitelist(&self, ip: IpNetwork, source: &str, reason: &str) -> Result<WhitelistRecord> {
        let record = sqlx::query_as::<_, WhitelistRecord>(
            r#"
            INSERT INTO whitelist_ips (id, ip, source, reason, active, created_at, updated_at)
            VALUES (gen_random_uuid(), $1, $2, $3, true, now(), now())
            ON CONFLICT (ip, source) DO UPDATE SET
                reason = EXCLUDED.reason,
                active = true,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(ip)
        .bind(source)
        .bind(reason)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn list_whitelist(&self, ip: Option<IpNetwork>) -> Result<Vec<WhitelistRecord>> {
        let records = match ip {
            Some(ip) => {
                sqlx::query_as::<_, WhitelistRecord>(
                    "SELECT * FROM whitelist_ips WHERE ip = $1 ORDER BY updated_at DESC",
                )
                .bind(ip)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, WhitelistRecord>("SELECT * FROM whitelist_ips ORDER BY updated_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(records)
    }

    /// The §4.8 resolution view: whitelist always wins; otherwise the highest
    /// confidence active blacklist row, tie-broken by most recent `last_seen`.
    pub async fn resolve(&self, ip: IpNetwork) -> Result<ResolutionDetail> {
        let whitelisted = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM whitelist_ips WHERE ip = $1 AND active = true)",
        )
        .bind(ip)
        .fetch_one(&self.pool)
        .await?;

        if whitelisted {
            return Ok(ResolutionDetail {
                ip,
                resolution: Resolution::Whitelist,
                source: Some("MANUAL".to_string()),
                confidence: None,
            });
        }

        let row = sqlx::query(
            "SELECT source, confidence FROM blacklist_ips WHERE ip = $1 AND active = true
             ORDER BY confidence DESC, last_seen DESC LIMIT 1",
        )
        .bind(ip)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(ResolutionDetail {
                ip,
                resolution: Resolution::Blacklist,
                source: Some(sqlx::Row::try_get(&row, "source")?),
                confidence: Some(sqlx::Row::try_get(&row, "confidence")?),
            }),
            None => Ok(ResolutionDetail {
                ip,
                resolution: Resolution::Unknown,
                source: None,
                confidence: None,
            }),
        }
    }
}
