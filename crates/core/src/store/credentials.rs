//! `CollectionCredential` CRUD (§4.1). Ciphertext format is owned by the Vault; the
//! Store persists whatever string it is handed and never attempts to decrypt it.

use super::{not_found, Store};
use crate::error::Result;
use crate::types::CollectionCredential;

impl Store {
    pub async fn get_credential(&self, service: &str) -> Result<Option<CollectionCredential>> {
        let record = sqlx::query_as::<_, CollectionCredential>(
            "SELECT * FROM collection_credentials WHERE service = $1",
        )
        .bind(service)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn require_credential(&self, service: &str) -> Result<CollectionCredential> {
        self.get_credential(service)
            .await?
            .ok_or_else(|| not_found(&format!("credential for service {service}")))
    }

    /// Services with `enabled = true AND is_active = true`, consulted by the
    /// scheduler's cron pass (§4.7). `is_active` distinguishes "deployed" from
    /// "permitted to run now" per the DESIGN.md open-question resolution.
    pub async fn list_enabled_credentials(&self) -> Result<Vec<CollectionCredential>> {
        let records = sqlx::query_as::<_, CollectionCredential>(
            "SELECT * FROM collection_credentials WHERE enabled = true AND is_active = true",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// `PUT /api/collection/credentials/:service` (§6): insert or fully replace.
    /// `password` must already be ciphertext if `encrypted = true` — the Store
    /// performs no encryption itself.
    pub async fn upsert_credential(&self, credential: &CollectionCredential) -> Result<CollectionCredential> {
        let record = sqlx::query_as::<_, CollectionCredential>(
            r#"
            INSERT INTO collection_credentials
                (id, service, username, password, encrypted, config, is_active, enabled,
                 collection_interval_seconds, last_collection_at, last_test_result,
                 last_test_message, last_test_at, created_at, updated_at)
            VALUES
                (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now(), now())
            ON CONFLICT (service) DO UPDATE SET
                username = EXCLUDED.username,
                password = EXCLUDED.password,
                encrypted = EXCLUDED.encrypted,
                config = EXCLUDED.config,
                is_active = EXCLUDED.is_active,
                enabled = EXCLUDED.enabled,
                collection_interval_seconds = EXCLUDED.collection_interval_seconds,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(&credential.service)
        .bind(&credential.username)
        .bind(&credential.password)
        .bind(credential.encrypted)
        .bind(&credential.config)
        .bind(credential.is_active)
        .bind(credential.enabled)
        .bind(credential.collection_interval_seconds)
        .bind(credential.last_collection_at)
        .bind(credential.last_test_result)
        .bind(&credential.last_test_message)
        .bind(credential.last_test_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    /// `PUT /api/collection/status/:service` partial update of the `enabled` flag
    /// (§6), distinct from the `CollectionStatus.status` state machine.
    pub async fn set_credential_enabled(&self, service: &str, enabled: bool) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE collection_credentials SET enabled = $1, updated_at = now() WHERE service = $2",
        )
        .bind(enabled)
        .bind(service)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a `TestConnectivity` outcome (§4.2).
    pub async fn record_test_result(&self, service: &str, success: bool, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE collection_credentials
             SET last_test_result = $1, last_test_message = $2, last_test_at = now()
             WHERE service = $3",
        )
        .bind(success)
        .bind(message)
        .bind(service)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_last_collection(&self, service: &str) -> Result<()> {
        sqlx::query("UPDATE collection_credentials SET last_collection_at = now() WHERE service = $1")
            .bind(service)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
