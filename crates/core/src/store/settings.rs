//! `Setting` key/value store (§3). Used by the Scheduler for `CRON_<SERVICE>` cron
//! expressions, retention windows, and the auto-collect kill switch.

use super::Store;
use crate::error::Result;
use crate::types::Setting;

impl Store {
    /// All active settings; the Scheduler filters by key prefix itself rather than
    /// pushing that knowledge into the Store.
    pub async fn list_settings(&self) -> Result<Vec<Setting>> {
        let settings = sqlx::query_as::<_, Setting>("SELECT * FROM settings WHERE active = true ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(settings)
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<Setting>> {
        let setting = sqlx::query_as::<_, Setting>("SELECT * FROM settings WHERE key = $1 AND active = true")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(setting)
    }

    pub async fn upsert_setting(&self, key: &str, value: &str, value_type: &str, category: &str) -> Result<Setting> {
        let setting = sqlx::query_as::<_, Setting>(
            r#"
            INSERT INTO settings (key, value, value_type, category, active)
            VALUES ($1, $2, $3, $4, true)
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                value_type = EXCLUDED.value_type,
                category = EXCLUDED.category,
                active = true
            RETURNING *
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(value_type)
        .bind(category)
        .fetch_one(&self.pool)
        .await?;
        Ok(setting)
    }

    pub async fn delete_setting(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE settings SET active = false WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
