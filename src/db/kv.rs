//! Namespaced key/value operations.

use chrono::Utc;

use crate::error::Result;

impl super::Db {
    /// Raw value for `namespace/key`, or `None` if absent.
    pub async fn kv_get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM kv_store WHERE namespace = ?1 AND key = ?2")
                .bind(namespace)
                .bind(key)
                .fetch_optional(self.pool())
                .await?;
        Ok(row.map(|(value,)| value))
    }

    /// Insert or overwrite `namespace/key`.
    pub async fn kv_put(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv_store (namespace, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (namespace, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(namespace)
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Remove `namespace/key`. Returns whether it existed.
    pub async fn kv_delete(&self, namespace: &str, key: &str) -> Result<bool> {
        let rows = sqlx::query("DELETE FROM kv_store WHERE namespace = ?1 AND key = ?2")
            .bind(namespace)
            .bind(key)
            .execute(self.pool())
            .await?
            .rows_affected();
        Ok(rows > 0)
    }
}
