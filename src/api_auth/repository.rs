//! API key storage.
//!
//! Only the SHA-256 digest of a key is persisted. Lookups go through the
//! unique `key_digest` index; no caller ever scans keys.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use std::sync::Arc;

use super::capability::CapabilitySet;
use crate::core_types::{ApiKeyId, OwnerId};
use crate::db::{Database, SafeRow};
use crate::error::LedgerError;

/// Persisted API key row.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiKeyRecord {
    pub key_id: ApiKeyId,
    pub owner_id: OwnerId,
    pub name: String,
    pub key_digest: String,
    pub permissions: CapabilitySet,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ApiKeyRecord {
    /// Active and not yet expired.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Insert a key if the owner holds fewer than `max_active` usable keys.
    /// `retire` names a key deactivated in the same transaction (rollover).
    ///
    /// # Errors
    /// * `KeyQuotaExceeded` - owner already at the cap
    async fn insert_key(
        &self,
        record: &ApiKeyRecord,
        max_active: usize,
        retire: Option<ApiKeyId>,
    ) -> Result<(), LedgerError>;

    async fn find_usable_by_digest(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ApiKeyRecord>, LedgerError>;

    async fn get_key(
        &self,
        owner_id: OwnerId,
        key_id: ApiKeyId,
    ) -> Result<Option<ApiKeyRecord>, LedgerError>;

    /// Returns `false` if the key is absent, not owned, or already inactive.
    async fn deactivate_key(&self, owner_id: OwnerId, key_id: ApiKeyId) -> Result<bool, LedgerError>;

    /// Newest first.
    async fn list_keys(&self, owner_id: OwnerId) -> Result<Vec<ApiKeyRecord>, LedgerError>;
}

const KEY_COLUMNS_FROM: &str = r#"
    SELECT key_id, owner_id, name, key_digest, permissions, is_active, expires_at, created_at
    FROM api_keys
"#;

/// PostgreSQL API key store.
pub struct PgApiKeyStore {
    db: Arc<Database>,
}

impl PgApiKeyStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Convert a database row to ApiKeyRecord. Permissions are decoded here,
    /// once, into a typed set.
    fn row_to_record(row: &PgRow) -> Result<ApiKeyRecord, sqlx::Error> {
        let permissions: serde_json::Value = row.get_required("permissions")?;
        Ok(ApiKeyRecord {
            key_id: row.get_required("key_id")?,
            owner_id: row.get_required("owner_id")?,
            name: row.get_required("name")?,
            key_digest: row.get_required("key_digest")?,
            permissions: serde_json::from_value(permissions)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            is_active: row.get_required("is_active")?,
            expires_at: row.get_required("expires_at")?,
            created_at: row.get_required("created_at")?,
        })
    }
}

#[async_trait]
impl ApiKeyStore for PgApiKeyStore {
    async fn insert_key(
        &self,
        record: &ApiKeyRecord,
        max_active: usize,
        retire: Option<ApiKeyId>,
    ) -> Result<(), LedgerError> {
        let mut tx = self.db.pool().begin().await?;

        // Serialize key creation per owner so two requests cannot both pass the quota check.
        let owner = sqlx::query("SELECT owner_id FROM owners WHERE owner_id = $1 FOR UPDATE")
            .bind(record.owner_id)
            .fetch_optional(&mut *tx)
            .await?;
        if owner.is_none() {
            return Err(LedgerError::NotFound("Owner"));
        }

        let active: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM api_keys
            WHERE owner_id = $1 AND is_active AND expires_at > $2
            "#,
        )
        .bind(record.owner_id)
        .bind(record.created_at)
        .fetch_one(&mut *tx)
        .await?;
        if active >= max_active as i64 {
            return Err(LedgerError::KeyQuotaExceeded(max_active));
        }

        if let Some(retired) = retire {
            // A retired key is spent: it cannot be retired (rolled over) twice.
            let retired_rows = sqlx::query(
                "UPDATE api_keys SET is_active = FALSE WHERE key_id = $1 AND owner_id = $2 AND is_active",
            )
            .bind(retired)
            .bind(record.owner_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if retired_rows == 0 {
                return Err(LedgerError::NotFound("API key"));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO api_keys (key_id, owner_id, name, key_digest, permissions, is_active, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.key_id)
        .bind(record.owner_id)
        .bind(&record.name)
        .bind(&record.key_digest)
        .bind(serde_json::to_value(record.permissions).map_err(|e| LedgerError::internal(e.to_string()))?)
        .bind(record.is_active)
        .bind(record.expires_at)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_usable_by_digest(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ApiKeyRecord>, LedgerError> {
        let sql = format!(
            "{} WHERE key_digest = $1 AND is_active AND expires_at > $2",
            KEY_COLUMNS_FROM
        );
        let row = sqlx::query(&sql)
            .bind(digest)
            .bind(now)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.map(|r| Self::row_to_record(&r)).transpose()?)
    }

    async fn get_key(
        &self,
        owner_id: OwnerId,
        key_id: ApiKeyId,
    ) -> Result<Option<ApiKeyRecord>, LedgerError> {
        let sql = format!("{} WHERE key_id = $1 AND owner_id = $2", KEY_COLUMNS_FROM);
        let row = sqlx::query(&sql)
            .bind(key_id)
            .bind(owner_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.map(|r| Self::row_to_record(&r)).transpose()?)
    }

    async fn deactivate_key(&self, owner_id: OwnerId, key_id: ApiKeyId) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys SET is_active = FALSE
            WHERE key_id = $1 AND owner_id = $2 AND is_active
            "#,
        )
        .bind(key_id)
        .bind(owner_id)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_keys(&self, owner_id: OwnerId) -> Result<Vec<ApiKeyRecord>, LedgerError> {
        let sql = format!(
            "{} WHERE owner_id = $1 ORDER BY created_at DESC",
            KEY_COLUMNS_FROM
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .fetch_all(self.db.pool())
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Self::row_to_record(&row)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(is_active: bool, expires_in: Duration) -> ApiKeyRecord {
        let now = Utc::now();
        ApiKeyRecord {
            key_id: uuid::Uuid::new_v4(),
            owner_id: uuid::Uuid::new_v4(),
            name: "ci".to_string(),
            key_digest: "00".repeat(32),
            permissions: CapabilitySet::baseline(),
            is_active,
            expires_at: now + expires_in,
            created_at: now,
        }
    }

    #[test]
    fn test_is_usable() {
        let now = Utc::now();
        assert!(record(true, Duration::hours(1)).is_usable(now));
        assert!(!record(false, Duration::hours(1)).is_usable(now));
        assert!(!record(true, Duration::hours(-1)).is_usable(now));
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_pg_quota_and_digest_lookup() {
        use crate::ledger::{LedgerStore, OwnerIdentity, PgLedgerStore};

        let db = Arc::new(
            Database::connect(&crate::db::test_database_url())
                .await
                .expect("Failed to connect"),
        );
        db.init_schema().await.unwrap();
        let ledger = PgLedgerStore::new(db.clone(), "NGN");
        let keys = PgApiKeyStore::new(db);

        let owner_id = uuid::Uuid::new_v4();
        ledger
            .establish_owner(&OwnerIdentity {
                owner_id,
                email: "keys@example.com".to_string(),
                display_name: None,
            })
            .await
            .unwrap();

        let mut first = record(true, Duration::days(1));
        first.owner_id = owner_id;
        first.key_digest = format!("{:064x}", rand::random::<u128>());
        keys.insert_key(&first, 1, None).await.unwrap();

        let mut second = record(true, Duration::days(1));
        second.owner_id = owner_id;
        second.key_digest = format!("{:064x}", rand::random::<u128>());
        let err = keys.insert_key(&second, 1, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::KeyQuotaExceeded(1)));

        let found = keys
            .find_usable_by_digest(&first.key_digest, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.key_id, first.key_id);
        assert_eq!(found.permissions, CapabilitySet::baseline());

        assert!(keys.deactivate_key(owner_id, first.key_id).await.unwrap());
        assert!(!keys.deactivate_key(owner_id, first.key_id).await.unwrap());
        keys.insert_key(&second, 1, None).await.unwrap();
    }
}
