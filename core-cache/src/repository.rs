//! Persistent storage for cached listings.

use crate::error::Result;
use crate::models::{FileRecord, PersistedListing};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, SqlitePool};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Durable mirror of [`MetadataCache`](crate::MetadataCache) contents.
///
/// Order is preserved: records come back exactly as they were written.
#[async_trait]
pub trait FileCacheRepository: Send + Sync {
    /// Every account that has cached records or a sync marker.
    async fn load_all(&self) -> Result<Vec<PersistedListing>>;

    /// Replace an account's records and set its sync marker.
    async fn replace_all(
        &self,
        account: &str,
        records: &[FileRecord],
        synced_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Insert or move `record` to the front of the account's listing.
    async fn upsert(&self, account: &str, record: &FileRecord) -> Result<()>;

    /// Drop an account's records and its sync marker.
    async fn invalidate(&self, account: &str) -> Result<()>;
}

#[derive(FromRow)]
struct CacheRow {
    user_email: String,
    #[sqlx(flatten)]
    record: FileRecord,
}

#[derive(FromRow)]
struct SyncStateRow {
    user_email: String,
    last_synced_at: Option<i64>,
}

/// [`FileCacheRepository`] over the `file_cache` and `cache_sync_state` tables.
pub struct SqliteFileCacheRepository {
    pool: SqlitePool,
}

impl SqliteFileCacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileCacheRepository for SqliteFileCacheRepository {
    async fn load_all(&self) -> Result<Vec<PersistedListing>> {
        let rows = sqlx::query_as::<_, CacheRow>(
            r#"
            SELECT user_email, file_id, file_name, file_size, modified_time, mime_type, cached_at
            FROM file_cache
            ORDER BY user_email, position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let markers = sqlx::query_as::<_, SyncStateRow>(
            "SELECT user_email, last_synced_at FROM cache_sync_state",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut listings: BTreeMap<String, PersistedListing> = BTreeMap::new();
        for row in rows {
            listings
                .entry(row.user_email.clone())
                .or_insert_with(|| PersistedListing {
                    account: row.user_email,
                    records: Vec::new(),
                    last_synced_at: None,
                })
                .records
                .push(row.record);
        }

        for marker in markers {
            let synced_at = marker
                .last_synced_at
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
            listings
                .entry(marker.user_email.clone())
                .or_insert_with(|| PersistedListing {
                    account: marker.user_email,
                    records: Vec::new(),
                    last_synced_at: None,
                })
                .last_synced_at = synced_at;
        }

        Ok(listings.into_values().collect())
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn replace_all(
        &self,
        account: &str,
        records: &[FileRecord],
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM file_cache WHERE user_email = ?")
            .bind(account)
            .execute(&mut *tx)
            .await?;

        for (position, record) in records.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO file_cache (
                    user_email, file_id, file_name, file_size, modified_time, mime_type, cached_at, position
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(account)
            .bind(&record.id)
            .bind(&record.name)
            .bind(record.size)
            .bind(&record.modified_time)
            .bind(&record.mime_type)
            .bind(record.cached_at)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO cache_sync_state (user_email, last_synced_at) VALUES (?, ?)
            ON CONFLICT(user_email) DO UPDATE SET last_synced_at = excluded.last_synced_at
            "#,
        )
        .bind(account)
        .bind(synced_at.timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Persisted cached listing");
        Ok(())
    }

    async fn upsert(&self, account: &str, record: &FileRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM file_cache WHERE user_email = ? AND file_id = ?")
            .bind(account)
            .bind(&record.id)
            .execute(&mut *tx)
            .await?;

        let (front,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MIN(position), 0) FROM file_cache WHERE user_email = ?",
        )
        .bind(account)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO file_cache (
                user_email, file_id, file_name, file_size, modified_time, mime_type, cached_at, position
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account)
        .bind(&record.id)
        .bind(&record.name)
        .bind(record.size)
        .bind(&record.modified_time)
        .bind(&record.mime_type)
        .bind(record.cached_at)
        .bind(front - 1)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn invalidate(&self, account: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM file_cache WHERE user_email = ?")
            .bind(account)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM cache_sync_state WHERE user_email = ?")
            .bind(account)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
