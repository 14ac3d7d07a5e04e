//! Durable session storage.

use crate::error::Result;
use crate::types::{Credential, SessionRecord};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument};

/// Persists sessions across process restarts.
///
/// At most one session is active at a time; activating one deactivates all others.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Upsert `account` with `credential`, mark it active and bump `last_login`.
    async fn save_session(&self, account: &str, credential: &Credential) -> Result<()>;

    /// The most recently used active session, if any.
    ///
    /// # Errors
    ///
    /// [`AuthError::CredentialCorrupted`] when the stored blob cannot be parsed.
    async fn active_session(&self) -> Result<Option<SessionRecord>>;

    /// Mark `account` inactive. Unknown accounts are ignored.
    async fn deactivate(&self, account: &str) -> Result<()>;

    /// All sessions, newest login first.
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>>;
}

#[derive(Debug, FromRow)]
struct SessionRow {
    user_email: String,
    credentials_json: String,
    is_active: bool,
    last_login: i64,
    created_at: i64,
}

impl SessionRow {
    fn into_record(self) -> Result<SessionRecord> {
        Ok(SessionRecord {
            credential: Credential::from_blob(&self.credentials_json)?,
            account: self.user_email,
            active: self.is_active,
            last_login: from_millis(self.last_login),
            created_at: from_millis(self.created_at),
        })
    }
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

/// [`CredentialStore`] backed by the `user_sessions` table.
#[derive(Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    #[instrument(skip(self, credential))]
    async fn save_session(&self, account: &str, credential: &Credential) -> Result<()> {
        let blob = credential.to_blob()?;
        let now = Utc::now().timestamp_millis();

        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE user_sessions SET is_active = 0 WHERE user_email != ?")
            .bind(account)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO user_sessions (user_email, credentials_json, is_active, last_login, created_at)
            VALUES (?, ?, 1, ?, ?)
            ON CONFLICT(user_email) DO UPDATE SET
                credentials_json = excluded.credentials_json,
                is_active = 1,
                last_login = excluded.last_login
            "#,
        )
        .bind(account)
        .bind(&blob)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!("Session saved");
        Ok(())
    }

    async fn active_session(&self) -> Result<Option<SessionRecord>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT user_email, credentials_json, is_active, last_login, created_at
            FROM user_sessions
            WHERE is_active = 1
            ORDER BY last_login DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionRow::into_record).transpose()
    }

    #[instrument(skip(self))]
    async fn deactivate(&self, account: &str) -> Result<()> {
        let result = sqlx::query("UPDATE user_sessions SET is_active = 0 WHERE user_email = ?")
            .bind(account)
            .execute(&self.pool)
            .await?;

        debug!(rows = result.rows_affected(), "Session deactivated");
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT user_email, credentials_json, is_active, last_login, created_at
            FROM user_sessions
            ORDER BY last_login DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SessionRow::into_record).collect()
    }
}

impl From<SqlitePool> for SqliteCredentialStore {
    fn from(pool: SqlitePool) -> Self {
        Self::new(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use bridge_desktop::create_test_pool;

    async fn store() -> SqliteCredentialStore {
        SqliteCredentialStore::new(create_test_pool().await.unwrap())
    }

    fn credential(token: &str) -> Credential {
        Credential::new(token, "https://oauth2.googleapis.com/token", "client")
            .with_refresh_token("refresh")
    }

    #[tokio::test]
    async fn test_empty_store_has_no_active_session() {
        let store = store().await;
        assert!(store.active_session().await.unwrap().is_none());
        assert!(store.list_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load_active_session() {
        let store = store().await;
        store
            .save_session("alice@example.com", &credential("a1"))
            .await
            .unwrap();

        let session = store.active_session().await.unwrap().unwrap();
        assert_eq!(session.account, "alice@example.com");
        assert_eq!(session.credential, credential("a1"));
        assert!(session.active);
    }

    #[tokio::test]
    async fn test_saving_deactivates_other_accounts() {
        let store = store().await;
        store
            .save_session("alice@example.com", &credential("a1"))
            .await
            .unwrap();
        store
            .save_session("bob@example.com", &credential("b1"))
            .await
            .unwrap();

        let active = store.active_session().await.unwrap().unwrap();
        assert_eq!(active.account, "bob@example.com");

        let sessions = store.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions.iter().filter(|s| s.active).count(), 1);
    }

    #[tokio::test]
    async fn test_resave_updates_credential_in_place() {
        let store = store().await;
        store
            .save_session("alice@example.com", &credential("a1"))
            .await
            .unwrap();
        let first = store.active_session().await.unwrap().unwrap();

        store
            .save_session("alice@example.com", &credential("a2"))
            .await
            .unwrap();

        let sessions = store.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].credential.access_token, "a2");
        assert_eq!(sessions[0].created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_deactivate() {
        let store = store().await;
        store
            .save_session("alice@example.com", &credential("a1"))
            .await
            .unwrap();

        store.deactivate("alice@example.com").await.unwrap();
        store.deactivate("nobody@example.com").await.unwrap();

        assert!(store.active_session().await.unwrap().is_none());
        let sessions = store.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(!sessions[0].active);
    }

    #[tokio::test]
    async fn test_corrupted_blob_is_reported() {
        let pool = create_test_pool().await.unwrap();
        sqlx::query(
            "INSERT INTO user_sessions (user_email, credentials_json, is_active, last_login, created_at) VALUES (?, ?, 1, 0, 0)",
        )
        .bind("broken@example.com")
        .bind("{not json")
        .execute(&pool)
        .await
        .unwrap();

        let store = SqliteCredentialStore::new(pool);
        assert!(matches!(
            store.active_session().await,
            Err(AuthError::CredentialCorrupted(_))
        ));
    }
}
