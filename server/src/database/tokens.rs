use futures_util::future::BoxFuture;
use sqlx::sqlite::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};

use panel_shared::types::SessionResponse;

use super::utils::{generate_session_id, get_timestamp};

/// Actor recorded on sessions revoked by a newer login.
pub const SYSTEM_ACTOR_ID: i64 = 0;
pub const SYSTEM_ACTOR_USERNAME: &str = "SYSTEM";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,

    #[error("session revoked or expired")]
    RevokedOrExpired,

    #[error("session already revoked")]
    AlreadyRevoked,

    #[error("session store error: {0}")]
    Database(#[from] sqlx::Error),
}

/// One row of the `tokens` ledger.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SessionRecord {
    pub id: i64,
    pub jti: String,
    pub username: String,
    pub revoked: bool,
    pub revoked_by_id: Option<i64>,
    pub revoked_by_username: Option<String>,
    pub expires_at: i64,
    pub created_at: i64,
}

impl From<SessionRecord> for SessionResponse {
    fn from(record: SessionRecord) -> Self {
        SessionResponse {
            id: record.id,
            jti: record.jti,
            username: record.username,
            revoked: record.revoked,
            revoked_by_id: record.revoked_by_id,
            revoked_by_username: record.revoked_by_username,
            expires_at: record.expires_at,
            created_at: record.created_at,
        }
    }
}

/// Durable ledger of issued tokens and their revocation state.
pub trait SessionStore: Send + Sync {
    fn new_session_id(&self, username: &str) -> String {
        generate_session_id(username)
    }

    /// Plain insert, no exclusivity.
    fn save<'a>(
        &'a self,
        jti: &'a str,
        username: &'a str,
        expires_at: i64,
    ) -> BoxFuture<'a, Result<(), SessionError>>;

    /// Revoke every live session of `username` and insert the new one in a
    /// single transaction. Returns how many sessions were revoked.
    fn save_exclusive<'a>(
        &'a self,
        jti: &'a str,
        username: &'a str,
        expires_at: i64,
    ) -> BoxFuture<'a, Result<u64, SessionError>>;

    fn validate<'a>(&'a self, jti: &'a str) -> BoxFuture<'a, Result<(), SessionError>>;

    fn revoke<'a>(
        &'a self,
        jti: &'a str,
        actor_id: i64,
        actor_username: &'a str,
    ) -> BoxFuture<'a, Result<(), SessionError>>;

    /// Every session, newest first.
    fn list_all(&self) -> BoxFuture<'_, Result<Vec<SessionRecord>, SessionError>>;
}

#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// The pool must already carry the `tokens` schema.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Delete rows that expired before now. Maintenance only.
    pub async fn purge_expired(&self) -> Result<u64, SessionError> {
        let purged = sqlx::query("DELETE FROM tokens WHERE expires_at < ?")
            .bind(get_timestamp())
            .execute(&self.pool)
            .await?
            .rows_affected();

        info!(purged, "Purged expired sessions");
        Ok(purged)
    }
}

impl SessionStore for SqliteSessionStore {
    fn save<'a>(
        &'a self,
        jti: &'a str,
        username: &'a str,
        expires_at: i64,
    ) -> BoxFuture<'a, Result<(), SessionError>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO tokens (jti, username, expires_at, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(jti)
            .bind(username)
            .bind(expires_at)
            .bind(get_timestamp())
            .execute(&self.pool)
            .await?;

            debug!(jti = %jti, username = %username, "Session saved");
            Ok(())
        })
    }

    fn save_exclusive<'a>(
        &'a self,
        jti: &'a str,
        username: &'a str,
        expires_at: i64,
    ) -> BoxFuture<'a, Result<u64, SessionError>> {
        Box::pin(async move {
            // Dropping the transaction on an early return rolls it back.
            let mut tx = self.pool.begin().await?;

            let revoked = sqlx::query(
                "UPDATE tokens
                 SET revoked = 1, revoked_by_id = ?, revoked_by_username = ?
                 WHERE username = ? AND revoked = 0",
            )
            .bind(SYSTEM_ACTOR_ID)
            .bind(SYSTEM_ACTOR_USERNAME)
            .bind(username)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            sqlx::query(
                "INSERT INTO tokens (jti, username, expires_at, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(jti)
            .bind(username)
            .bind(expires_at)
            .bind(get_timestamp())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            debug!(jti = %jti, username = %username, revoked_sessions = revoked, "Exclusive session saved");
            Ok(revoked)
        })
    }

    fn validate<'a>(&'a self, jti: &'a str) -> BoxFuture<'a, Result<(), SessionError>> {
        Box::pin(async move {
            let row: Option<(bool, i64)> =
                sqlx::query_as("SELECT revoked, expires_at FROM tokens WHERE jti = ?")
                    .bind(jti)
                    .fetch_optional(&self.pool)
                    .await?;

            match row {
                None => Err(SessionError::NotFound),
                Some((true, _)) => Err(SessionError::RevokedOrExpired),
                Some((false, expires_at)) if expires_at < get_timestamp() => {
                    Err(SessionError::RevokedOrExpired)
                }
                Some(_) => Ok(()),
            }
        })
    }

    fn revoke<'a>(
        &'a self,
        jti: &'a str,
        actor_id: i64,
        actor_username: &'a str,
    ) -> BoxFuture<'a, Result<(), SessionError>> {
        Box::pin(async move {
            let updated = sqlx::query(
                "UPDATE tokens
                 SET revoked = 1, revoked_by_id = ?, revoked_by_username = ?
                 WHERE jti = ? AND revoked = 0",
            )
            .bind(actor_id)
            .bind(actor_username)
            .bind(jti)
            .execute(&self.pool)
            .await?
            .rows_affected();

            if updated > 0 {
                info!(jti = %jti, revoked_by = %actor_username, "Session revoked");
                return Ok(());
            }

            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM tokens WHERE jti = ?")
                .bind(jti)
                .fetch_optional(&self.pool)
                .await?;

            match exists {
                Some(_) => Err(SessionError::AlreadyRevoked),
                None => Err(SessionError::NotFound),
            }
        })
    }

    fn list_all(&self) -> BoxFuture<'_, Result<Vec<SessionRecord>, SessionError>> {
        Box::pin(async move {
            let records = sqlx::query_as::<_, SessionRecord>(
                "SELECT id, jti, username, revoked, revoked_by_id, revoked_by_username,
                        expires_at, created_at
                 FROM tokens
                 ORDER BY created_at DESC, id DESC",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(records)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::create::{create_sessions_schema, open_memory_pool};

    async fn store() -> SqliteSessionStore {
        let pool = open_memory_pool().await.unwrap();
        create_sessions_schema(&pool).await.unwrap();
        SqliteSessionStore::new(pool)
    }

    fn in_one_hour() -> i64 {
        get_timestamp() + 3600
    }

    #[tokio::test]
    async fn saved_session_validates() {
        let store = store().await;
        let jti = store.new_session_id("alice");
        store.save(&jti, "alice", in_one_hour()).await.unwrap();
        store.validate(&jti).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_jti_is_not_found() {
        let store = store().await;
        assert!(matches!(
            store.validate("nobody_0_00").await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn expired_session_fails_validation() {
        let store = store().await;
        store.save("old", "alice", get_timestamp() - 10).await.unwrap();
        assert!(matches!(
            store.validate("old").await,
            Err(SessionError::RevokedOrExpired)
        ));
    }

    #[tokio::test]
    async fn duplicate_jti_is_rejected() {
        let store = store().await;
        store.save("dup", "alice", in_one_hour()).await.unwrap();
        assert!(matches!(
            store.save("dup", "bob", in_one_hour()).await,
            Err(SessionError::Database(_))
        ));
    }

    #[tokio::test]
    async fn exclusive_save_leaves_one_live_session() {
        let store = store().await;
        let mut jtis = Vec::new();
        let mut last_revoked = 0;

        for _ in 0..5 {
            let jti = store.new_session_id("alice");
            last_revoked = store
                .save_exclusive(&jti, "alice", in_one_hour())
                .await
                .unwrap();
            jtis.push(jti);
        }

        // Each login revokes exactly the one before it.
        assert_eq!(last_revoked, 1);

        let (current, earlier) = jtis.split_last().unwrap();
        store.validate(current).await.unwrap();
        for jti in earlier {
            assert!(matches!(
                store.validate(jti).await,
                Err(SessionError::RevokedOrExpired)
            ));
        }

        let live = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .filter(|s| !s.revoked)
            .count();
        assert_eq!(live, 1);
    }

    #[tokio::test]
    async fn exclusive_save_counts_all_prior_sessions() {
        let store = store().await;
        for i in 0..4 {
            store
                .save(&format!("plain-{i}"), "alice", in_one_hour())
                .await
                .unwrap();
        }
        store.save("other", "bob", in_one_hour()).await.unwrap();

        let revoked = store
            .save_exclusive("fresh", "alice", in_one_hour())
            .await
            .unwrap();
        assert_eq!(revoked, 4);

        store.validate("other").await.unwrap();
        let records = store.list_all().await.unwrap();
        let system_revoked = records
            .iter()
            .filter(|r| r.revoked_by_username.as_deref() == Some(SYSTEM_ACTOR_USERNAME))
            .count();
        assert_eq!(system_revoked, 4);
    }

    #[tokio::test]
    async fn failed_exclusive_save_rolls_back() {
        let store = store().await;
        store.save("taken", "bob", in_one_hour()).await.unwrap();
        store.save("alice-1", "alice", in_one_hour()).await.unwrap();

        // The insert collides on jti, so the revoke must not stick either.
        assert!(store
            .save_exclusive("taken", "alice", in_one_hour())
            .await
            .is_err());
        store.validate("alice-1").await.unwrap();
    }

    #[tokio::test]
    async fn revoke_then_revoke_again() {
        let store = store().await;
        assert!(matches!(
            store.revoke("ghost", 1, "admin").await,
            Err(SessionError::NotFound)
        ));

        store.save("live", "alice", in_one_hour()).await.unwrap();
        store.revoke("live", 1, "admin").await.unwrap();
        assert!(matches!(
            store.revoke("live", 1, "admin").await,
            Err(SessionError::AlreadyRevoked)
        ));

        let record = store.list_all().await.unwrap().remove(0);
        assert!(record.revoked);
        assert_eq!(record.revoked_by_id, Some(1));
        assert_eq!(record.revoked_by_username.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = store().await;
        store.save("first", "alice", in_one_hour()).await.unwrap();
        store.save("second", "bob", in_one_hour()).await.unwrap();

        let jtis: Vec<_> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.jti)
            .collect();
        assert_eq!(jtis, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn purge_removes_only_expired_rows() {
        let store = store().await;
        store.save("old", "alice", get_timestamp() - 60).await.unwrap();
        store.save("new", "alice", in_one_hour()).await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }
}
