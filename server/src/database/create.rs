use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Result, Sqlite, Transaction};
use tracing::info;

use crate::auth::permissions::{ALL_PERMISSIONS, ROLE_ADMIN};

/// Schema version of the session ledger database.
const SESSIONS_SCHEMA_VERSION: i64 = 1;

/// Schema version of the credential database.
const CREDENTIALS_SCHEMA_VERSION: i64 = 1;

/// Open (creating if needed) the session ledger at `path`.
pub async fn open_sessions_database(path: &str) -> Result<SqlitePool> {
    let pool = open_file_pool(path).await?;
    create_sessions_schema(&pool).await?;
    info!("Session ledger ready at {}", path);
    Ok(pool)
}

/// Open (creating if needed) the credential database at `path`.
pub async fn open_credentials_database(path: &str) -> Result<SqlitePool> {
    let pool = open_file_pool(path).await?;
    create_credentials_schema(&pool).await?;
    info!("Credential database ready at {}", path);
    Ok(pool)
}

/// Single-connection in-memory pool. The connection is never recycled, so the
/// database lives as long as the pool.
pub async fn open_memory_pool() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

async fn open_file_pool(path: &str) -> Result<SqlitePool> {
    if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
}

/// Create the `tokens` table and its indexes. Idempotent.
pub async fn create_sessions_schema(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;

    // One row per issued token. Rows are never deleted on logout so the
    // revocation trail stays auditable.
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS tokens (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            jti                 TEXT    NOT NULL UNIQUE,
            username            TEXT    NOT NULL,
            revoked             INTEGER NOT NULL DEFAULT 0,
            revoked_by_id       INTEGER,
            revoked_by_username TEXT,
            expires_at          INTEGER NOT NULL,
            created_at          INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        )",
    )
    .execute(&mut *tx)
    .await?;

    // --- Indexes --------------------------------------------------------
    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_tokens_jti      ON tokens(jti)",
        "CREATE INDEX IF NOT EXISTS idx_tokens_username ON tokens(username)",
        "CREATE INDEX IF NOT EXISTS idx_tokens_revoked  ON tokens(revoked)",
    ] {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    set_user_version(&mut tx, SESSIONS_SCHEMA_VERSION).await?;
    tx.commit().await
}

/// Create the user / role / permission tables and seed the permission
/// catalogue plus an `admin` role holding every permission. Idempotent.
pub async fn create_credentials_schema(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;

    for statement in [
        "CREATE TABLE IF NOT EXISTS users (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            username      TEXT    NOT NULL UNIQUE,
            password_hash TEXT    NOT NULL,
            is_active     INTEGER NOT NULL DEFAULT 1,
            created_at    INTEGER NOT NULL,
            last_login    INTEGER
        )",
        "CREATE TABLE IF NOT EXISTS roles (
            id   INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT    NOT NULL UNIQUE
        )",
        "CREATE TABLE IF NOT EXISTS permissions (
            id   INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT    NOT NULL UNIQUE
        )",
        "CREATE TABLE IF NOT EXISTS user_roles (
            user_id INTEGER NOT NULL,
            role_id INTEGER NOT NULL,
            PRIMARY KEY (user_id, role_id),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (role_id) REFERENCES roles(id) ON DELETE CASCADE
        )",
        "CREATE TABLE IF NOT EXISTS role_permissions (
            role_id       INTEGER NOT NULL,
            permission_id INTEGER NOT NULL,
            PRIMARY KEY (role_id, permission_id),
            FOREIGN KEY (role_id)       REFERENCES roles(id)       ON DELETE CASCADE,
            FOREIGN KEY (permission_id) REFERENCES permissions(id) ON DELETE CASCADE
        )",
        "CREATE INDEX IF NOT EXISTS idx_users_username   ON users(username)",
        "CREATE INDEX IF NOT EXISTS idx_user_roles_user  ON user_roles(user_id)",
    ] {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    // --- Seed -----------------------------------------------------------
    for permission in ALL_PERMISSIONS.iter().copied() {
        sqlx::query("INSERT OR IGNORE INTO permissions (name) VALUES (?)")
            .bind(permission)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("INSERT OR IGNORE INTO roles (name) VALUES (?)")
        .bind(ROLE_ADMIN)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT OR IGNORE INTO role_permissions (role_id, permission_id)
         SELECT r.id, p.id FROM roles r CROSS JOIN permissions p WHERE r.name = ?",
    )
    .bind(ROLE_ADMIN)
    .execute(&mut *tx)
    .await?;

    set_user_version(&mut tx, CREDENTIALS_SCHEMA_VERSION).await?;
    tx.commit().await
}

async fn set_user_version(tx: &mut Transaction<'_, Sqlite>, version: i64) -> Result<()> {
    let current: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(&mut **tx)
        .await?;

    if current < version {
        info!("Schema at version {}; stamping version {}", current, version);
        // PRAGMA does not accept bound parameters.
        sqlx::query(&format!("PRAGMA user_version = {}", version))
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sessions_schema_is_idempotent() {
        let pool = open_memory_pool().await.unwrap();
        create_sessions_schema(&pool).await.unwrap();
        create_sessions_schema(&pool).await.unwrap();

        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(version, SESSIONS_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn credentials_schema_seeds_admin_role() {
        let pool = open_memory_pool().await.unwrap();
        create_credentials_schema(&pool).await.unwrap();
        create_credentials_schema(&pool).await.unwrap();

        let granted: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM role_permissions rp
             JOIN roles r ON r.id = rp.role_id WHERE r.name = ?",
        )
        .bind(ROLE_ADMIN)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(granted as usize, ALL_PERMISSIONS.len());
    }

    #[tokio::test]
    async fn file_database_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tokens.db");
        let pool = open_sessions_database(path.to_str().unwrap()).await.unwrap();
        assert!(path.exists());
        pool.close().await;
    }
}
