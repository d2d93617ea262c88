use futures_util::future::BoxFuture;
use sqlx::sqlite::SqlitePool;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::utils::{get_timestamp, hash_password, verify_password};

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("user not found")]
    UserNotFound,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user is inactive")]
    UserInactive,

    #[error("credential store error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_active: bool,
    pub created_at: i64,
    pub last_login: Option<i64>,
}

/// A successful authentication with everything the token needs.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub user: User,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// Read side of the user / role / permission database.
pub trait CredentialGateway: Send + Sync {
    fn authenticate<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<AuthResult, CredentialError>>;

    fn user_roles(&self, user_id: i64) -> BoxFuture<'_, Result<Vec<String>, CredentialError>>;

    fn user_permissions(&self, user_id: i64)
    -> BoxFuture<'_, Result<Vec<String>, CredentialError>>;
}

#[derive(Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    /// The pool must already carry the credential schema.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a user with an argon2 hash of `password` and attach `roles`.
    /// Roles that do not exist yet are created without permissions.
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        roles: &[String],
    ) -> anyhow::Result<i64> {
        let password_hash = hash_password(password)?;
        let mut tx = self.pool.begin().await?;

        let user_id = sqlx::query(
            "INSERT INTO users (username, password_hash, is_active, created_at) VALUES (?, ?, 1, ?)",
        )
        .bind(username)
        .bind(&password_hash)
        .bind(get_timestamp())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for role in roles {
            sqlx::query("INSERT OR IGNORE INTO roles (name) VALUES (?)")
                .bind(role)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT OR IGNORE INTO user_roles (user_id, role_id)
                 SELECT ?, id FROM roles WHERE name = ?",
            )
            .bind(user_id)
            .bind(role)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(username = %username, user_id, "User created");
        Ok(user_id)
    }

    pub async fn set_active(&self, user_id: i64, active: bool) -> Result<(), CredentialError> {
        let updated = sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(CredentialError::UserNotFound);
        }
        Ok(())
    }

    async fn update_last_login(&self, user_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(get_timestamp())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn roles_of(&self, user_id: i64) -> Result<Vec<String>, CredentialError> {
        let roles = sqlx::query_scalar(
            "SELECT r.name FROM roles r
             JOIN user_roles ur ON ur.role_id = r.id
             WHERE ur.user_id = ?
             ORDER BY r.name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    async fn permissions_of(&self, user_id: i64) -> Result<Vec<String>, CredentialError> {
        let permissions = sqlx::query_scalar(
            "SELECT DISTINCT p.name FROM permissions p
             JOIN role_permissions rp ON rp.permission_id = p.id
             JOIN user_roles ur ON ur.role_id = rp.role_id
             WHERE ur.user_id = ?
             ORDER BY p.name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(permissions)
    }
}

impl CredentialGateway for SqliteCredentialStore {
    fn authenticate<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<AuthResult, CredentialError>> {
        Box::pin(async move {
            let row: Option<(i64, String, String, bool, i64, Option<i64>)> = sqlx::query_as(
                "SELECT id, username, password_hash, is_active, created_at, last_login
                 FROM users WHERE username = ?",
            )
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

            let Some((id, username, password_hash, is_active, created_at, last_login)) = row
            else {
                debug!(username = %username, "Login for unknown user");
                return Err(CredentialError::UserNotFound);
            };

            if !is_active {
                return Err(CredentialError::UserInactive);
            }

            // A corrupt hash is treated like a wrong password.
            if !verify_password(&password_hash, password).unwrap_or(false) {
                return Err(CredentialError::InvalidCredentials);
            }

            if let Err(e) = self.update_last_login(id).await {
                warn!(user_id = id, "Failed to update last login: {}", e);
            }

            let roles = self.roles_of(id).await?;
            let permissions = self.permissions_of(id).await?;

            Ok(AuthResult {
                user: User {
                    id,
                    username,
                    is_active,
                    created_at,
                    last_login,
                },
                roles,
                permissions,
            })
        })
    }

    fn user_roles(&self, user_id: i64) -> BoxFuture<'_, Result<Vec<String>, CredentialError>> {
        Box::pin(self.roles_of(user_id))
    }

    fn user_permissions(
        &self,
        user_id: i64,
    ) -> BoxFuture<'_, Result<Vec<String>, CredentialError>> {
        Box::pin(self.permissions_of(user_id))
    }
}
