use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Optional TOML file overriding status codes / messages of the error catalog.
    #[serde(default)]
    pub errors_file: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_sessions_db")]
    pub sessions_db_path: String,
    #[serde(default = "default_credentials_db")]
    pub credentials_db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// HMAC key used to sign and verify session tokens.
    ///
    /// Prefer loading this via the `JWT_SECRET` environment variable, which
    /// always wins over the file. **Minimum length:** 32 characters.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CookieConfig {
    #[serde(default = "default_cookie_name")]
    pub name: String,
    #[serde(default = "default_true")]
    pub secure: bool,
    #[serde(default = "default_true")]
    pub http_only: bool,
    /// `strict`, `lax` or `none`; anything else is treated as `strict`.
    #[serde(default = "default_same_site")]
    pub same_site: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthRateLimitConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_block_secs")]
    pub block_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiRateLimitConfig {
    #[serde(default = "default_api_limit")]
    pub limit: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub auth: AuthRateLimitConfig,
    #[serde(default)]
    pub api: ApiRateLimitConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub cookie: CookieConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ServerConfig {
    /// Full bind address, e.g. `"127.0.0.1:8080"`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl JwtConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes.saturating_mul(60))
    }

    /// Resolve the signing secret with `JWT_SECRET` taking priority over the
    /// config file field. Empty values count as unset. `None` when neither
    /// source is set.
    pub fn resolved_secret(&self) -> Option<String> {
        self.resolved_secret_with(|key| std::env::var(key).ok())
    }

    pub fn resolved_secret_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .or_else(|| self.secret.clone())
            .filter(|s| !s.is_empty())
    }

    /// `JWT_ISSUER` overrides the configured issuer when set.
    pub fn resolved_issuer(&self) -> String {
        self.resolved_issuer_with(|key| std::env::var(key).ok())
    }

    pub fn resolved_issuer_with(&self, lookup: impl Fn(&str) -> Option<String>) -> String {
        lookup("JWT_ISSUER")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.issuer.clone())
    }
}

impl AuthRateLimitConfig {
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs(self.block_secs)
    }
}

impl ApiRateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            debug: false,
            request_timeout_secs: default_request_timeout(),
            errors_file: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sessions_db_path: default_sessions_db(),
            credentials_db_path: default_credentials_db(),
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: None,
            issuer: default_issuer(),
            ttl_minutes: default_ttl_minutes(),
        }
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: default_cookie_name(),
            secure: true,
            http_only: true,
            same_site: default_same_site(),
        }
    }
}

impl Default for AuthRateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            block_secs: default_block_secs(),
        }
    }
}

impl Default for ApiRateLimitConfig {
    fn default() -> Self {
        Self {
            limit: default_api_limit(),
            window_secs: default_window_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

pub fn default_bind() -> String {
    "127.0.0.1".to_string()
}

pub fn default_port() -> u16 {
    8080
}

pub fn default_request_timeout() -> u64 {
    30
}

pub fn default_sessions_db() -> String {
    "./data/tokens.db".to_string()
}

pub fn default_credentials_db() -> String {
    "./data/users.db".to_string()
}

pub fn default_issuer() -> String {
    "vps-control".to_string()
}

pub fn default_ttl_minutes() -> u64 {
    24 * 60
}

pub fn default_cookie_name() -> String {
    "auth_token".to_string()
}

pub fn default_same_site() -> String {
    "strict".to_string()
}

pub fn default_max_attempts() -> u32 {
    5
}

pub fn default_block_secs() -> u64 {
    15 * 60
}

pub fn default_api_limit() -> u32 {
    100
}

pub fn default_window_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}
