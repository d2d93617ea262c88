use std::fs;
use tracing::debug;

use crate::types::server_config::{AppConfig, ConfigError};

/// Longest accepted token lifetime: one year.
pub const MAX_TTL_MINUTES: u64 = 365 * 24 * 60;

/// Process environment as a key lookup.
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Read, parse and validate the file at `path`, applying `JWT_SECRET` and
/// `JWT_ISSUER` from the process environment.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    load_config_with(path, env_lookup)
}

pub fn load_config_with(
    path: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AppConfig, ConfigError> {
    let config = read_config_with(path, lookup)?;
    validate_config(&config)?;
    Ok(config)
}

/// Read and parse without validation. Used where the signing settings are
/// irrelevant, e.g. offline user administration.
pub fn read_config(path: &str) -> Result<AppConfig, ConfigError> {
    read_config_with(path, env_lookup)
}

pub fn read_config_with(
    path: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AppConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;

    if contents.trim().is_empty() {
        return Err(ConfigError::InvalidConfig(format!("{path} is empty")));
    }

    decode(&contents, lookup)
}

/// Parse and validate a TOML document with environment overrides applied.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    parse_config_with(contents, env_lookup)
}

pub fn parse_config_with(
    contents: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AppConfig, ConfigError> {
    let config = decode(contents, lookup)?;
    validate_config(&config)?;
    Ok(config)
}

fn decode(
    contents: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AppConfig, ConfigError> {
    let mut config: AppConfig = toml::from_str(contents)?;

    config.jwt.secret = config.jwt.resolved_secret_with(&lookup);
    config.jwt.issuer = config.jwt.resolved_issuer_with(&lookup);

    Ok(config)
}

pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    // Secret: present and at least 32 characters.
    match config.jwt.secret.as_deref() {
        None => {
            return Err(ConfigError::InvalidConfig(
                "jwt secret must be set via the JWT_SECRET env var or jwt.secret config field"
                    .into(),
            ));
        }
        Some(secret) if secret.len() < 32 => {
            return Err(ConfigError::InvalidConfig(
                "jwt secret must be at least 32 characters long".into(),
            ));
        }
        _ => {}
    }

    if config.jwt.issuer.trim().is_empty() {
        return Err(ConfigError::InvalidConfig("jwt.issuer cannot be empty".into()));
    }

    if config.jwt.ttl_minutes == 0 || config.jwt.ttl_minutes > MAX_TTL_MINUTES {
        return Err(ConfigError::InvalidConfig(format!(
            "jwt.ttl_minutes must be between 1 and {MAX_TTL_MINUTES}"
        )));
    }

    if config.cookie.name.trim().is_empty() {
        return Err(ConfigError::InvalidConfig("cookie.name cannot be empty".into()));
    }

    let auth = &config.rate_limit.auth;
    if auth.max_attempts == 0 || auth.block_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "rate_limit.auth max_attempts and block_secs must be greater than 0".into(),
        ));
    }

    let api = &config.rate_limit.api;
    if api.limit == 0 || api.window_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "rate_limit.api limit and window_secs must be greater than 0".into(),
        ));
    }

    if config.server.request_timeout_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "server.request_timeout_secs must be greater than 0".into(),
        ));
    }

    debug!("Configuration validated");
    Ok(())
}
