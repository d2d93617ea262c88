use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;

/// Random bytes appended to every session identifier.
const SESSION_ID_RANDOM_BYTES: usize = 8;

/// Get current Unix timestamp in seconds
pub fn get_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Build a session identifier: `<username>_<unix secs>_<16 hex chars>`.
///
/// Uniqueness is best-effort; the `tokens.jti` UNIQUE constraint is the
/// final arbiter on insert.
pub fn generate_session_id(username: &str) -> String {
    let mut random = [0u8; SESSION_ID_RANDOM_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut random);
    format!("{}_{}_{}", username, get_timestamp(), hex::encode(random))
}

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString},
    };
    use rand::rngs::OsRng;

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))
}

/// Verify a password against its hash
pub fn verify_password(hash: &str, password: &str) -> anyhow::Result<bool> {
    use argon2::{
        Argon2,
        password_hash::{PasswordHash, PasswordVerifier},
    };

    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
