use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;
use tracing::debug;

use panel_shared::types::Claims;

/// Clock skew tolerated by the signature-level checks.
const LEEWAY_SECS: u64 = 5;

const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("invalid token input: {0}")]
    Validation(String),

    #[error("malformed token")]
    Malformed,

    #[error("token signature mismatch or unexpected algorithm")]
    Signature,

    #[error("token issuer mismatch")]
    IssuerMismatch,

    #[error("token expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            JwtErrorKind::InvalidSignature
            | JwtErrorKind::InvalidAlgorithm
            | JwtErrorKind::InvalidAlgorithmName
            | JwtErrorKind::MissingAlgorithm => TokenError::Signature,
            JwtErrorKind::InvalidIssuer => TokenError::IssuerMismatch,
            JwtErrorKind::ExpiredSignature => TokenError::Expired,
            JwtErrorKind::ImmatureSignature => TokenError::NotYetValid,
            _ => TokenError::Malformed,
        }
    }
}

/// Identity and grants to embed in a new token.
#[derive(Debug, Clone, Default)]
pub struct TokenSubject {
    pub user_id: i64,
    pub username: String,
    /// Embedded verbatim, may be empty.
    pub jti: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Unix seconds, the `exp` claim.
    pub expires_at: i64,
}

/// Signs and verifies HS256 session tokens for one issuer.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, issuer: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = LEEWAY_SECS;
        validation.validate_nbf = true;
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: issuer.to_string(),
            ttl,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, subject: TokenSubject) -> Result<IssuedToken, TokenError> {
        if subject.username.is_empty() {
            return Err(TokenError::Validation("username is required".to_string()));
        }

        let now = now_millis();
        let issued_at = now / 1000;
        let ttl_millis = u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX);
        let expires_at = now.saturating_add(ttl_millis) / 1000;

        let claims = Claims {
            sub: subject.username.clone(),
            username: subject.username,
            user_id: subject.user_id,
            jti: subject.jti,
            roles: subject.roles,
            permissions: subject.permissions,
            iss: self.issuer.clone(),
            iat: issued_at,
            nbf: issued_at,
            exp: expires_at,
        };

        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(TokenError::Signing)?;

        debug!(username = %claims.username, jti = %claims.jti, "Token issued");
        Ok(IssuedToken {
            token,
            expires_at: i64::try_from(expires_at).unwrap_or(i64::MAX),
        })
    }

    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        if token.is_empty() {
            return Err(TokenError::Malformed);
        }

        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)?.claims;

        // The decoder applies leeway to both bounds; the validity window
        // itself is enforced exactly.
        let now = now_millis() / 1000;
        if now > claims.exp {
            return Err(TokenError::Expired);
        }
        if claims.nbf > now {
            return Err(TokenError::NotYetValid);
        }

        Ok(claims)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
