use serde::{Deserialize, Serialize};

/// Claims embedded in every session token issued by the server.
///
/// The token is only the carrier: a decoded `Claims` is trusted once the
/// signature, issuer and validity window check out *and* its `jti` still
/// names a live row in the session ledger. Revoking that row invalidates the
/// token before `exp` is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Login name of the account.
    pub username: String,

    /// Numeric user ID from the credential store.
    #[serde(rename = "uid")]
    pub user_id: i64,

    /// Session identifier; the primary key of the session ledger row.
    #[serde(default)]
    pub jti: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,

    /// Standard JWT subject, always the username.
    pub sub: String,

    /// Standard JWT issuer.
    pub iss: String,

    /// Issued-at (Unix timestamp, seconds).
    pub iat: u64,

    /// Not-before (Unix timestamp, seconds).
    pub nbf: u64,

    /// Expiry (Unix timestamp, seconds).
    pub exp: u64,
}

impl Claims {
    /// Exact match against the permission list.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// True when at least one of `permissions` is held. An empty slice never matches.
    pub fn has_any_permission(&self, permissions: &[&str]) -> bool {
        permissions.iter().any(|required| self.has_permission(required))
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
