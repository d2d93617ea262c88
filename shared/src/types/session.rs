use serde::{Deserialize, Serialize};

/// One row of the session ledger as exposed by `GET /api/auth/sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub id: i64,
    pub jti: String,
    pub username: String,
    pub revoked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_by_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_by_username: Option<String>,
    pub expires_at: i64,
    pub created_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionResponse>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct RevokeSessionRequest {
    pub jti: String,
}
