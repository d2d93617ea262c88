use anyhow::{Context, Result};
use tracing::{info, warn};

use panel_shared::types::AuthStatusResponse;

use crate::auth::AuthContext;
use crate::handlers::http::utils::{self, deliver_ok_json};
use crate::{ApiRequest, ApiResponse, AppState};

/// `POST /api/auth/logout`
///
/// Revokes the caller's own session. A failed revocation is logged and the
/// cookie is cleared regardless.
pub async fn handle_logout(
    _req: ApiRequest,
    state: AppState,
    identity: AuthContext,
) -> Result<ApiResponse> {
    match state
        .sessions
        .revoke(&identity.jti, identity.user_id, &identity.username)
        .await
    {
        Ok(()) => info!(username = %identity.username, jti = %identity.jti, "User logged out"),
        Err(e) => warn!(
            username = %identity.username,
            jti = %identity.jti,
            "Failed to revoke session on logout: {}",
            e
        ),
    }

    let cookie = state
        .cookies
        .clear_cookie()
        .context("Failed to create clearing cookie")?;

    let response = deliver_ok_json(&AuthStatusResponse {
        success: true,
        message: "Logged out successfully".to_string(),
        username: None,
    })?;

    Ok(utils::with_cookie(response, cookie))
}
