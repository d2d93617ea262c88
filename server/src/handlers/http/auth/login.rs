use anyhow::{Context, Result};
use tracing::{error, info, warn};

use panel_shared::types::{LoginData, LoginResponse};

use crate::auth::TokenSubject;
use crate::database::CredentialError;
use crate::errors::{ApiError, ErrorCode};
use crate::handlers::http::utils::{self, deliver_ok_json};
use crate::{ApiRequest, ApiResponse, AppState};

/// `POST /api/auth/login`
///
/// Credentials, then a fresh session id, then the token, then the exclusive
/// save. The cookie is only set once the session is on record.
pub async fn handle_login(req: ApiRequest, state: AppState) -> Result<ApiResponse> {
    let peer = utils::peer_addr(&req);

    let login: LoginData = match utils::read_json(req).await {
        Ok(login) => login,
        Err(rejection) => return Ok(state.catalog.render(&rejection)),
    };

    if !login.valid_username() || !login.valid_password() {
        warn!(peer = ?peer, "Login rejected: username or password fails input rules");
        return Ok(state.catalog.render(&ErrorCode::InvalidRequest.into()));
    }

    let auth = match state
        .credentials
        .authenticate(&login.username, &login.password)
        .await
    {
        Ok(auth) => auth,
        Err(CredentialError::Database(e)) => {
            error!(username = %login.username, "Credential lookup failed: {}", e);
            return Ok(state.catalog.render(&ErrorCode::DatabaseError.into()));
        }
        Err(e) => {
            warn!(username = %login.username, peer = ?peer, "Login failed: {}", e);
            return Ok(state.catalog.render(&ErrorCode::InvalidCredentials.into()));
        }
    };

    let jti = state.sessions.new_session_id(&auth.user.username);

    let issued = match state.tokens.issue(TokenSubject {
        user_id: auth.user.id,
        username: auth.user.username.clone(),
        jti: jti.clone(),
        roles: auth.roles,
        permissions: auth.permissions,
    }) {
        Ok(issued) => issued,
        Err(e) => {
            error!(username = %auth.user.username, "Token issue failed: {}", e);
            return Ok(internal_error(&state));
        }
    };

    let revoked = match state
        .sessions
        .save_exclusive(&jti, &auth.user.username, issued.expires_at)
        .await
    {
        Ok(revoked) => revoked,
        Err(e) => {
            error!(username = %auth.user.username, jti = %jti, "Failed to record session: {}", e);
            return Ok(internal_error(&state));
        }
    };

    let cookie = state
        .cookies
        .set_cookie(&issued.token)
        .context("Failed to create session cookie")?;

    info!(
        username = %auth.user.username,
        jti = %jti,
        revoked_sessions = revoked,
        "User logged in"
    );

    let response = deliver_ok_json(&LoginResponse {
        success: true,
        message: "Logged in successfully".to_string(),
    })?;

    Ok(utils::no_store(utils::with_cookie(response, cookie)))
}

fn internal_error(state: &AppState) -> ApiResponse {
    state.catalog.render(&ApiError::new(ErrorCode::InternalError))
}
