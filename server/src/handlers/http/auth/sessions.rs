use anyhow::Result;
use tracing::{error, info, warn};

use panel_shared::types::{
    AuthStatusResponse, RevokeSessionRequest, SessionListResponse, SessionResponse,
};

use crate::auth::AuthContext;
use crate::database::SessionError;
use crate::errors::ErrorCode;
use crate::handlers::http::utils::{self, deliver_ok_json};
use crate::{ApiRequest, ApiResponse, AppState};

/// `GET /api/auth/sessions`: the whole ledger, newest first.
pub async fn handle_list_sessions(
    _req: ApiRequest,
    state: AppState,
    identity: AuthContext,
) -> Result<ApiResponse> {
    let records = match state.sessions.list_all().await {
        Ok(records) => records,
        Err(e) => {
            error!(username = %identity.username, "Failed to list sessions: {}", e);
            return Ok(state.catalog.render(&ErrorCode::DatabaseError.into()));
        }
    };

    let sessions: Vec<SessionResponse> = records.into_iter().map(Into::into).collect();
    let response = deliver_ok_json(&SessionListResponse {
        total: sessions.len(),
        sessions,
    })?;

    Ok(utils::no_store(response))
}

/// `POST /api/auth/sessions/revoke` with `{"jti": "..."}`.
pub async fn handle_revoke_session(
    req: ApiRequest,
    state: AppState,
    identity: AuthContext,
) -> Result<ApiResponse> {
    let request: RevokeSessionRequest = match utils::read_json(req).await {
        Ok(request) => request,
        Err(rejection) => return Ok(state.catalog.render(&rejection)),
    };

    if request.jti.trim().is_empty() {
        return Ok(state.catalog.render(&ErrorCode::InvalidRequest.into()));
    }

    let code = match state
        .sessions
        .revoke(&request.jti, identity.user_id, &identity.username)
        .await
    {
        Ok(()) => {
            info!(jti = %request.jti, revoked_by = %identity.username, "Session revoked by administrator");
            return deliver_ok_json(&AuthStatusResponse {
                success: true,
                message: "Session revoked".to_string(),
                username: None,
            });
        }
        Err(SessionError::NotFound) => ErrorCode::SessionNotFound,
        Err(SessionError::AlreadyRevoked) => ErrorCode::SessionAlreadyRevoked,
        Err(SessionError::Database(e)) => {
            error!(jti = %request.jti, "Failed to revoke session: {}", e);
            ErrorCode::DatabaseError
        }
        Err(e) => {
            error!(jti = %request.jti, "Unexpected revocation failure: {}", e);
            ErrorCode::InternalError
        }
    };

    warn!(jti = %request.jti, code = %code, "Revocation rejected");
    Ok(state.catalog.render(&code.into()))
}
