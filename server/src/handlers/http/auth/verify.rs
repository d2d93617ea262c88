use anyhow::Result;

use panel_shared::types::AuthStatusResponse;

use crate::auth::AuthContext;
use crate::handlers::http::utils::deliver_ok_json;
use crate::{ApiRequest, ApiResponse, AppState};

/// `POST /api/auth/verify`: the auth layer already did the work.
pub async fn handle_verify(
    _req: ApiRequest,
    _state: AppState,
    identity: AuthContext,
) -> Result<ApiResponse> {
    deliver_ok_json(&AuthStatusResponse {
        success: true,
        message: "Token is valid".to_string(),
        username: Some(identity.username),
    })
}
