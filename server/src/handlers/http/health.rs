use anyhow::Result;
use serde_json::json;

use crate::handlers::http::utils::deliver_ok_json;
use crate::{ApiRequest, ApiResponse, AppState};

/// `GET /health`
pub async fn handle_health(_req: ApiRequest, _state: AppState) -> Result<ApiResponse> {
    deliver_ok_json(&json!({ "status": "ok" }))
}
