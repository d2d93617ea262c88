use http_body_util::{BodyExt, Limited};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::ApiRequest;
use crate::errors::{ApiError, ErrorCode};

/// Largest request body the API accepts.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Collect the request body and decode it as JSON. Oversized, unreadable or
/// ill-typed bodies are all `INVALID_REQUEST`.
pub async fn read_json<T: DeserializeOwned>(req: ApiRequest) -> Result<T, ApiError> {
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            debug!("Failed to read request body: {}", e);
            ApiError::new(ErrorCode::InvalidRequest)
        })?
        .to_bytes();

    serde_json::from_slice(&body).map_err(|e| {
        debug!("Request body is not valid JSON: {}", e);
        ApiError::new(ErrorCode::InvalidRequest)
    })
}
