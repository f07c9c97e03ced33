use axum::http::HeaderMap;

use crate::error::AppError;

/// The caller is an already-authenticated principal; the gateway in front of
/// this service resolves credentials and forwards the subject in `x-user-id`.
pub fn user_id(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .ok_or_else(|| AppError::BadRequest("Missing x-user-id header".to_string()))
}
