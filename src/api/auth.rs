//! Caller identity
//!
//! Authentication happens upstream; the proxy forwards the authenticated
//! user id in a header.

use super::handlers::AppError;
use axum::http::HeaderMap;

pub const USER_ID_HEADER: &str = "x-user-id";

/// User id of the caller, 401 when absent or malformed
pub fn user_id(headers: &HeaderMap) -> Result<String, AppError> {
    let value = headers
        .get(USER_ID_HEADER)
        .ok_or(AppError::Unauthorized)?
        .to_str()
        .map_err(|_| AppError::Unauthorized)?
        .trim();

    if value.is_empty() {
        return Err(AppError::Unauthorized);
    }
    Ok(value.to_string())
}
