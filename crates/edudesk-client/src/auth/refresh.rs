//! Refresh token exchange.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::transport::{HttpTransport, RequestDescriptor};
use crate::error::ApiError;

/// Path of the refresh endpoint, joined against the client base URL.
pub const REFRESH_PATH: &str = "/auth/token/refresh/";

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
}

/// Exchange a refresh token for a new access token.
///
/// The request carries no Authorization header; the refresh token travels in
/// the body. Every failure mode collapses into [`ApiError::RefreshFailed`]:
/// a rejected exchange, a transport error and a malformed response all mean
/// the refresh path is unusable and the session must end.
pub async fn exchange(
    transport: &dyn HttpTransport,
    refresh_token: &str,
) -> Result<String, ApiError> {
    let descriptor = RequestDescriptor::post(REFRESH_PATH)
        .with_json(&RefreshRequest {
            refresh: refresh_token,
        })
        .map_err(|e| ApiError::RefreshFailed(format!("cannot encode refresh request: {e}")))?;

    let response = transport
        .execute(&descriptor, None)
        .await
        .map_err(|e| ApiError::RefreshFailed(format!("refresh request failed: {e}")))?;

    if !response.is_success() {
        return Err(ApiError::RefreshFailed(format!(
            "refresh endpoint returned {}",
            response.status
        )));
    }

    let parsed: RefreshResponse = response
        .json()
        .map_err(|e| ApiError::RefreshFailed(format!("malformed refresh response: {e}")))?;

    debug!("refresh exchange succeeded");
    Ok(parsed.access)
}
